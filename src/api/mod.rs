//! Network control surface.

pub mod protocol;
mod server;

pub use protocol::{WsRequest, WsResponse};
pub use server::ControlServer;

//! Enclosure control library.
//!
//! This library holds the device control state machine for the enclosure
//! actuators: the persisted control document, its read cache, command
//! validation and application, and the pressure washer safety sweep.

pub mod api;
pub mod cache;
pub mod clock;
pub mod command;
pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod instance_lock;
pub mod model;
pub mod store;
pub mod sweeper;

pub use context::ControlContext;
pub use controller::{CommandOutcome, DeviceController};
pub use error::{ControlError, Result, StoreError, ValidationError};
pub use model::{ControlState, Device, Mode, PowerState};
pub use sweeper::{SafetySweeper, SweeperHandle};

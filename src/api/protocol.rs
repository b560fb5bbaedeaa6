//! JSON envelope spoken over the control WebSocket.
//!
//! ```text
//! -> {"message_id":"1","command":"set_mode","args":{"device":"light","mode":"FORCE_ON"}}
//! <- {"message_id":"1","result":{"state":{...},"message":"light set to FORCE_ON"}}
//! ```

use crate::error::{ControlError, ValidationError};
use serde::{Deserialize, Serialize};

pub const CMD_GET_STATE: &str = "get_state";
pub const CMD_SET_MODE: &str = "set_mode";
pub const CMD_HEALTH: &str = "health";

pub const ERR_UNKNOWN_DEVICE: i32 = 1;
pub const ERR_UNKNOWN_MODE: i32 = 2;
pub const ERR_AUTO_NOT_PERMITTED: i32 = 3;
pub const ERR_INVALID_TIMER: i32 = 4;
pub const ERR_MALFORMED_REQUEST: i32 = 10;
pub const ERR_UNKNOWN_COMMAND: i32 = 11;
pub const ERR_STORE_FAILURE: i32 = 500;

/// Request message for the control API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsRequest {
    pub message_id: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<serde_json::Value>,
}

/// Response message from the control API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsResponse {
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl WsRequest {
    pub fn new(message_id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            command: command.into(),
            args: None,
        }
    }

    pub fn with_args(mut self, args: serde_json::Value) -> Self {
        self.args = Some(args);
        self
    }
}

impl WsResponse {
    pub fn ok(message_id: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            message_id: message_id.into(),
            result: Some(result),
            error_code: None,
            details: None,
        }
    }

    pub fn error(message_id: impl Into<String>, code: i32, details: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            result: None,
            error_code: Some(code),
            details: Some(details.into()),
        }
    }

    pub fn from_error(message_id: impl Into<String>, err: &ControlError) -> Self {
        let (code, details) = match err {
            ControlError::Validation(v) => {
                let code = match v {
                    ValidationError::UnknownDevice(_) => ERR_UNKNOWN_DEVICE,
                    ValidationError::UnknownMode(_) => ERR_UNKNOWN_MODE,
                    ValidationError::AutoNotPermitted(_) => ERR_AUTO_NOT_PERMITTED,
                    ValidationError::InvalidTimerDuration { .. } => ERR_INVALID_TIMER,
                };
                (code, v.to_string())
            }
            // Store internals are not exposed to clients
            ControlError::Store(_) => (ERR_STORE_FAILURE, "control store unavailable".to_string()),
        };
        Self::error(message_id, code, details)
    }

    pub fn is_error(&self) -> bool {
        self.error_code.is_some()
    }
}

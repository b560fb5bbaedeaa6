use crate::model::Device;
use thiserror::Error as ThisError;

/// Rejected command input. Never reaches the store.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Unknown mode: {0}")]
    UnknownMode(String),

    #[error("AUTO mode is not permitted for {0}")]
    AutoNotPermitted(Device),

    #[error("Invalid timer duration: {duration}s (allowed 1..={max}s)")]
    InvalidTimerDuration { duration: u64, max: u64 },
}

#[derive(ThisError, Debug)]
pub enum StoreError {
    #[error("Control store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Control document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Control store unavailable: {0}")]
    Unavailable(String),

    #[error("Control store call timed out after {0}ms")]
    Timeout(u64),

    #[error("Control document revision conflict (expected {expected}, found {found})")]
    Conflict { expected: u64, found: u64 },
}

#[derive(ThisError, Debug)]
pub enum ControlError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ControlError>;

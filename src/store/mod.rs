//! Durable persistence of the single control document.
//!
//! Stores provide document-granularity atomic replacement guarded by a
//! revision check, so a writer that read a stale document gets a
//! [`StoreError::Conflict`] instead of silently overwriting a newer one.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::model::ControlState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait ControlStateStore: Send + Sync {
    /// Load the document, creating and persisting a default one stamped
    /// `now` if none exists yet.
    async fn load(&self, now: DateTime<Utc>) -> Result<ControlState, StoreError>;

    /// Load the document without creating it.
    async fn load_existing(&self) -> Result<Option<ControlState>, StoreError>;

    /// Replace the document if the stored revision still equals
    /// `expected_revision`.
    async fn save(&self, state: &ControlState, expected_revision: u64) -> Result<(), StoreError>;

    /// Connectivity check for health reporting.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Revision check shared by the store implementations.
pub(crate) fn check_revision(
    current: Option<&ControlState>,
    expected_revision: u64,
) -> Result<(), StoreError> {
    let found = current.map(|state| state.revision).unwrap_or(0);
    if found == expected_revision {
        Ok(())
    } else {
        Err(StoreError::Conflict {
            expected: expected_revision,
            found,
        })
    }
}

//! In-process control store.

use super::{ControlStateStore, check_revision};
use crate::error::StoreError;
use crate::model::ControlState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Volatile store holding the document in memory.
///
/// Useful for ephemeral runs and tests. Availability and latency can be
/// adjusted at runtime to exercise the failure paths of its callers.
pub struct MemoryStore {
    document: Mutex<Option<ControlState>>,
    available: AtomicBool,
    latency: Mutex<Option<Duration>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            document: Mutex::new(None),
            available: AtomicBool::new(true),
            latency: Mutex::new(None),
            writes: AtomicUsize::new(0),
        }
    }

    /// Start with an existing document.
    pub fn with_state(state: ControlState) -> Self {
        let store = Self::new();
        *store.document.lock() = Some(state);
        store
    }

    /// Simulate losing (or regaining) connectivity.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Number of successful saves, document creation excluded.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Current document, bypassing availability checks.
    pub fn snapshot(&self) -> Option<ControlState> {
        self.document.lock().clone()
    }

    async fn enter(&self) -> Result<(), StoreError> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ControlStateStore for MemoryStore {
    async fn load(&self, now: DateTime<Utc>) -> Result<ControlState, StoreError> {
        self.enter().await?;
        let mut document = self.document.lock();
        Ok(document.get_or_insert_with(|| ControlState::new(now)).clone())
    }

    async fn load_existing(&self) -> Result<Option<ControlState>, StoreError> {
        self.enter().await?;
        Ok(self.document.lock().clone())
    }

    async fn save(&self, state: &ControlState, expected_revision: u64) -> Result<(), StoreError> {
        self.enter().await?;
        let mut document = self.document.lock();
        check_revision(document.as_ref(), expected_revision)?;
        *document = Some(state.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.enter().await
    }
}

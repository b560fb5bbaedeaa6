//! Service-owned context shared by the controller, the sweeper and the API.
//!
//! Created once at startup and passed around behind an `Arc`; nothing in the
//! crate keeps the store or the cache in ambient global state.

use crate::cache::ControlCache;
use crate::clock::{Clock, SystemClock};
use crate::command::TimerLimits;
use crate::config::Config;
use crate::error::StoreError;
use crate::store::ControlStateStore;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Default bound on a single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct ControlContext {
    store: Arc<dyn ControlStateStore>,
    cache: ControlCache,
    clock: Arc<dyn Clock>,
    limits: TimerLimits,
    store_timeout: Duration,
}

/// Diagnostics snapshot for status endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub cache_entries: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub store_reachable: bool,
}

impl ControlContext {
    pub fn new(store: Arc<dyn ControlStateStore>) -> Self {
        Self {
            store,
            cache: ControlCache::default(),
            clock: Arc::new(SystemClock),
            limits: TimerLimits::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn from_config(config: &Config, store: Arc<dyn ControlStateStore>) -> Self {
        Self::new(store)
            .with_cache(ControlCache::new(config.control.cache_ttl()))
            .with_timer_limits(config.control.timer_limits())
            .with_store_timeout(config.store.timeout())
    }

    pub fn with_cache(mut self, cache: ControlCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timer_limits(mut self, limits: TimerLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn store(&self) -> &dyn ControlStateStore {
        self.store.as_ref()
    }

    pub fn cache(&self) -> &ControlCache {
        &self.cache
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn timer_limits(&self) -> &TimerLimits {
        &self.limits
    }

    /// Run a store call under the configured timeout. A timeout is a failure,
    /// never retried here.
    pub async fn with_timeout<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.store_timeout.as_millis() as u64)),
        }
    }

    pub async fn health(&self) -> HealthReport {
        let store_reachable = self.with_timeout(self.store.ping()).await.is_ok();
        HealthReport {
            cache_entries: self.cache.entry_count(),
            cache_hits: self.cache.hits(),
            cache_misses: self.cache.misses(),
            store_reachable,
        }
    }
}

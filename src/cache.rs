//! Single-entry, time-boxed cache in front of control store reads.
//!
//! Values are handed out as owned snapshots. A miss returns a [`FillTicket`];
//! filling with a ticket taken before an `invalidate()` is ignored, so a slow
//! reader can never put back a document that a completed write superseded.

use crate::model::ControlState;
use log::debug;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Reference time-to-live for cached control documents.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

/// Result of a cache lookup.
#[derive(Debug)]
pub enum CacheLookup {
    Hit(ControlState),
    Miss(FillTicket),
}

/// Permission to fill the cache after a miss.
#[derive(Debug)]
#[must_use]
pub struct FillTicket {
    generation: u64,
}

struct Entry {
    state: ControlState,
    stored_at: Instant,
}

struct Inner {
    entry: Option<Entry>,
    generation: u64,
}

pub struct ControlCache {
    ttl: Duration,
    inner: Mutex<Inner>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl ControlCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(Inner {
                entry: None,
                generation: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self) -> CacheLookup {
        let mut inner = self.inner.lock();
        let fresh = inner
            .entry
            .as_ref()
            .is_some_and(|entry| entry.stored_at.elapsed() < self.ttl);

        if fresh && let Some(entry) = inner.entry.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("[Cache] Hit (revision {})", entry.state.revision);
            return CacheLookup::Hit(entry.state.clone());
        }

        if inner.entry.take().is_some() {
            debug!("[Cache] Entry expired");
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("[Cache] Miss");
        CacheLookup::Miss(FillTicket {
            generation: inner.generation,
        })
    }

    /// Store `state` unless the cache was invalidated since `ticket` was issued.
    /// Returns whether the value was cached.
    pub fn fill(&self, ticket: FillTicket, state: &ControlState) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != ticket.generation {
            debug!(
                "[Cache] Discarding fill for revision {} (invalidated meanwhile)",
                state.revision
            );
            return false;
        }
        inner.entry = Some(Entry {
            state: state.clone(),
            stored_at: Instant::now(),
        });
        true
    }

    pub fn invalidate(&self) {
        let mut inner = self.inner.lock();
        inner.entry = None;
        inner.generation = inner.generation.wrapping_add(1);
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        debug!("[Cache] Invalidated");
    }

    /// Number of live (unexpired) entries, 0 or 1.
    pub fn entry_count(&self) -> usize {
        let inner = self.inner.lock();
        inner
            .entry
            .as_ref()
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map_or(0, |_| 1)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }
}

impl Default for ControlCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

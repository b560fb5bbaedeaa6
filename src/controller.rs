//! Command application for the control document.
//!
//! Read path is cache-aside: the cache is consulted first and the store only
//! on a miss. Every successful command performs exactly one persisted write
//! followed by one cache invalidation; conflicting attempts, which write
//! nothing, do not invalidate. Saves are revision checked; when a
//! concurrent writer (usually the safety sweeper) got there first, the command
//! is re-applied on top of the fresh document.

use crate::cache::CacheLookup;
use crate::command::{CommandRequest, ControlCommand, WasherCommand};
use crate::context::ControlContext;
use crate::error::{Result, StoreError};
use crate::model::ControlState;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Attempts per command before a revision conflict is reported to the caller.
pub const MAX_WRITE_ATTEMPTS: usize = 3;

/// Result of a successfully applied command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub state: ControlState,
    pub message: String,
}

pub struct DeviceController {
    ctx: Arc<ControlContext>,
}

impl DeviceController {
    pub fn new(ctx: Arc<ControlContext>) -> Self {
        Self { ctx }
    }

    /// Current control document, cache first.
    pub async fn read_state(&self) -> std::result::Result<ControlState, StoreError> {
        match self.ctx.cache().get() {
            CacheLookup::Hit(state) => Ok(state),
            CacheLookup::Miss(ticket) => {
                let state = self.load_from_store().await?;
                self.ctx.cache().fill(ticket, &state);
                Ok(state)
            }
        }
    }

    /// Validate raw input and apply it.
    pub async fn apply_command(
        &self,
        device: &str,
        mode: &str,
        timer_duration: Option<u64>,
    ) -> Result<CommandOutcome> {
        let command = ControlCommand::parse(device, mode, timer_duration, self.ctx.timer_limits())
            .inspect_err(|e| warn!("[Control] Rejected {} {}: {}", device, mode, e))?;
        self.apply(command).await
    }

    pub async fn apply_request(&self, request: &CommandRequest) -> Result<CommandOutcome> {
        self.apply_command(&request.device, &request.mode, request.timer_duration)
            .await
    }

    /// Apply an already validated command.
    pub async fn apply(&self, command: ControlCommand) -> Result<CommandOutcome> {
        let mut current = self.read_state().await?;
        let mut attempt = 1;

        loop {
            let now = self.ctx.clock().now();
            let expected_revision = current.revision;
            let mut next = current.clone();
            apply_to(&mut next, command, now);

            let saved = self
                .ctx
                .with_timeout(self.ctx.store().save(&next, expected_revision))
                .await;

            match saved {
                Ok(()) => {
                    self.ctx.cache().invalidate();
                    info!(
                        "[Control] {} set to {} (revision {})",
                        command.device(),
                        command.mode(),
                        next.revision
                    );
                    return Ok(CommandOutcome {
                        message: format!("{} set to {}", command.device(), command.mode()),
                        state: next,
                    });
                }
                Err(StoreError::Conflict { expected, found }) if attempt < MAX_WRITE_ATTEMPTS => {
                    warn!(
                        "[Control] Revision conflict applying {} {} (expected {}, found {}), retrying",
                        command.device(),
                        command.mode(),
                        expected,
                        found
                    );
                    current = self.load_from_store().await?;
                    attempt += 1;
                }
                Err(e) => {
                    // A timed out save may still have landed
                    self.ctx.cache().invalidate();
                    error!(
                        "[Control] Failed to persist {} {}: {}",
                        command.device(),
                        command.mode(),
                        e
                    );
                    return Err(e.into());
                }
            }
        }
    }

    async fn load_from_store(&self) -> std::result::Result<ControlState, StoreError> {
        let now = self.ctx.clock().now();
        self.ctx
            .with_timeout(self.ctx.store().load(now))
            .await
            .inspect_err(|e| error!("[Control] Failed to load control document: {}", e))
    }
}

/// Pure state transition for a validated command.
pub fn apply_to(state: &mut ControlState, command: ControlCommand, now: DateTime<Utc>) {
    match command {
        ControlCommand::Light(mode) => state.light.apply_mode(mode),
        ControlCommand::FanPositive(mode) => state.fan_positive.apply_mode(mode),
        ControlCommand::FanNegative(mode) => state.fan_negative.apply_mode(mode),
        ControlCommand::PressureWasher(WasherCommand::On { timer_secs }) => {
            state.pressure_washer.start(now, timer_secs)
        }
        ControlCommand::PressureWasher(WasherCommand::Off) => state.pressure_washer.stop(),
    }
    state.touch(now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::command::{MAX_TIMER_SECS, TimerLimits};
    use crate::error::{ControlError, ValidationError};
    use crate::model::{Device, Mode, PowerState, WasherMode};
    use crate::store::{ControlStateStore, MemoryStore};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use strum::IntoEnumIterator;
    use tokio_test::assert_err;

    /// Rejects the first `conflicts` saves as if another writer got there first.
    struct ConflictingStore {
        inner: MemoryStore,
        conflicts: AtomicUsize,
        attempts: AtomicUsize,
    }

    impl ConflictingStore {
        fn new(conflicts: usize) -> Self {
            Self {
                inner: MemoryStore::new(),
                conflicts: AtomicUsize::new(conflicts),
                attempts: AtomicUsize::new(0),
            }
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ControlStateStore for ConflictingStore {
        async fn load(&self, now: DateTime<Utc>) -> std::result::Result<ControlState, StoreError> {
            self.inner.load(now).await
        }

        async fn load_existing(&self) -> std::result::Result<Option<ControlState>, StoreError> {
            self.inner.load_existing().await
        }

        async fn save(
            &self,
            state: &ControlState,
            expected_revision: u64,
        ) -> std::result::Result<(), StoreError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let remaining = self.conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.conflicts.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::Conflict {
                    expected: expected_revision,
                    found: expected_revision + 1,
                });
            }
            self.inner.save(state, expected_revision).await
        }

        async fn ping(&self) -> std::result::Result<(), StoreError> {
            self.inner.ping().await
        }
    }

    fn conflicting_setup(
        conflicts: usize,
    ) -> (Arc<ConflictingStore>, Arc<ControlContext>, DeviceController) {
        let store = Arc::new(ConflictingStore::new(conflicts));
        let clock = Arc::new(ManualClock::new(start()));
        let ctx = Arc::new(ControlContext::new(store.clone()).with_clock(clock));
        (store, ctx.clone(), DeviceController::new(ctx))
    }

    fn start() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn setup() -> (Arc<MemoryStore>, Arc<ManualClock>, DeviceController) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start()));
        let ctx = ControlContext::new(store.clone()).with_clock(clock.clone());
        (store, clock, DeviceController::new(Arc::new(ctx)))
    }

    fn switch_devices() -> impl Iterator<Item = Device> {
        Device::iter().filter(|d| *d != Device::PressureWasher)
    }

    #[tokio::test]
    async fn test_force_modes_pin_switch_state() {
        let (_store, _clock, controller) = setup();

        for device in switch_devices() {
            let outcome = controller
                .apply_command(device.as_ref(), "FORCE_ON", None)
                .await
                .unwrap();
            let control = outcome.state.switch(device).unwrap();
            assert_eq!(control.mode, Mode::ForceOn);
            assert_eq!(control.state, PowerState::On);

            let outcome = controller
                .apply_command(device.as_ref(), "FORCE_OFF", None)
                .await
                .unwrap();
            assert_eq!(outcome.state.switch(device).unwrap().state, PowerState::Off);
        }
    }

    #[tokio::test]
    async fn test_auto_leaves_state_unchanged() {
        let (_store, _clock, controller) = setup();

        controller.apply_command("fan_positive", "FORCE_ON", None).await.unwrap();
        let outcome = controller
            .apply_command("fan_positive", "AUTO", None)
            .await
            .unwrap();
        assert_eq!(outcome.state.fan_positive.mode, Mode::Auto);
        assert_eq!(outcome.state.fan_positive.state, PowerState::On);
        assert_eq!(outcome.message, "fan_positive set to AUTO");
    }

    #[tokio::test]
    async fn test_washer_auto_rejected_without_write() {
        let (store, _clock, controller) = setup();
        let before = controller.read_state().await.unwrap();

        let err = assert_err!(controller.apply_command("pressure_washer", "AUTO", None).await);
        assert!(matches!(
            err,
            ControlError::Validation(ValidationError::AutoNotPermitted(Device::PressureWasher))
        ));
        assert_eq!(store.writes(), 0);
        assert_eq!(store.snapshot(), Some(before));
    }

    #[tokio::test]
    async fn test_washer_timer_is_exact() {
        let (store, _clock, controller) = setup();

        let outcome = controller
            .apply_command("pressure_washer", "FORCE_ON", Some(120))
            .await
            .unwrap();
        let washer = &outcome.state.pressure_washer;
        assert_eq!(washer.mode, WasherMode::ForceOn);
        assert_eq!(washer.state, PowerState::On);
        assert_eq!(washer.timer_duration, 120);
        assert_eq!(washer.timer_started_at, Some(start()));
        assert_eq!(
            washer.timer_expires_at,
            Some(washer.timer_started_at.unwrap() + Duration::seconds(120))
        );
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_washer_default_timer_and_off_clears() {
        let (_store, clock, controller) = setup();

        let outcome = controller
            .apply_command("pressure_washer", "FORCE_ON", None)
            .await
            .unwrap();
        assert_eq!(outcome.state.pressure_washer.timer_duration, 300);

        clock.advance_secs(10);
        let outcome = controller
            .apply_command("pressure_washer", "FORCE_OFF", None)
            .await
            .unwrap();
        let washer = &outcome.state.pressure_washer;
        assert_eq!(washer.state, PowerState::Off);
        assert_eq!(washer.timer_duration, 0);
        assert!(washer.timer_started_at.is_none());
        assert!(washer.timer_expires_at.is_none());
        assert_eq!(outcome.state.updated_at, start() + Duration::seconds(10));
    }

    #[tokio::test]
    async fn test_read_after_write_is_fresh() {
        let (_store, _clock, controller) = setup();

        // Prime the cache with the default document
        let cached = controller.read_state().await.unwrap();
        assert_eq!(cached.light.state, PowerState::Off);

        let outcome = controller.apply_command("light", "FORCE_ON", None).await.unwrap();
        let read = controller.read_state().await.unwrap();
        assert_eq!(read, outcome.state);
        assert_eq!(read.light.state, PowerState::On);
    }

    #[tokio::test]
    async fn test_repeated_command_is_idempotent() {
        let (store, _clock, controller) = setup();

        let once = controller.apply_command("fan_negative", "FORCE_ON", None).await.unwrap();
        let twice = controller.apply_command("fan_negative", "FORCE_ON", None).await.unwrap();
        assert_eq!(once.state.fan_negative, twice.state.fan_negative);
        assert_eq!(once.state.light, twice.state.light);
        assert_eq!(once.state.pressure_washer, twice.state.pressure_washer);
        assert_eq!(store.writes(), 2);
    }

    #[tokio::test]
    async fn test_invalid_input_never_mutates() {
        let (store, _clock, controller) = setup();
        let before = controller.read_state().await.unwrap();

        assert!(matches!(
            controller.apply_command("sprinkler", "FORCE_ON", None).await,
            Err(ControlError::Validation(ValidationError::UnknownDevice(_)))
        ));
        assert!(matches!(
            controller.apply_command("light", "BLINK", None).await,
            Err(ControlError::Validation(ValidationError::UnknownMode(_)))
        ));
        assert_eq!(store.snapshot(), Some(before));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_and_leaves_document() {
        let (store, _clock, controller) = setup();
        let before = controller.read_state().await.unwrap();
        store.set_available(false);

        let err = assert_err!(controller.apply_command("light", "FORCE_ON", None).await);
        // Cache may still hold the pre-failure state; the write must not land
        assert!(matches!(err, ControlError::Store(StoreError::Unavailable(_))));
        assert_eq!(store.snapshot(), Some(before));
    }

    #[tokio::test]
    async fn test_persistent_conflict_gives_up() {
        let (store, ctx, controller) = conflicting_setup(usize::MAX);

        let err = assert_err!(controller.apply_command("light", "FORCE_ON", None).await);
        assert!(matches!(err, ControlError::Store(StoreError::Conflict { .. })));
        assert_eq!(store.attempts(), MAX_WRITE_ATTEMPTS);
        assert_eq!(store.inner.writes(), 0);
        assert_eq!(store.inner.snapshot().unwrap().light.state, PowerState::Off);
        assert_eq!(ctx.cache().invalidations(), 1);
    }

    #[tokio::test]
    async fn test_retried_command_invalidates_once() {
        let (store, ctx, controller) = conflicting_setup(MAX_WRITE_ATTEMPTS - 1);

        let outcome = controller.apply_command("fan_negative", "FORCE_ON", None).await.unwrap();
        assert_eq!(outcome.state.fan_negative.state, PowerState::On);
        assert_eq!(store.attempts(), MAX_WRITE_ATTEMPTS);
        assert_eq!(store.inner.writes(), 1);
        assert_eq!(ctx.cache().invalidations(), 1);
    }

    #[tokio::test]
    async fn test_oversized_timer_rejected_without_panic() {
        let store = Arc::new(MemoryStore::new());
        let ctx = ControlContext::new(store.clone()).with_timer_limits(TimerLimits {
            default_secs: 300,
            max_secs: u64::MAX,
        });
        let controller = DeviceController::new(Arc::new(ctx));

        let err = assert_err!(
            controller
                .apply_command("pressure_washer", "FORCE_ON", Some(10_000_000_000_000))
                .await
        );
        assert!(matches!(
            err,
            ControlError::Validation(ValidationError::InvalidTimerDuration {
                max: MAX_TIMER_SECS,
                ..
            })
        ));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_conflict_reapplies_on_fresh_document() {
        let (store, clock, controller) = setup();

        // Cache holds revision 0
        let stale = controller.read_state().await.unwrap();

        // Someone else writes behind the cache's back
        let mut concurrent = stale.clone();
        concurrent.fan_positive.apply_mode(Mode::ForceOn);
        concurrent.touch(clock.now());
        store.save(&concurrent, 0).await.unwrap();

        let outcome = controller.apply_command("light", "FORCE_ON", None).await.unwrap();
        assert_eq!(outcome.state.revision, 2);
        assert_eq!(outcome.state.light.state, PowerState::On);
        assert_eq!(outcome.state.fan_positive.state, PowerState::On);
        assert_eq!(store.snapshot(), Some(outcome.state));
    }
}

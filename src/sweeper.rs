//! Pressure washer safety sweep.
//!
//! Runs on its own interval, independent of client traffic, and force-disables
//! the pressure washer once its timer has run out. Reads go straight to the
//! store so a cached document can never hide an expired timer.

use crate::context::ControlContext;
use crate::error::StoreError;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Reference sweep period.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// What a single sweep tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// No control document exists yet.
    NoDocument,
    /// Nothing to enforce.
    Idle,
    /// The washer was switched off; `overrun_secs` past its expiry.
    Disabled { overrun_secs: i64 },
    /// A concurrent command replaced the document first; re-checked next tick.
    Superseded,
}

pub struct SafetySweeper {
    ctx: Arc<ControlContext>,
    interval: Duration,
}

impl SafetySweeper {
    pub fn new(ctx: Arc<ControlContext>, interval: Duration) -> Self {
        Self { ctx, interval }
    }

    /// Run one sweep. Idempotent: once the washer is off, later ticks are no-ops.
    pub async fn tick(&self) -> Result<SweepOutcome, StoreError> {
        let Some(mut state) = self
            .ctx
            .with_timeout(self.ctx.store().load_existing())
            .await?
        else {
            return Ok(SweepOutcome::NoDocument);
        };

        let now = self.ctx.clock().now();
        let washer = &state.pressure_washer;
        let Some(expires_at) = washer.timer_expires_at.filter(|_| washer.is_expired(now)) else {
            return Ok(SweepOutcome::Idle);
        };
        let overrun_secs = (now - expires_at).num_seconds();

        let expected_revision = state.revision;
        state.pressure_washer.stop();
        state.touch(now);

        let saved = self
            .ctx
            .with_timeout(self.ctx.store().save(&state, expected_revision))
            .await;
        self.ctx.cache().invalidate();

        match saved {
            Ok(()) => {
                info!(
                    "[Sweeper] Pressure washer timer expired {}s ago, forced OFF (revision {})",
                    overrun_secs, state.revision
                );
                Ok(SweepOutcome::Disabled { overrun_secs })
            }
            Err(StoreError::Conflict { expected, found }) => {
                warn!(
                    "[Sweeper] Control document changed during sweep (expected {}, found {}), deferring",
                    expected, found
                );
                Ok(SweepOutcome::Superseded)
            }
            Err(e) => Err(e),
        }
    }

    /// Spawn the recurring sweep. Failed ticks are logged and the schedule
    /// carries on.
    pub fn start(self) -> SweeperHandle {
        let token = CancellationToken::new();
        let cancel = token.clone();
        let task = tokio::spawn(async move {
            self.run(cancel).await;
        });
        SweeperHandle { token, task }
    }

    async fn run(self, cancel: CancellationToken) {
        info!(
            "[Sweeper] Started (interval {}s)",
            self.interval.as_secs_f32()
        );
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(outcome) => debug!("[Sweeper] Tick: {:?}", outcome),
                        Err(e) => error!("[Sweeper] Tick failed, retrying next interval: {}", e),
                    }
                }
            }
        }

        info!("[Sweeper] Stopped");
    }
}

/// Stop handle for a running sweeper.
pub struct SweeperHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Cancel the schedule and wait for an in-flight tick to finish.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            warn!("[Sweeper] Task ended abnormally: {}", e);
        }
    }
}

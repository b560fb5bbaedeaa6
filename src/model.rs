//! Control document data model.
//!
//! A deployment holds exactly one [`ControlState`]. It carries the operator
//! mode and commanded power state of every actuator in the enclosure, plus the
//! pressure washer's run timer.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Actuators managed by the control document.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Device {
    Light,
    FanPositive,
    FanNegative,
    PressureWasher,
}

/// Operator intent for a device.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    /// Driven by external automation; the state is left alone.
    Auto,
    ForceOn,
    ForceOff,
}

/// Pressure washer modes. AUTO is deliberately absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum WasherMode {
    ForceOn,
    ForceOff,
}

impl From<WasherMode> for Mode {
    fn from(mode: WasherMode) -> Self {
        match mode {
            WasherMode::ForceOn => Mode::ForceOn,
            WasherMode::ForceOff => Mode::ForceOff,
        }
    }
}

/// Commanded actuator output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    pub fn is_on(self) -> bool {
        matches!(self, PowerState::On)
    }
}

/// Mode/state pair for the light and both fans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceControl {
    pub mode: Mode,
    pub state: PowerState,
}

impl DeviceControl {
    /// Apply an operator mode. FORCE modes pin the state, AUTO leaves it as is.
    pub fn apply_mode(&mut self, mode: Mode) {
        self.mode = mode;
        match mode {
            Mode::ForceOn => self.state = PowerState::On,
            Mode::ForceOff => self.state = PowerState::Off,
            Mode::Auto => {}
        }
    }
}

impl Default for DeviceControl {
    fn default() -> Self {
        Self {
            mode: Mode::Auto,
            state: PowerState::Off,
        }
    }
}

/// Pressure washer control with its safety run timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PressureWasherControl {
    pub mode: WasherMode,
    pub state: PowerState,
    /// Allotted run time in seconds, 0 while off.
    pub timer_duration: u64,
    pub timer_started_at: Option<DateTime<Utc>>,
    pub timer_expires_at: Option<DateTime<Utc>>,
}

impl PressureWasherControl {
    /// Switch on and arm the timer for `duration_secs` from `now`.
    pub fn start(&mut self, now: DateTime<Utc>, duration_secs: u64) {
        self.mode = WasherMode::ForceOn;
        self.state = PowerState::On;
        self.timer_duration = duration_secs;
        self.timer_started_at = Some(now);
        // Saturate instead of overflowing the calendar range
        let expires_at = i64::try_from(duration_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|run| now.checked_add_signed(run))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.timer_expires_at = Some(expires_at);
    }

    /// Switch off and clear the timer regardless of its prior values.
    pub fn stop(&mut self) {
        self.mode = WasherMode::ForceOff;
        self.state = PowerState::Off;
        self.timer_duration = 0;
        self.timer_started_at = None;
        self.timer_expires_at = None;
    }

    /// True when the washer is running past its allotted time.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match (self.state, self.timer_expires_at) {
            (PowerState::On, Some(expires_at)) => now >= expires_at,
            _ => false,
        }
    }

    /// Seconds left on the timer, if running.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        if !self.state.is_on() {
            return None;
        }
        self.timer_expires_at
            .map(|expires_at| (expires_at - now).num_seconds().max(0))
    }
}

impl Default for PressureWasherControl {
    fn default() -> Self {
        Self {
            mode: WasherMode::ForceOff,
            state: PowerState::Off,
            timer_duration: 0,
            timer_started_at: None,
            timer_expires_at: None,
        }
    }
}

/// The singleton control document, serialized flat and keyed by device name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlState {
    pub light: DeviceControl,
    pub fan_positive: DeviceControl,
    pub fan_negative: DeviceControl,
    pub pressure_washer: PressureWasherControl,
    pub updated_at: DateTime<Utc>,
    /// Incremented on every persisted mutation, used for compare-and-swap saves.
    #[serde(default)]
    pub revision: u64,
}

impl ControlState {
    /// Fresh document with every device off and not pinned on.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            light: DeviceControl::default(),
            fan_positive: DeviceControl::default(),
            fan_negative: DeviceControl::default(),
            pressure_washer: PressureWasherControl::default(),
            updated_at: now,
            revision: 0,
        }
    }

    /// Mode/state pair for a switchable device. `None` for the pressure washer.
    pub fn switch(&self, device: Device) -> Option<&DeviceControl> {
        match device {
            Device::Light => Some(&self.light),
            Device::FanPositive => Some(&self.fan_positive),
            Device::FanNegative => Some(&self.fan_negative),
            Device::PressureWasher => None,
        }
    }

    /// Record a mutation. `updated_at` never moves backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = self.updated_at.max(now);
        self.revision += 1;
    }
}

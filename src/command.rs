//! Command validation at the boundary.
//!
//! Raw requests arrive as strings. They are turned into a [`ControlCommand`]
//! before anything touches the cache or the store, so an invalid combination
//! (such as AUTO for the pressure washer) cannot be represented past this point.

use crate::error::ValidationError;
use crate::model::{Device, Mode, WasherMode};
use log::debug;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Untrusted command body as received from a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub device: String,
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_duration: Option<u64>,
}

impl CommandRequest {
    pub fn new(device: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            mode: mode.into(),
            timer_duration: None,
        }
    }

    pub fn with_timer(mut self, secs: u64) -> Self {
        self.timer_duration = Some(secs);
        self
    }
}

/// Longest run time any configuration may allow, one day.
pub const MAX_TIMER_SECS: u64 = 86_400;

/// Pressure washer run-time limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerLimits {
    pub default_secs: u64,
    pub max_secs: u64,
}

impl Default for TimerLimits {
    fn default() -> Self {
        Self {
            default_secs: 300,
            max_secs: 3600,
        }
    }
}

impl TimerLimits {
    /// Usable limits satisfy `1 <= default_secs <= max_secs <= MAX_TIMER_SECS`.
    pub fn is_valid(&self) -> bool {
        self.default_secs >= 1
            && self.default_secs <= self.max_secs
            && self.max_secs <= MAX_TIMER_SECS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WasherCommand {
    On { timer_secs: u64 },
    Off,
}

impl WasherCommand {
    pub fn mode(self) -> WasherMode {
        match self {
            WasherCommand::On { .. } => WasherMode::ForceOn,
            WasherCommand::Off => WasherMode::ForceOff,
        }
    }
}

/// A validated command, one variant per device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Light(Mode),
    FanPositive(Mode),
    FanNegative(Mode),
    PressureWasher(WasherCommand),
}

impl ControlCommand {
    /// Validate device, then mode, then the pressure washer's extra rules.
    pub fn parse(
        device: &str,
        mode: &str,
        timer_duration: Option<u64>,
        limits: &TimerLimits,
    ) -> Result<Self, ValidationError> {
        let device = Device::from_str(device)
            .map_err(|_| ValidationError::UnknownDevice(device.to_string()))?;
        let mode =
            Mode::from_str(mode).map_err(|_| ValidationError::UnknownMode(mode.to_string()))?;

        let command = match device {
            Device::Light => ControlCommand::Light(mode),
            Device::FanPositive => ControlCommand::FanPositive(mode),
            Device::FanNegative => ControlCommand::FanNegative(mode),
            Device::PressureWasher => match mode {
                Mode::Auto => return Err(ValidationError::AutoNotPermitted(device)),
                Mode::ForceOff => ControlCommand::PressureWasher(WasherCommand::Off),
                Mode::ForceOn => {
                    let max_secs = limits.max_secs.min(MAX_TIMER_SECS);
                    let timer_secs = timer_duration.unwrap_or(limits.default_secs);
                    if timer_secs == 0 || timer_secs > max_secs {
                        return Err(ValidationError::InvalidTimerDuration {
                            duration: timer_secs,
                            max: max_secs,
                        });
                    }
                    return Ok(ControlCommand::PressureWasher(WasherCommand::On {
                        timer_secs,
                    }));
                }
            },
        };

        if let Some(secs) = timer_duration {
            debug!(
                "[Control] Ignoring timer_duration={}s for {} {}",
                secs, device, mode
            );
        }
        Ok(command)
    }

    pub fn from_request(
        request: &CommandRequest,
        limits: &TimerLimits,
    ) -> Result<Self, ValidationError> {
        Self::parse(
            &request.device,
            &request.mode,
            request.timer_duration,
            limits,
        )
    }

    pub fn device(&self) -> Device {
        match self {
            ControlCommand::Light(_) => Device::Light,
            ControlCommand::FanPositive(_) => Device::FanPositive,
            ControlCommand::FanNegative(_) => Device::FanNegative,
            ControlCommand::PressureWasher(_) => Device::PressureWasher,
        }
    }

    pub fn mode(&self) -> Mode {
        match *self {
            ControlCommand::Light(mode)
            | ControlCommand::FanPositive(mode)
            | ControlCommand::FanNegative(mode) => mode,
            ControlCommand::PressureWasher(cmd) => cmd.mode().into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(device: &str, mode: &str, timer: Option<u64>) -> Result<ControlCommand, ValidationError> {
        ControlCommand::parse(device, mode, timer, &TimerLimits::default())
    }

    #[test]
    fn test_switch_devices_accept_all_modes() {
        assert_eq!(parse("light", "AUTO", None), Ok(ControlCommand::Light(Mode::Auto)));
        assert_eq!(
            parse("fan_positive", "FORCE_ON", None),
            Ok(ControlCommand::FanPositive(Mode::ForceOn))
        );
        assert_eq!(
            parse("fan_negative", "FORCE_OFF", Some(60)),
            Ok(ControlCommand::FanNegative(Mode::ForceOff))
        );
    }

    #[test]
    fn test_unknown_device_checked_before_mode() {
        assert_eq!(
            parse("sprinkler", "BOGUS", None),
            Err(ValidationError::UnknownDevice("sprinkler".to_string()))
        );
    }

    #[test]
    fn test_unknown_mode() {
        assert_eq!(
            parse("light", "DIM", None),
            Err(ValidationError::UnknownMode("DIM".to_string()))
        );
    }

    #[test]
    fn test_washer_rejects_auto() {
        assert_eq!(
            parse("pressure_washer", "AUTO", None),
            Err(ValidationError::AutoNotPermitted(Device::PressureWasher))
        );
    }

    #[test]
    fn test_washer_timer_default_and_bounds() {
        assert_eq!(
            parse("pressure_washer", "FORCE_ON", None),
            Ok(ControlCommand::PressureWasher(WasherCommand::On { timer_secs: 300 }))
        );
        assert_eq!(
            parse("pressure_washer", "FORCE_ON", Some(120)),
            Ok(ControlCommand::PressureWasher(WasherCommand::On { timer_secs: 120 }))
        );
        assert!(matches!(
            parse("pressure_washer", "FORCE_ON", Some(0)),
            Err(ValidationError::InvalidTimerDuration { duration: 0, .. })
        ));
        assert!(matches!(
            parse("pressure_washer", "FORCE_ON", Some(7200)),
            Err(ValidationError::InvalidTimerDuration { max: 3600, .. })
        ));
    }

    #[test]
    fn test_oversized_max_is_capped() {
        let limits = TimerLimits {
            default_secs: 300,
            max_secs: u64::MAX,
        };
        assert!(!limits.is_valid());
        assert_eq!(
            ControlCommand::parse("pressure_washer", "FORCE_ON", Some(10_000_000_000_000), &limits),
            Err(ValidationError::InvalidTimerDuration {
                duration: 10_000_000_000_000,
                max: MAX_TIMER_SECS,
            })
        );
        assert_eq!(
            ControlCommand::parse("pressure_washer", "FORCE_ON", Some(MAX_TIMER_SECS), &limits),
            Ok(ControlCommand::PressureWasher(WasherCommand::On {
                timer_secs: MAX_TIMER_SECS
            }))
        );
    }

    #[test]
    fn test_limits_validity() {
        assert!(TimerLimits::default().is_valid());
        assert!(!TimerLimits { default_secs: 0, max_secs: 60 }.is_valid());
        assert!(!TimerLimits { default_secs: 300, max_secs: 120 }.is_valid());
    }

    #[test]
    fn test_washer_off_ignores_timer() {
        assert_eq!(
            parse("pressure_washer", "FORCE_OFF", Some(0)),
            Ok(ControlCommand::PressureWasher(WasherCommand::Off))
        );
    }

    #[test]
    fn test_request_deserializes_without_timer() {
        let request: CommandRequest =
            serde_json::from_str(r#"{"device":"light","mode":"FORCE_ON"}"#).unwrap();
        assert!(request.timer_duration.is_none());
        let command = ControlCommand::from_request(&request, &TimerLimits::default()).unwrap();
        assert_eq!(command.device(), Device::Light);
        assert_eq!(command.mode(), Mode::ForceOn);
    }
}

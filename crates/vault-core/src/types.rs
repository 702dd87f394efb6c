//! Core data types for npuvault
//!
//! The system state record and the value types its fields are made of.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Two-valued actuator state used by the fault diode and the array power bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    /// Textual form used on the wire and in the actuator channel
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchState::On => "on",
            SwitchState::Off => "off",
        }
    }

    pub fn is_on(&self) -> bool {
        matches!(self, SwitchState::On)
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwitchState {
    type Err = crate::Error;

    /// Strict parse: only the exact strings `on` and `off` are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on" => Ok(SwitchState::On),
            "off" => Ok(SwitchState::Off),
            other => Err(crate::Error::validation(format!(
                "Invalid state '{}'. Must be 'on' or 'off'.",
                other
            ))),
        }
    }
}

/// Fan speed in percent, always within `[0, 100]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FanSpeed(u8);

impl FanSpeed {
    pub const OFF: FanSpeed = FanSpeed(0);
    pub const FULL: FanSpeed = FanSpeed(100);

    /// Build a fan speed, clamping any integer into `[0, 100]`
    pub fn clamped(percent: i64) -> Self {
        FanSpeed(percent.clamp(0, 100) as u8)
    }

    /// Build a fan speed, rejecting values outside `[0, 100]`
    pub fn try_new(percent: i64) -> crate::Result<Self> {
        if (0..=100).contains(&percent) {
            Ok(FanSpeed(percent as u8))
        } else {
            Err(crate::Error::validation(format!(
                "Invalid speed {}. Must be an integer between 0 and 100.",
                percent
            )))
        }
    }

    pub fn percent(&self) -> u8 {
        self.0
    }

    pub fn is_full(&self) -> bool {
        self.0 >= 100
    }
}

impl fmt::Display for FanSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current state of the appliance.
///
/// Holds only the latest value of each field; no history is kept.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    /// Last reported host temperature in °C
    pub temperature_c: f64,

    /// Commanded fan speed
    pub fan_speed_percent: FanSpeed,

    /// Fault-injection diode state
    pub diode_state: SwitchState,

    /// Drive array power bus state
    pub power_state: SwitchState,
}

impl SystemState {
    /// Create a state with the given starting temperature and everything else at rest
    pub fn with_temperature(temperature_c: f64) -> Self {
        Self {
            temperature_c,
            ..Self::default()
        }
    }
}

impl Default for SystemState {
    fn default() -> Self {
        Self {
            temperature_c: 55.0,
            fan_speed_percent: FanSpeed::OFF,
            diode_state: SwitchState::Off,
            power_state: SwitchState::On,
        }
    }
}

/// Severity of an alert raised by the safety controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Error,
    Critical,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertLevel::Warning => "warning",
            AlertLevel::Error => "error",
            AlertLevel::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// An alert handed to the external notification collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(level: AlertLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            raised_at: Utc::now(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Error, message)
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self::new(AlertLevel::Critical, message)
    }
}

//! Thermal escalation rule

use vault_core::{ActuatorWrite, FanSpeed, SafetyConfig, SystemState};

/// Outcome of one control-loop evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// State to store once the evaluation is applied
    pub new_state: SystemState,

    /// Actuator writes to publish, in order
    pub commands: Vec<ActuatorWrite>,
}

impl Evaluation {
    /// True when the evaluation only records the sample
    pub fn is_noop(&self) -> bool {
        self.commands.is_empty()
    }

    /// True when the fan was forced to full speed
    pub fn escalated(&self) -> bool {
        self.commands
            .iter()
            .any(|c| matches!(c, ActuatorWrite::FanSpeed(speed) if speed.is_full()))
    }
}

/// Pure decision logic turning temperature samples into actuator commands.
///
/// `evaluate` never fails and never touches shared state; the same inputs
/// always yield the same evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyControlLoop {
    critical_temperature_c: f64,
}

impl SafetyControlLoop {
    pub fn new(critical_temperature_c: f64) -> Self {
        Self {
            critical_temperature_c,
        }
    }

    pub fn from_config(config: &SafetyConfig) -> Self {
        Self::new(config.critical_temperature_c)
    }

    pub fn critical_temperature_c(&self) -> f64 {
        self.critical_temperature_c
    }

    /// Record `temperature_c` and derive the commands it requires.
    ///
    /// The fan is forced to full speed only when the reading is strictly above
    /// the critical threshold and the fan is not already at full speed, so an
    /// elevated temperature produces a single write per transition.
    pub fn evaluate(&self, temperature_c: f64, current: &SystemState) -> Evaluation {
        let mut new_state = *current;
        new_state.temperature_c = temperature_c;

        let mut commands = Vec::new();
        if temperature_c > self.critical_temperature_c && !current.fan_speed_percent.is_full() {
            new_state.fan_speed_percent = FanSpeed::FULL;
            commands.push(ActuatorWrite::FanSpeed(FanSpeed::FULL));
        }

        Evaluation {
            new_state,
            commands,
        }
    }
}

impl Default for SafetyControlLoop {
    fn default() -> Self {
        Self::from_config(&SafetyConfig::default())
    }
}

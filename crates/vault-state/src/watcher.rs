//! Peripheral-side polling of the actuator channel

use crate::actuator::{read_diode_state, read_fan_speed};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use vault_core::{ActuatorConfig, FanSpeed, SwitchState};

/// Which actuator a watcher follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peripheral {
    Fan,
    Diode,
}

impl fmt::Display for Peripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Peripheral::Fan => f.write_str("fan"),
            Peripheral::Diode => f.write_str("diode"),
        }
    }
}

/// A value observed by a watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralReading {
    Fan(FanSpeed),
    Diode(SwitchState),
}

impl fmt::Display for PeripheralReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeripheralReading::Fan(speed) if *speed == FanSpeed::OFF => f.write_str("Fan is OFF"),
            PeripheralReading::Fan(speed) => write!(f, "Fan speed set to {}%", speed),
            PeripheralReading::Diode(SwitchState::On) => {
                f.write_str("Diode is ON (simulating fault condition)")
            }
            PeripheralReading::Diode(SwitchState::Off) => {
                f.write_str("Diode is OFF (normal operation)")
            }
        }
    }
}

/// Polls one published actuator value and reports changes.
///
/// Mirrors an independent peripheral process: it only ever reads, applies the
/// fail-safe defaults, and is not synchronised with the controller's writes.
pub struct PeripheralWatcher {
    peripheral: Peripheral,
    path: PathBuf,
    interval: Duration,
    last: Option<PeripheralReading>,
}

impl PeripheralWatcher {
    pub fn new(peripheral: Peripheral, path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            peripheral,
            path: path.into(),
            interval,
            last: None,
        }
    }

    /// Create a watcher for the given actuator using the configured paths and cadence
    pub fn from_config(peripheral: Peripheral, config: &ActuatorConfig) -> Self {
        let path = match peripheral {
            Peripheral::Fan => config.fan_path(),
            Peripheral::Diode => config.diode_path(),
        };
        Self::new(peripheral, path, config.poll_interval())
    }

    /// Read the current value
    pub async fn read(&self) -> PeripheralReading {
        match self.peripheral {
            Peripheral::Fan => PeripheralReading::Fan(read_fan_speed(&self.path).await),
            Peripheral::Diode => PeripheralReading::Diode(read_diode_state(&self.path).await),
        }
    }

    /// Read once; returns the reading only if it differs from the previous poll
    pub async fn poll_once(&mut self) -> Option<PeripheralReading> {
        let reading = self.read().await;
        if self.last == Some(reading) {
            return None;
        }
        self.last = Some(reading);
        Some(reading)
    }

    /// Poll on the configured cadence until `running` is cleared
    pub async fn run(mut self, running: Arc<AtomicBool>) {
        info!(
            "Watching {} actuator at {} every {:?}",
            self.peripheral,
            self.path.display(),
            self.interval
        );

        let mut ticker = tokio::time::interval(self.interval);
        while running.load(Ordering::Relaxed) {
            ticker.tick().await;
            if let Some(reading) = self.poll_once().await {
                info!(peripheral = %self.peripheral, "{}", reading);
            }
        }
    }
}

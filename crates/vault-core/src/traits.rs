//! Core traits for npuvault components
//!
//! These traits define the outbound seams of the controller: the actuator
//! side-channel polled by external peripherals, and the alert sink consumed
//! by the notification collaborator.

use crate::{Alert, FanSpeed, Result, SwitchState};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Durable side-channel through which desired actuator values are published.
///
/// Writes are idempotent: publishing the same value twice leaves the same
/// observable end state. No acknowledgment of application is returned.
#[async_trait]
pub trait ActuatorChannel: Send + Sync {
    /// Publish the desired fan speed
    async fn set_fan_speed(&self, speed: FanSpeed) -> Result<()>;

    /// Publish the desired fault-diode state
    async fn set_diode_state(&self, state: SwitchState) -> Result<()>;

    /// Remove any previously published values so readers fall back to safe defaults
    async fn reset(&self) -> Result<()>;
}

/// Destination for alerts raised by the safety controller
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver a single alert
    async fn send_alert(&self, alert: &Alert) -> Result<()>;
}

/// A single write observed on an actuator channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorWrite {
    FanSpeed(FanSpeed),
    DiodeState(SwitchState),
}

/// In-memory actuator channel that records every write, for tests and dry runs
#[derive(Debug, Clone, Default)]
pub struct RecordingActuatorChannel {
    writes: Arc<RwLock<Vec<ActuatorWrite>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingActuatorChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a transient I/O error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// All writes in publication order
    pub async fn writes(&self) -> Vec<ActuatorWrite> {
        self.writes.read().await.clone()
    }

    /// Last published fan speed, or the safe default
    pub async fn last_fan_speed(&self) -> FanSpeed {
        self.writes
            .read()
            .await
            .iter()
            .rev()
            .find_map(|w| match w {
                ActuatorWrite::FanSpeed(speed) => Some(*speed),
                _ => None,
            })
            .unwrap_or(FanSpeed::OFF)
    }

    /// Last published diode state, or the safe default
    pub async fn last_diode_state(&self) -> SwitchState {
        self.writes
            .read()
            .await
            .iter()
            .rev()
            .find_map(|w| match w {
                ActuatorWrite::DiodeState(state) => Some(*state),
                _ => None,
            })
            .unwrap_or(SwitchState::Off)
    }

    async fn record(&self, write: ActuatorWrite) -> Result<()> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(crate::Error::transient_io("recording channel set to fail"));
        }
        self.writes.write().await.push(write);
        Ok(())
    }
}

#[async_trait]
impl ActuatorChannel for RecordingActuatorChannel {
    async fn set_fan_speed(&self, speed: FanSpeed) -> Result<()> {
        self.record(ActuatorWrite::FanSpeed(speed)).await
    }

    async fn set_diode_state(&self, state: SwitchState) -> Result<()> {
        self.record(ActuatorWrite::DiodeState(state)).await
    }

    async fn reset(&self) -> Result<()> {
        self.writes.write().await.clear();
        Ok(())
    }
}

/// In-memory alert sink that keeps every delivered alert
#[derive(Debug, Clone, Default)]
pub struct RecordingAlertSink {
    alerts: Arc<RwLock<Vec<Alert>>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        self.alerts.read().await.clone()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn send_alert(&self, alert: &Alert) -> Result<()> {
        self.alerts.write().await.push(alert.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_channel_defaults_to_safe_values() {
        let channel = RecordingActuatorChannel::new();
        assert_eq!(channel.last_fan_speed().await, FanSpeed::OFF);
        assert_eq!(channel.last_diode_state().await, SwitchState::Off);
    }

    #[tokio::test]
    async fn test_recording_channel_tracks_writes() {
        let channel = RecordingActuatorChannel::new();
        channel.set_fan_speed(FanSpeed::clamped(40)).await.unwrap();
        channel.set_diode_state(SwitchState::On).await.unwrap();
        channel.set_fan_speed(FanSpeed::FULL).await.unwrap();

        assert_eq!(channel.writes().await.len(), 3);
        assert_eq!(channel.last_fan_speed().await, FanSpeed::FULL);
        assert_eq!(channel.last_diode_state().await, SwitchState::On);

        channel.reset().await.unwrap();
        assert!(channel.writes().await.is_empty());
    }

    #[tokio::test]
    async fn test_recording_channel_failure_mode() {
        let channel = RecordingActuatorChannel::new();
        channel.set_failing(true);
        let err = channel.set_fan_speed(FanSpeed::FULL).await.unwrap_err();
        assert!(err.is_transient());
        assert!(channel.writes().await.is_empty());
    }

    #[tokio::test]
    async fn test_recording_alert_sink() {
        let sink = RecordingAlertSink::new();
        sink.send_alert(&Alert::warning("drive hot")).await.unwrap();
        let alerts = sink.alerts().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].message, "drive hot");
    }
}

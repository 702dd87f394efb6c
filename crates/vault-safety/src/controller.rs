//! Applies control decisions to the state store, the actuator channel and the alert sink

use crate::alerts::AlertDispatcher;
use crate::control::{Evaluation, SafetyControlLoop};
use crate::policy::{HealthReport, RemediationPlan, RemediationPolicy};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vault_core::{ActuatorChannel, ActuatorWrite, FanSpeed, SafetyConfig, SwitchState, SystemState};
use vault_state::StateStore;

/// Controller statistics
#[derive(Debug, Default)]
pub struct ControllerStats {
    pub evaluations: AtomicU64,
    pub escalations: AtomicU64,
    pub remediations: AtomicU64,
    pub actuator_failures: AtomicU64,
}

/// Owns every mutation of the system state.
///
/// All mutators take the same evaluation lock, so one evaluation's state
/// transition and actuator writes are never interleaved with another's.
/// Actuator and alert failures are logged and never returned.
pub struct SafetyController {
    store: StateStore,
    actuators: Arc<dyn ActuatorChannel>,
    alerts: AlertDispatcher,
    control: SafetyControlLoop,
    policy: RemediationPolicy,
    evaluation_lock: Mutex<()>,
    stats: ControllerStats,
}

impl SafetyController {
    pub fn new(
        config: &SafetyConfig,
        store: StateStore,
        actuators: Arc<dyn ActuatorChannel>,
        alerts: AlertDispatcher,
    ) -> Self {
        Self {
            store,
            actuators,
            alerts,
            control: SafetyControlLoop::from_config(config),
            policy: RemediationPolicy::from_config(config),
            evaluation_lock: Mutex::new(()),
            stats: ControllerStats::default(),
        }
    }

    /// Current state
    pub async fn snapshot(&self) -> SystemState {
        self.store.snapshot().await
    }

    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }

    /// Ingest a temperature sample and apply the resulting evaluation
    pub async fn report_temperature(&self, temperature_c: f64) -> SystemState {
        let _guard = self.evaluation_lock.lock().await;
        self.stats.evaluations.fetch_add(1, Ordering::Relaxed);

        let evaluation = self.commit(|current| self.control.evaluate(temperature_c, current)).await;
        if evaluation.escalated() {
            self.stats.escalations.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Critical temperature {:.1}°C detected, forcing fan to 100%",
                temperature_c
            );
        } else {
            debug!("Temperature update: {:.1}°C", temperature_c);
        }

        self.publish(&evaluation.commands).await;
        evaluation.new_state
    }

    /// Override the fan speed
    pub async fn set_fan_speed(&self, speed: FanSpeed) -> SystemState {
        let _guard = self.evaluation_lock.lock().await;
        let evaluation = self
            .commit(|current| {
                let mut new_state = *current;
                new_state.fan_speed_percent = speed;
                Evaluation {
                    new_state,
                    commands: vec![ActuatorWrite::FanSpeed(speed)],
                }
            })
            .await;

        info!("Fan speed set to {}%", speed);
        self.publish(&evaluation.commands).await;
        evaluation.new_state
    }

    /// Set the fault-injection diode
    pub async fn set_diode_state(&self, state: SwitchState) -> SystemState {
        let _guard = self.evaluation_lock.lock().await;
        let evaluation = self
            .commit(|current| {
                let mut new_state = *current;
                new_state.diode_state = state;
                Evaluation {
                    new_state,
                    commands: vec![ActuatorWrite::DiodeState(state)],
                }
            })
            .await;

        info!("Fault diode set to {}", state);
        self.publish(&evaluation.commands).await;
        evaluation.new_state
    }

    /// Switch the drive array power bus
    pub async fn set_array_power(&self, state: SwitchState) -> SystemState {
        let _guard = self.evaluation_lock.lock().await;
        let new_state = self.apply_power(state).await;
        info!("Power supply turning {}", state);
        new_state
    }

    /// Run the remediation policy over `report` and carry out the chosen plan
    pub async fn assess(&self, report: &HealthReport) -> RemediationPlan {
        let _guard = self.evaluation_lock.lock().await;
        let plan = self.policy.assess(report);

        if plan.is_nominal() {
            debug!("System health is nominal, no action required");
            return plan;
        }

        self.stats.remediations.fetch_add(1, Ordering::Relaxed);
        info!("Remediation selected: {:?}", plan.condition);

        if plan.cut_power {
            self.apply_power(SwitchState::Off).await;
        }
        if let Some(alert) = &plan.alert {
            self.alerts.dispatch(alert.to_alert());
        }

        plan
    }

    async fn apply_power(&self, state: SwitchState) -> SystemState {
        self.commit(|current| {
            let mut new_state = *current;
            new_state.power_state = state;
            Evaluation {
                new_state,
                commands: Vec::new(),
            }
        })
        .await
        .new_state
    }

    /// Compute an evaluation against the latest snapshot and store it,
    /// recomputing if the state moved underneath.
    async fn commit<F>(&self, decide: F) -> Evaluation
    where
        F: Fn(&SystemState) -> Evaluation,
    {
        loop {
            let current = self.store.snapshot().await;
            let evaluation = decide(&current);
            if self.store.compare_and_set(&current, evaluation.new_state).await {
                return evaluation;
            }
            debug!("System state changed during evaluation, retrying");
        }
    }

    async fn publish(&self, commands: &[ActuatorWrite]) {
        for command in commands {
            let result = match command {
                ActuatorWrite::FanSpeed(speed) => self.actuators.set_fan_speed(*speed).await,
                ActuatorWrite::DiodeState(state) => self.actuators.set_diode_state(*state).await,
            };
            if let Err(e) = result {
                self.stats.actuator_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Failed to publish {:?}: {}", command, e);
            }
        }
    }
}

impl std::fmt::Debug for SafetyController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyController")
            .field("control", &self.control)
            .field("policy", &self.policy)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{DriveHealth, RaidHealth, HIGH_TEMPERATURE_MARKER};
    use std::time::Duration;
    use vault_core::{AlertLevel, RecordingActuatorChannel, RecordingAlertSink};

    struct Harness {
        controller: Arc<SafetyController>,
        channel: RecordingActuatorChannel,
        sink: RecordingAlertSink,
    }

    fn harness() -> Harness {
        let channel = RecordingActuatorChannel::new();
        let sink = RecordingAlertSink::new();
        let controller = SafetyController::new(
            &SafetyConfig::default(),
            StateStore::default(),
            Arc::new(channel.clone()),
            AlertDispatcher::new(Arc::new(sink.clone()), Duration::from_secs(1)),
        );
        Harness {
            controller: Arc::new(controller),
            channel,
            sink,
        }
    }

    async fn wait_for_alerts(sink: &RecordingAlertSink, count: usize) {
        for _ in 0..100 {
            if sink.alerts().await.len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_hot_sample_forces_fan_and_publishes_once() {
        let h = harness();
        h.controller.set_fan_speed(FanSpeed::clamped(20)).await;

        let state = h.controller.report_temperature(85.0).await;
        assert_eq!(state.fan_speed_percent, FanSpeed::FULL);
        h.controller.report_temperature(86.0).await;

        assert_eq!(
            h.channel.writes().await,
            vec![
                ActuatorWrite::FanSpeed(FanSpeed::clamped(20)),
                ActuatorWrite::FanSpeed(FanSpeed::FULL),
            ]
        );
        assert_eq!(h.controller.stats().escalations.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_actuator_failure_does_not_abort_decision() {
        let h = harness();
        h.channel.set_failing(true);

        let state = h.controller.report_temperature(95.0).await;
        assert_eq!(state.fan_speed_percent, FanSpeed::FULL);
        assert_eq!(h.controller.snapshot().await.fan_speed_percent, FanSpeed::FULL);
        assert_eq!(h.controller.stats().actuator_failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_diode_writes_are_idempotent() {
        let h = harness();
        let once = h.controller.set_diode_state(SwitchState::On).await;
        let twice = h.controller.set_diode_state(SwitchState::On).await;

        assert_eq!(once, twice);
        assert_eq!(h.channel.last_diode_state().await, SwitchState::On);
    }

    #[tokio::test]
    async fn test_array_power_is_state_only() {
        let h = harness();
        let state = h.controller.set_array_power(SwitchState::Off).await;

        assert_eq!(state.power_state, SwitchState::Off);
        assert!(h.channel.writes().await.is_empty());
    }

    #[tokio::test]
    async fn test_assess_cuts_power_and_alerts() {
        let h = harness();
        let report = HealthReport {
            drives: vec![DriveHealth {
                name: "sda".to_string(),
                temperature_c: Some(68.0),
                errors: vec![HIGH_TEMPERATURE_MARKER.to_string()],
                ..Default::default()
            }],
            raid_arrays: vec![RaidHealth {
                name: "/dev/md0".to_string(),
                status: "degraded".to_string(),
                errors: Vec::new(),
            }],
            ..Default::default()
        };

        let plan = h.controller.assess(&report).await;
        assert!(plan.cut_power);
        assert_eq!(h.controller.snapshot().await.power_state, SwitchState::Off);

        wait_for_alerts(&h.sink, 1).await;
        let alerts = h.sink.alerts().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, AlertLevel::Warning);
    }

    #[tokio::test]
    async fn test_degraded_array_keeps_power_on() {
        let h = harness();
        let report = HealthReport {
            raid_arrays: vec![RaidHealth {
                name: "/dev/md0".to_string(),
                status: "degraded".to_string(),
                errors: Vec::new(),
            }],
            ..Default::default()
        };

        let plan = h.controller.assess(&report).await;
        assert!(!plan.cut_power);
        assert_eq!(h.controller.snapshot().await.power_state, SwitchState::On);

        wait_for_alerts(&h.sink, 1).await;
        assert_eq!(h.sink.alerts().await[0].level, AlertLevel::Critical);
    }

    #[tokio::test]
    async fn test_concurrent_mutations_do_not_interleave() {
        let h = harness();
        let mut handles = Vec::new();

        for i in 0..20 {
            let controller = Arc::clone(&h.controller);
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    controller.report_temperature(90.0).await;
                } else {
                    controller.set_fan_speed(FanSpeed::clamped(10)).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // The last published fan value always matches the stored one
        let state = h.controller.snapshot().await;
        assert_eq!(h.channel.last_fan_speed().await, state.fan_speed_percent);
        assert_eq!(state.temperature_c, 90.0);
    }
}

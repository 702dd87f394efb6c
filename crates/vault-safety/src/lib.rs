//! # vault-safety
//!
//! Reactive safety logic for npuvault.
//!
//! - `SafetyControlLoop`: pure thermal escalation rule
//! - `RemediationPolicy`: priority-ordered response to host, drive and array health
//! - `SafetyController`: applies both atomically to the state store and actuator channel
//! - Alert sinks and a non-blocking `AlertDispatcher`
//!
//! ## Example
//!
//! ```rust
//! use vault_core::{FanSpeed, SystemState};
//! use vault_safety::SafetyControlLoop;
//!
//! let current = SystemState {
//!     fan_speed_percent: FanSpeed::clamped(20),
//!     ..SystemState::default()
//! };
//! let evaluation = SafetyControlLoop::new(80.0).evaluate(85.0, &current);
//!
//! assert_eq!(evaluation.new_state.fan_speed_percent, FanSpeed::FULL);
//! assert_eq!(evaluation.commands.len(), 1);
//! ```

pub mod alerts;
pub mod control;
pub mod controller;
pub mod policy;

pub use alerts::{create_alert_sink, AlertDispatcher, DeliveryStats, LogAlertSink, WebhookAlertSink};
pub use control::{Evaluation, SafetyControlLoop};
pub use controller::{ControllerStats, SafetyController};
pub use policy::{
    Condition, DriveHealth, HealthReport, HostHealth, PlannedAlert, RaidHealth, RemediationPlan,
    RemediationPolicy,
};

//! # vault-core
//!
//! Core types, traits, and utilities for npuvault - a supervisory controller
//! for an NPU-equipped storage appliance.
//!
//! This crate provides the foundational data structures and interfaces that are
//! shared across all other npuvault components. It includes:
//!
//! - The system state record and its strongly-typed fields
//! - Traits for the actuator side-channel and alert delivery
//! - Configuration schema and layered loading
//! - Error handling types and utilities

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used types at the crate root
pub use config::{
    ActuatorConfig, AlertConfig, Config, NpuBackendKind, NpuConfig, QueueConfig, SafetyConfig,
    ServerConfig,
};
pub use error::{Error, Result};
pub use traits::{
    ActuatorChannel, ActuatorWrite, AlertSink, RecordingActuatorChannel, RecordingAlertSink,
};
pub use types::{Alert, AlertLevel, FanSpeed, SwitchState, SystemState};

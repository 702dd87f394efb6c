//! Priority-ordered remediation policy
//!
//! Conditions are checked in a fixed order and the first match wins:
//!
//! 1. host critical temperature: cut array power, critical alert
//! 2. predicted drive failure: cut array power, error alert naming the drive
//! 3. drive over-temperature: cut array power, warning alert
//! 4. degraded array: critical alert only, power stays on
//! 5. otherwise nominal
//!
//! Each condition is detected either from the typed metrics or from the error
//! markers the health collectors emit.

use serde::{Deserialize, Serialize};
use vault_core::{Alert, AlertLevel, SafetyConfig};

/// Marker raised by the host monitor when the CPU overheats
pub const HOST_CRITICAL_MARKER: &str = "CPU temperature critical";

/// Marker raised when S.M.A.R.T. data predicts imminent failure
pub const LIFESPAN_MARKER: &str = "S.M.A.R.T. Lifespan Warning";

/// Marker raised when a drive runs hot
pub const HIGH_TEMPERATURE_MARKER: &str = "High Temperature Alert";

/// Array status reported while redundancy is lost
pub const DEGRADED_STATUS: &str = "degraded";

/// Accelerator host health
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostHealth {
    pub cpu_temperature_c: Option<f64>,
    pub errors: Vec<String>,
}

/// Health of one attached drive
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveHealth {
    pub name: String,
    pub temperature_c: Option<f64>,
    pub reallocated_sectors: Option<u64>,
    pub errors: Vec<String>,
}

/// Health of one redundant array
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaidHealth {
    pub name: String,
    pub status: String,
    pub errors: Vec<String>,
}

/// Snapshot of everything the policy looks at
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthReport {
    pub host: HostHealth,
    pub drives: Vec<DriveHealth>,
    pub raid_arrays: Vec<RaidHealth>,
}

/// The condition that selected a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum Condition {
    HostCritical,
    DriveFailurePredicted { drive: String },
    DriveOverTemperature { drive: String },
    ArrayDegraded { array: String },
    Nominal,
}

/// Alert a plan will raise
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAlert {
    pub level: AlertLevel,
    pub message: String,
}

impl PlannedAlert {
    fn new(level: AlertLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    /// Stamp the alert for delivery
    pub fn to_alert(&self) -> Alert {
        Alert::new(self.level, self.message.clone())
    }
}

/// The single action path chosen for a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationPlan {
    #[serde(flatten)]
    pub condition: Condition,
    pub cut_power: bool,
    pub alert: Option<PlannedAlert>,
}

impl RemediationPlan {
    fn nominal() -> Self {
        Self {
            condition: Condition::Nominal,
            cut_power: false,
            alert: None,
        }
    }

    pub fn is_nominal(&self) -> bool {
        self.condition == Condition::Nominal
    }
}

/// Thresholds used to detect conditions from metrics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemediationPolicy {
    host_critical_temperature_c: f64,
    drive_max_temperature_c: f64,
    reallocated_sector_limit: u64,
}

impl RemediationPolicy {
    pub fn from_config(config: &SafetyConfig) -> Self {
        Self {
            host_critical_temperature_c: config.host_critical_temperature_c,
            drive_max_temperature_c: config.drive_max_temperature_c,
            reallocated_sector_limit: config.reallocated_sector_limit,
        }
    }

    /// Pick the plan for `report`. Only the highest-priority match is returned.
    pub fn assess(&self, report: &HealthReport) -> RemediationPlan {
        if self.host_is_critical(&report.host) {
            return RemediationPlan {
                condition: Condition::HostCritical,
                cut_power: true,
                alert: Some(PlannedAlert::new(
                    AlertLevel::Critical,
                    "Orange Pi CPU is overheating. Shutting down drive array to prevent damage.",
                )),
            };
        }

        if let Some(drive) = report.drives.iter().find(|d| self.failure_predicted(d)) {
            return RemediationPlan {
                condition: Condition::DriveFailurePredicted {
                    drive: drive.name.clone(),
                },
                cut_power: true,
                alert: Some(PlannedAlert::new(
                    AlertLevel::Error,
                    format!(
                        "Drive failure predicted by S.M.A.R.T. data on {}. Powering down array for maintenance.",
                        display_name(&drive.name, "unknown drive")
                    ),
                )),
            };
        }

        if let Some(drive) = report.drives.iter().find(|d| self.over_temperature(d)) {
            return RemediationPlan {
                condition: Condition::DriveOverTemperature {
                    drive: drive.name.clone(),
                },
                cut_power: true,
                alert: Some(PlannedAlert::new(
                    AlertLevel::Warning,
                    "A drive is overheating. Array has been powered down.",
                )),
            };
        }

        if let Some(array) = report
            .raid_arrays
            .iter()
            .find(|a| a.status.contains(DEGRADED_STATUS))
        {
            return RemediationPlan {
                condition: Condition::ArrayDegraded {
                    array: array.name.clone(),
                },
                cut_power: false,
                alert: Some(PlannedAlert::new(
                    AlertLevel::Critical,
                    "RAID array is DEGRADED. Data is at risk. Replace failed drive immediately.",
                )),
            };
        }

        RemediationPlan::nominal()
    }

    fn host_is_critical(&self, host: &HostHealth) -> bool {
        has_marker(&host.errors, HOST_CRITICAL_MARKER)
            || host
                .cpu_temperature_c
                .is_some_and(|t| t >= self.host_critical_temperature_c)
    }

    fn failure_predicted(&self, drive: &DriveHealth) -> bool {
        has_marker(&drive.errors, LIFESPAN_MARKER)
            || drive
                .reallocated_sectors
                .is_some_and(|n| n >= self.reallocated_sector_limit)
    }

    fn over_temperature(&self, drive: &DriveHealth) -> bool {
        has_marker(&drive.errors, HIGH_TEMPERATURE_MARKER)
            || drive
                .temperature_c
                .is_some_and(|t| t >= self.drive_max_temperature_c)
    }
}

impl Default for RemediationPolicy {
    fn default() -> Self {
        Self::from_config(&SafetyConfig::default())
    }
}

fn has_marker(errors: &[String], marker: &str) -> bool {
    errors.iter().any(|e| e == marker)
}

fn display_name<'a>(name: &'a str, fallback: &'a str) -> &'a str {
    if name.is_empty() {
        fallback
    } else {
        name
    }
}

//! File-backed actuator side-channel
//!
//! Each actuator has one file holding its desired value as plain text. The
//! controller publishes; external peripherals poll. Readers treat a missing or
//! unparsable file as the safe default (fan `0`, diode `off`).

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use vault_core::{ActuatorChannel, ActuatorConfig, FanSpeed, Result, SwitchState};

/// Publishes actuator values to well-known files
#[derive(Debug, Clone)]
pub struct FileActuatorChannel {
    fan_path: PathBuf,
    diode_path: PathBuf,
}

impl FileActuatorChannel {
    /// Create a channel writing to the given files
    pub fn new(fan_path: impl Into<PathBuf>, diode_path: impl Into<PathBuf>) -> Self {
        Self {
            fan_path: fan_path.into(),
            diode_path: diode_path.into(),
        }
    }

    /// Create a channel from the actuator configuration
    pub fn from_config(config: &ActuatorConfig) -> Self {
        Self::new(config.fan_path(), config.diode_path())
    }

    pub fn fan_path(&self) -> &Path {
        &self.fan_path
    }

    pub fn diode_path(&self) -> &Path {
        &self.diode_path
    }

    /// Write through a sibling temp file and rename, so a polling reader never
    /// observes a half-written value.
    async fn publish(path: &Path, value: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    vault_core::Error::transient_io(format!(
                        "Failed to create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, value).await.map_err(|e| {
            vault_core::Error::transient_io(format!("Failed to write {}: {}", tmp.display(), e))
        })?;
        tokio::fs::rename(&tmp, path).await.map_err(|e| {
            vault_core::Error::transient_io(format!("Failed to publish {}: {}", path.display(), e))
        })?;

        debug!("Published '{}' to {}", value, path.display());
        Ok(())
    }

    async fn remove(path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                info!("Removed stale actuator state {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(vault_core::Error::transient_io(format!(
                "Failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[async_trait]
impl ActuatorChannel for FileActuatorChannel {
    async fn set_fan_speed(&self, speed: FanSpeed) -> Result<()> {
        Self::publish(&self.fan_path, &speed.to_string()).await
    }

    async fn set_diode_state(&self, state: SwitchState) -> Result<()> {
        Self::publish(&self.diode_path, state.as_str()).await
    }

    async fn reset(&self) -> Result<()> {
        Self::remove(&self.fan_path).await?;
        Self::remove(&self.diode_path).await
    }
}

/// Parse a published fan value, clamping it into range
pub fn parse_fan_speed(raw: &str) -> Option<FanSpeed> {
    raw.trim().parse::<i64>().ok().map(FanSpeed::clamped)
}

/// Parse a published diode value, case-insensitively
pub fn parse_diode_state(raw: &str) -> Option<SwitchState> {
    raw.trim().to_lowercase().parse::<SwitchState>().ok()
}

/// Read the desired fan speed, falling back to `0` when absent or unreadable
pub async fn read_fan_speed(path: &Path) -> FanSpeed {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => parse_fan_speed(&raw).unwrap_or_else(|| {
            warn!("Unparsable fan value in {}, using safe default", path.display());
            FanSpeed::OFF
        }),
        Err(_) => FanSpeed::OFF,
    }
}

/// Read the desired diode state, falling back to `off` when absent or unreadable
pub async fn read_diode_state(path: &Path) -> SwitchState {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => parse_diode_state(&raw).unwrap_or_else(|| {
            warn!("Unparsable diode value in {}, using safe default", path.display());
            SwitchState::Off
        }),
        Err(_) => SwitchState::Off,
    }
}

//! Configuration management for npuvault
//!
//! Provides a unified configuration system that supports YAML files,
//! environment variables, and command-line argument overrides.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for npuvault components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// HTTP surface configuration
    pub server: ServerConfig,

    /// Actuator side-channel configuration
    pub actuator: ActuatorConfig,

    /// Safety control loop thresholds
    pub safety: SafetyConfig,

    /// Alert delivery configuration
    pub alerts: AlertConfig,

    /// NPU backend configuration
    pub npu: NpuConfig,

    /// Inference queue configuration
    pub queue: QueueConfig,
}

impl Config {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest)
    /// 2. Configuration file
    /// 3. Defaults (lowest)
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();

        // Start with defaults
        builder = builder.add_source(config::Config::try_from(&Self::default())?);

        // Add configuration file if it exists
        if let Ok(config_path) = std::env::var("VAULT_CONFIG") {
            builder = builder.add_source(config::File::with_name(&config_path).required(false));
        } else {
            for path in &["./npuvault.yaml", "/etc/npuvault/config.yaml"] {
                builder = builder.add_source(config::File::with_name(path).required(false));
            }
        }

        // VAULT_SERVER__BIND_ADDR=0.0.0.0:8080 style overrides
        builder = builder.add_source(
            config::Environment::with_prefix("VAULT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let parsed: Self = builder.build()?.try_deserialize()?;
        parsed.validate()?;

        Ok(parsed)
    }

    /// Load configuration from a specific file, layered over the defaults
    pub fn load_from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(config::File::from(path));

        let parsed: Self = builder.build()?.try_deserialize()?;
        parsed.validate()?;

        Ok(parsed)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.actuator.validate()?;
        self.safety.validate()?;
        self.alerts.validate()?;
        self.npu.validate()?;
        self.queue.validate()?;
        Ok(())
    }
}

/// HTTP surface configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP gateway binds to
    pub bind_addr: SocketAddr,

    /// Allow cross-origin requests from the front end
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3177)),
            enable_cors: true,
        }
    }
}

/// Actuator side-channel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    /// Directory holding the published actuator values
    pub state_dir: PathBuf,

    /// File name of the published fan speed
    pub fan_file: String,

    /// File name of the published diode state
    pub diode_file: String,

    /// Polling period used by peripheral watchers (milliseconds)
    pub poll_interval_ms: u64,

    /// Remove stale published values when the controller starts
    pub reset_on_start: bool,
}

impl ActuatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.fan_file.is_empty() || self.diode_file.is_empty() {
            return Err(crate::Error::config("Actuator file names cannot be empty"));
        }
        if self.fan_file == self.diode_file {
            return Err(crate::Error::config(
                "Fan and diode actuators must publish to different files",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(crate::Error::config("Actuator poll interval must be greater than 0"));
        }
        Ok(())
    }

    pub fn fan_path(&self) -> PathBuf {
        self.state_dir.join(&self.fan_file)
    }

    pub fn diode_path(&self) -> PathBuf {
        self.state_dir.join(&self.diode_file)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            state_dir: std::env::temp_dir(),
            fan_file: "fan_speed.state".to_string(),
            diode_file: "diode_state.state".to_string(),
            poll_interval_ms: 1000,
            reset_on_start: true,
        }
    }
}

/// Safety control loop thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Temperature above which the fan is forced to full speed (°C)
    pub critical_temperature_c: f64,

    /// Host temperature treated as critical by the remediation policy (°C)
    pub host_critical_temperature_c: f64,

    /// Drive temperature treated as over-temperature (°C)
    pub drive_max_temperature_c: f64,

    /// Reallocated sector count treated as imminent drive failure
    pub reallocated_sector_limit: u64,

    /// Temperature reported before the first telemetry sample arrives (°C)
    pub initial_temperature_c: f64,
}

impl SafetyConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("critical_temperature_c", self.critical_temperature_c),
            ("host_critical_temperature_c", self.host_critical_temperature_c),
            ("drive_max_temperature_c", self.drive_max_temperature_c),
            ("initial_temperature_c", self.initial_temperature_c),
        ] {
            if !value.is_finite() {
                return Err(crate::Error::config(format!("{} must be a finite number", name)));
            }
        }
        if self.reallocated_sector_limit == 0 {
            return Err(crate::Error::config("reallocated_sector_limit must be greater than 0"));
        }
        Ok(())
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            critical_temperature_c: 80.0,
            host_critical_temperature_c: 85.0,
            drive_max_temperature_c: 65.0,
            reallocated_sector_limit: 100,
            initial_temperature_c: 55.0,
        }
    }
}

/// Alert delivery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Notification endpoint receiving `{level, message}` JSON; alerts are only logged when unset
    pub webhook_url: Option<String>,

    /// Delivery timeout (milliseconds)
    pub timeout_ms: u64,
}

impl AlertConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(crate::Error::config("Alert timeout must be greater than 0"));
        }
        if let Some(url) = &self.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(crate::Error::config(format!("Invalid alert webhook URL: {}", url)));
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_ms: 2000,
        }
    }
}

/// Which NPU backend to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NpuBackendKind {
    /// Probe the device tree at startup
    Auto,
    /// Capability-limited stand-in
    Mock,
    /// Rockchip NPU through RKNN
    Rknn,
}

impl std::fmt::Display for NpuBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NpuBackendKind::Auto => "auto",
            NpuBackendKind::Mock => "mock",
            NpuBackendKind::Rknn => "rknn",
        };
        f.write_str(s)
    }
}

/// NPU backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NpuConfig {
    /// Backend selection
    pub backend: NpuBackendKind,

    /// File probed for the SoC compatible string
    pub device_tree_path: PathBuf,

    /// Directory holding `*.rknn` model files for the hardware backend
    pub model_dir: PathBuf,

    /// Storage root used when the hardware backend is active
    pub storage_root_real: PathBuf,

    /// Storage root used when the stand-in backend is active
    pub storage_root_mock: PathBuf,

    /// Simulated inference latency (milliseconds)
    pub inference_delay_ms: u64,

    /// Number of concurrent inference slots on the accelerator
    pub slots: usize,
}

impl NpuConfig {
    pub fn validate(&self) -> Result<()> {
        if self.slots == 0 {
            return Err(crate::Error::config("NPU must expose at least one slot"));
        }
        Ok(())
    }

    pub fn inference_delay(&self) -> Duration {
        Duration::from_millis(self.inference_delay_ms)
    }
}

impl Default for NpuConfig {
    fn default() -> Self {
        Self {
            backend: NpuBackendKind::Auto,
            device_tree_path: PathBuf::from("/proc/device-tree/compatible"),
            model_dir: PathBuf::from("models"),
            storage_root_real: PathBuf::from("storage_real"),
            storage_root_mock: PathBuf::from("storage_mock"),
            inference_delay_ms: 0,
            slots: 1,
        }
    }
}

/// Inference queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of long-lived workers
    pub workers: usize,

    /// Retention of terminal results (seconds); unbounded when unset
    pub result_ttl_seconds: Option<u64>,

    /// How often expired results are swept (seconds)
    pub sweep_interval_seconds: u64,

    /// How long running inferences get to finish when the queue stops (milliseconds)
    pub shutdown_grace_ms: u64,
}

impl QueueConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(crate::Error::config("Queue must run at least one worker"));
        }
        if self.result_ttl_seconds == Some(0) {
            return Err(crate::Error::config("result_ttl_seconds must be greater than 0 when set"));
        }
        if self.sweep_interval_seconds == 0 {
            return Err(crate::Error::config("sweep_interval_seconds must be greater than 0"));
        }
        Ok(())
    }

    pub fn result_ttl(&self) -> Option<Duration> {
        self.result_ttl_seconds.map(Duration::from_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            result_ttl_seconds: None,
            sweep_interval_seconds: 60,
            shutdown_grace_ms: 5000,
        }
    }
}

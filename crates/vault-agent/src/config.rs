//! Configuration for the vaultd daemon

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use vault_core::Config as CoreConfig;

/// Complete daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AgentConfig {
    /// Controller, gateway and NPU configuration
    #[serde(flatten)]
    pub core: CoreConfig,

    /// Daemon identity and lifecycle
    pub agent: AgentSpecificConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Daemon identity and lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSpecificConfig {
    /// Agent name, used in logs
    pub name: String,

    /// How long in-flight requests get to drain on shutdown (seconds)
    pub shutdown_timeout_seconds: u64,
}

impl AgentSpecificConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

impl Default for AgentSpecificConfig {
    fn default() -> Self {
        Self {
            name: "npuvault".to_string(),
            shutdown_timeout_seconds: 10,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,

    pub show_target: bool,
    pub show_thread_ids: bool,
    pub show_line_numbers: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            show_target: true,
            show_thread_ids: false,
            show_line_numbers: false,
        }
    }
}

impl AgentConfig {
    /// Layered load: defaults, then `VAULT_CONFIG` or the well-known files, then `VAULT_*` variables
    pub fn load() -> crate::Result<Self> {
        Ok(Self {
            core: CoreConfig::load()?,
            ..Self::default()
        })
    }

    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::AgentError::Config(format!("Failed to read config file: {}", e)))?;

        let config: AgentConfig = serde_yaml::from_str(&content)
            .map_err(|e| crate::AgentError::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| crate::AgentError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| crate::AgentError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn validate(&self) -> crate::Result<()> {
        self.core
            .validate()
            .map_err(|e| crate::AgentError::Config(format!("Core config validation failed: {}", e)))?;

        if self.agent.name.is_empty() {
            return Err(crate::AgentError::Config("Agent name cannot be empty".to_string()));
        }

        if self.agent.shutdown_timeout_seconds == 0 {
            return Err(crate::AgentError::Config(
                "Shutdown timeout must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(crate::AgentError::Config(format!(
                    "Invalid log level: {}",
                    self.logging.level
                )))
            }
        }

        match self.logging.format.as_str() {
            "text" | "json" => {}
            _ => {
                return Err(crate::AgentError::Config(format!(
                    "Invalid log format: {}",
                    self.logging.format
                )))
            }
        }

        Ok(())
    }
}

//! # vault-agent
//!
//! The `vaultd` daemon. Loads configuration, initialises logging, wires the
//! safety controller, model registry and inference queue behind the HTTP
//! gateway, and shuts everything down on a termination signal.

pub mod agent;
pub mod config;

pub use agent::{Agent, AgentBuilder};
pub use config::{AgentConfig, AgentSpecificConfig, LoggingConfig};

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(#[from] vault_core::Error),

    #[error("NPU error: {0}")]
    Npu(#[from] vault_adapter_npu::NpuError),

    #[error("Task queue error: {0}")]
    Task(#[from] vault_tasks::TaskError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] vault_gateway::GatewayError),
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// Initialise logging and build the agent
pub async fn init_agent(config: &AgentConfig) -> Result<Agent> {
    init_logging(&config.logging)?;

    tracing::info!("Initializing npuvault agent '{}'", config.agent.name);
    tracing::debug!("Agent configuration: {:?}", config);

    AgentBuilder::new().with_config(config.clone()).build().await
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(logging_config: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging_config.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(logging_config.show_target)
        .with_thread_ids(logging_config.show_thread_ids)
        .with_line_number(logging_config.show_line_numbers);

    let installed = match logging_config.format.as_str() {
        "json" => subscriber.json().try_init(),
        _ => subscriber.try_init(),
    };

    installed.map_err(|e| AgentError::Config(format!("Failed to initialize logging: {}", e)))
}

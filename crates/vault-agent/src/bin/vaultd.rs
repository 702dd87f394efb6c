//! Main binary for the npuvault daemon (vaultd)

use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use vault_agent::{init_agent, init_logging, AgentConfig, AgentError, Result};
use vault_state::{Peripheral, PeripheralWatcher};

#[derive(Parser)]
#[command(name = "vaultd")]
#[command(about = "Supervisory daemon for the npuvault storage appliance")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "VAULT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level, overriding the configuration
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// HTTP bind address, overriding the configuration
    #[arg(long, value_name = "ADDR")]
    bind: Option<SocketAddr>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon
    Start {
        /// Override configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Generate default configuration
    Config {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate configuration
    Validate {
        /// Configuration file to validate
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Follow a published actuator value the way the peripheral controller does
    Watch {
        #[arg(value_enum)]
        peripheral: WatchTarget,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum WatchTarget {
    Fan,
    Diode,
}

impl From<WatchTarget> for Peripheral {
    fn from(target: WatchTarget) -> Self {
        match target {
            WatchTarget::Fan => Peripheral::Fan,
            WatchTarget::Diode => Peripheral::Diode,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Start { ref config }) => {
            let config_path = config.clone().or(cli.config.clone());
            start_agent(config_path, &cli).await
        }
        Some(Commands::Config { output }) => generate_config(output),
        Some(Commands::Validate { config }) => validate_config(config),
        Some(Commands::Watch { peripheral }) => {
            let config_path = cli.config.clone();
            watch(peripheral.into(), config_path, &cli).await
        }
        None => {
            let config_path = cli.config.clone();
            start_agent(config_path, &cli).await
        }
    }
}

fn load_config(config_path: Option<PathBuf>, cli: &Cli) -> Result<AgentConfig> {
    let mut config = match config_path {
        Some(path) => AgentConfig::from_file(path)?,
        None => AgentConfig::load()?,
    };

    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(bind) = cli.bind {
        config.core.server.bind_addr = bind;
    }

    config.validate()?;
    Ok(config)
}

async fn start_agent(config_path: Option<PathBuf>, cli: &Cli) -> Result<()> {
    let config = load_config(config_path.clone(), cli)?;
    let agent = init_agent(&config).await?;

    match config_path {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("Using layered default configuration"),
    }

    if let Err(e) = agent.run().await {
        error!("Agent failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn watch(peripheral: Peripheral, config_path: Option<PathBuf>, cli: &Cli) -> Result<()> {
    let config = load_config(config_path, cli)?;
    init_logging(&config.logging)?;

    let watcher = PeripheralWatcher::from_config(peripheral, &config.core.actuator);
    let running = Arc::new(AtomicBool::new(true));

    tokio::select! {
        _ = watcher.run(Arc::clone(&running)) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C signal, {} controller shutting down", peripheral);
        }
    }
    running.store(false, Ordering::Relaxed);

    Ok(())
}

fn generate_config(output: Option<PathBuf>) -> Result<()> {
    let config = AgentConfig::default();

    if let Some(output_path) = output {
        config.to_file(&output_path)?;
        println!("Generated configuration file: {}", output_path.display());
    } else {
        let yaml = serde_yaml::to_string(&config)
            .map_err(|e| AgentError::Config(format!("Failed to serialize config: {}", e)))?;
        println!("{}", yaml);
    }

    Ok(())
}

fn validate_config(config_path: PathBuf) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());

    let config = AgentConfig::from_file(&config_path)?;
    config.validate()?;

    println!("Configuration is valid");
    println!("Agent name: {}", config.agent.name);
    println!("HTTP bind address: {}", config.core.server.bind_addr);
    println!("NPU backend: {}", config.core.npu.backend);
    println!(
        "Critical temperature: {:.1}°C",
        config.core.safety.critical_temperature_c
    );
    match config.core.alerts.webhook_url {
        Some(url) => println!("Alerts: webhook {}", url),
        None => println!("Alerts: log only"),
    }

    Ok(())
}

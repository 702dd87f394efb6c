//! Daemon wiring and lifecycle

use crate::{config::AgentConfig, AgentError, Result};

use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Notify};
use tracing::{info, warn};
use vault_adapter_npu::ModelRegistry;
use vault_core::{ActuatorChannel, SystemState};
use vault_gateway::{AppState, GatewayServer};
use vault_safety::{create_alert_sink, AlertDispatcher, SafetyController};
use vault_state::{FileActuatorChannel, StateStore};
use vault_tasks::{InMemoryResultStore, InferenceQueue};

/// The running daemon: controller, registry and queue behind the gateway
pub struct Agent {
    config: AgentConfig,
    controller: Arc<SafetyController>,
    registry: Arc<ModelRegistry>,
    queue: InferenceQueue,
    server: GatewayServer,
    shutdown: Arc<Notify>,
}

impl Agent {
    /// Start background workers
    pub async fn start(&self) -> Result<()> {
        info!("Starting npuvault agent: {}", self.config.agent.name);
        self.queue.start().await?;
        info!(
            "Agent started with {} NPU backend",
            self.registry.kind()
        );
        Ok(())
    }

    /// Stop background workers, failing any task that cannot finish in time
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping npuvault agent");
        self.queue.stop().await;
        info!("npuvault agent stopped");
        Ok(())
    }

    /// Serve until a termination signal or [`Agent::shutdown_handle`] fires
    pub async fn run(&self) -> Result<()> {
        self.start().await?;

        let notify = Arc::clone(&self.shutdown);
        let (draining_tx, draining_rx) = oneshot::channel::<()>();
        let shutdown = async move {
            tokio::select! {
                _ = notify.notified() => info!("Received shutdown request"),
                _ = signal::ctrl_c() => info!("Received Ctrl+C signal"),
                _ = wait_for_termination() => info!("Received termination signal"),
            }
            let _ = draining_tx.send(());
        };

        let timeout = self.config.agent.shutdown_timeout();
        let serve = self.server.serve(shutdown);
        tokio::pin!(serve);

        let served = tokio::select! {
            result = &mut serve => result.map_err(AgentError::from),
            _ = async {
                let _ = draining_rx.await;
                tokio::time::sleep(timeout).await;
            } => {
                warn!("Connections still open after {:?}, shutting down anyway", timeout);
                Ok(())
            }
        };

        self.stop().await?;
        served
    }

    /// Handle that makes [`Agent::run`] return
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn controller(&self) -> &Arc<SafetyController> {
        &self.controller
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn queue(&self) -> &InferenceQueue {
        &self.queue
    }
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    std::future::pending::<()>().await;
}

/// Builder for creating agents
pub struct AgentBuilder {
    config: Option<AgentConfig>,
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self { config: None }
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Wire every component. Hardware detection and storage preparation happen here.
    pub async fn build(self) -> Result<Agent> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let core = &config.core;

        let channel = FileActuatorChannel::from_config(&core.actuator);
        if core.actuator.reset_on_start {
            if let Err(e) = channel.reset().await {
                warn!("Failed to clear stale actuator state: {}", e);
            }
        }

        let sink = create_alert_sink(&core.alerts)?;
        let alerts = AlertDispatcher::new(sink, core.alerts.timeout());
        let store = StateStore::new(SystemState::with_temperature(core.safety.initial_temperature_c));
        let controller = Arc::new(SafetyController::new(
            &core.safety,
            store,
            Arc::new(channel),
            alerts,
        ));

        let registry = Arc::new(ModelRegistry::from_config(&core.npu).await?);
        let queue = InferenceQueue::new(
            core.queue.clone(),
            Arc::clone(&registry),
            Arc::new(InMemoryResultStore::new()),
        );

        let state = AppState::new(Arc::clone(&controller), Arc::clone(&registry), queue.clone());
        let server = GatewayServer::new(core.server.clone(), state);

        Ok(Agent {
            config,
            controller,
            registry,
            queue,
            server,
            shutdown: Arc::new(Notify::new()),
        })
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tempfile::TempDir;
    use vault_core::{NpuBackendKind, SwitchState};

    fn test_config(dir: &TempDir) -> AgentConfig {
        let mut config = AgentConfig::default();
        config.core.server.bind_addr = SocketAddr::from(([127, 0, 0, 1], 0));
        config.core.actuator.state_dir = dir.path().join("state");
        config.core.npu.backend = NpuBackendKind::Mock;
        config.core.npu.storage_root_mock = dir.path().join("storage_mock");
        config.core.safety.initial_temperature_c = 48.0;
        config
    }

    #[tokio::test]
    async fn test_build_wires_components() {
        let dir = TempDir::new().unwrap();
        let agent = AgentBuilder::new()
            .with_config(test_config(&dir))
            .build()
            .await
            .unwrap();

        assert_eq!(agent.config().agent.name, "npuvault");
        assert_eq!(agent.registry().kind(), NpuBackendKind::Mock);
        assert!(dir.path().join("storage_mock").join("uploads").is_dir());

        let state = agent.controller().snapshot().await;
        assert_eq!(state.temperature_c, 48.0);
        assert_eq!(state.power_state, SwitchState::On);
    }

    #[tokio::test]
    async fn test_stale_actuator_state_is_cleared() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        std::fs::create_dir_all(&config.core.actuator.state_dir).unwrap();
        std::fs::write(config.core.actuator.fan_path(), "100").unwrap();
        std::fs::write(config.core.actuator.diode_path(), "on").unwrap();

        AgentBuilder::new().with_config(config.clone()).build().await.unwrap();

        assert!(!config.core.actuator.fan_path().exists());
        assert!(!config.core.actuator.diode_path().exists());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.core.npu.slots = 0;

        assert!(matches!(
            AgentBuilder::new().with_config(config).build().await,
            Err(AgentError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let dir = TempDir::new().unwrap();
        let agent = AgentBuilder::new()
            .with_config(test_config(&dir))
            .build()
            .await
            .unwrap();

        let shutdown = agent.shutdown_handle();
        let queue = agent.queue().clone();
        let running = tokio::spawn(async move { agent.run().await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(queue.is_running());

        shutdown.notify_one();
        let result = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert!(!queue.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_settles_running_inference() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.core.npu.inference_delay_ms = 300;
        let agent = AgentBuilder::new().with_config(config).build().await.unwrap();

        let shutdown = agent.shutdown_handle();
        let queue = agent.queue().clone();
        let running = tokio::spawn(async move { agent.run().await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        let id = queue.submit("yolov5s", serde_json::json!({"image": "a.jpg"})).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        shutdown.notify_one();
        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert!(queue.poll(&id).await.unwrap().state.is_terminal());
    }
}

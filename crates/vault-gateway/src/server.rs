//! HTTP server and router

use crate::handlers;
use crate::{GatewayError, Result};

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use vault_adapter_npu::ModelRegistry;
use vault_core::ServerConfig;
use vault_safety::SafetyController;
use vault_tasks::InferenceQueue;

/// Request counters
#[derive(Debug)]
pub struct GatewayStats {
    started_at: Instant,
    requests: AtomicU64,
}

impl GatewayStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            requests: AtomicU64::new(0),
        }
    }

    pub fn increment_requests(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

impl Default for GatewayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<SafetyController>,
    pub registry: Arc<ModelRegistry>,
    pub queue: InferenceQueue,
    pub stats: Arc<GatewayStats>,
}

impl AppState {
    pub fn new(
        controller: Arc<SafetyController>,
        registry: Arc<ModelRegistry>,
        queue: InferenceQueue,
    ) -> Self {
        Self {
            controller,
            registry,
            queue,
            stats: Arc::new(GatewayStats::new()),
        }
    }
}

/// HTTP server for the control and inference API
#[derive(Clone)]
pub struct GatewayServer {
    config: ServerConfig,
    state: AppState,
}

impl GatewayServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Build the router with all routes and middleware
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/health", get(handlers::health_check))
            .merge(api_routes())
            .nest("/api", api_routes())
            .with_state(self.state.clone())
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(middleware::from_fn_with_state(self.state.clone(), count_requests)),
            );

        if self.config.enable_cors {
            router = router.layer(CorsLayer::permissive());
        }

        router
    }

    /// Serve until `shutdown` resolves
    pub async fn serve<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = self.config.bind_addr;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Server(format!("Failed to bind to {}: {}", addr, e)))?;

        info!("HTTP gateway listening on {}", addr);

        if let Err(e) = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!("HTTP server error: {}", e);
            return Err(GatewayError::Server(format!("HTTP server failed: {}", e)));
        }

        info!("HTTP gateway stopped");
        Ok(())
    }
}

async fn count_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    state.stats.increment_requests();
    next.run(request).await
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/system/temperature", post(handlers::report_temperature))
        .route("/system/fan", get(handlers::get_fan).post(handlers::set_fan))
        .route("/system/diode", get(handlers::get_diode).post(handlers::set_diode))
        .route("/system/health", get(handlers::system_health))
        .route("/system/assess", post(handlers::assess))
        .route("/power/array", get(handlers::get_power).post(handlers::set_power))
        .route("/npu/status", get(handlers::npu_status))
        .route("/npu/models", get(handlers::list_models))
        .route("/npu/models/:name", get(handlers::get_model))
        .route("/npu/load", post(handlers::load_model))
        .route("/npu/unload", post(handlers::unload_model))
        .route("/npu/inference", post(handlers::submit_inference))
        .route("/npu/result/:task_id", get(handlers::get_result))
}

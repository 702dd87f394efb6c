//! Model registry over the active backend

use crate::backend::{LoadOutcome, ModelInfo, NpuBackend, NpuStatus, UnloadOutcome};
use crate::detection::{detect_backend, prepare_storage_root};
use crate::mock::StandInBackend;
use crate::rknn::RknnBackend;
use crate::{NpuError, Result};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};
use vault_core::{NpuBackendKind, NpuConfig};

/// Registry statistics
#[derive(Debug, Default)]
pub struct RegistryStats {
    /// Loads that actually brought a model into the accelerator
    pub loads_performed: AtomicU64,
    pub load_requests: AtomicU64,
    pub unloads_performed: AtomicU64,
    pub inferences: AtomicU64,
    pub inference_failures: AtomicU64,
}

/// Tracks models on the single backend chosen at startup.
///
/// Load and unload are serialised process-wide, so the model slot is never
/// touched by two lifecycle operations at once. Inference is bounded by a
/// semaphore sized to the backend's slot count.
pub struct ModelRegistry {
    backend: Arc<dyn NpuBackend>,
    lifecycle: Mutex<()>,
    inference_slots: Semaphore,
    storage_root: Option<PathBuf>,
    stats: RegistryStats,
}

impl ModelRegistry {
    /// Create a registry over an already-built backend
    pub fn new(backend: Arc<dyn NpuBackend>) -> Self {
        let slots = backend.slots().max(1);
        Self {
            backend,
            lifecycle: Mutex::new(()),
            inference_slots: Semaphore::new(slots),
            storage_root: None,
            stats: RegistryStats::default(),
        }
    }

    /// Detect hardware, build the matching backend and prepare its storage root
    pub async fn from_config(config: &NpuConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| NpuError::Configuration(e.to_string()))?;

        let kind = detect_backend(config).await;
        let backend = create_backend(kind, config).await?;
        let storage_root = prepare_storage_root(config, kind).await?;

        Ok(Self::new(backend).with_storage_root(storage_root))
    }

    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = Some(root.into());
        self
    }

    pub fn kind(&self) -> NpuBackendKind {
        self.backend.kind()
    }

    pub fn storage_root(&self) -> Option<&Path> {
        self.storage_root.as_deref()
    }

    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }

    /// Backend status with the active storage root attached
    pub async fn status(&self) -> NpuStatus {
        let mut status = self.backend.status().await;
        status.storage_root = self.storage_root.clone();
        status
    }

    pub async fn list_models(&self) -> Vec<String> {
        self.backend.list_models().await
    }

    pub async fn model_info(&self, name: &str) -> Result<ModelInfo> {
        self.backend.model_info(name).await
    }

    pub async fn is_loaded(&self, name: &str) -> bool {
        self.backend.is_loaded(name).await
    }

    /// Load `name`, waiting for any other lifecycle operation to finish first
    pub async fn load(&self, name: &str) -> Result<LoadOutcome> {
        self.stats.load_requests.fetch_add(1, Ordering::Relaxed);
        let _guard = self.lifecycle.lock().await;

        let outcome = self.backend.load(name).await.map_err(|e| {
            warn!("Failed to load model '{}': {}", name, e);
            e
        })?;
        if outcome == LoadOutcome::Loaded {
            self.stats.loads_performed.fetch_add(1, Ordering::Relaxed);
            info!("Model '{}' loaded on {} backend", name, self.kind());
        }
        Ok(outcome)
    }

    /// Unload `name`; succeeds when nothing is resident
    pub async fn unload(&self, name: &str) -> Result<UnloadOutcome> {
        let _guard = self.lifecycle.lock().await;

        let outcome = self.backend.unload(name).await?;
        if outcome == UnloadOutcome::Unloaded {
            self.stats.unloads_performed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(outcome)
    }

    /// Make sure `name` is resident. Concurrent callers for the same model
    /// observe a single load.
    pub async fn ensure_loaded(&self, name: &str) -> Result<LoadOutcome> {
        if self.backend.is_loaded(name).await {
            return Ok(LoadOutcome::AlreadyLoaded);
        }
        self.load(name).await
    }

    /// Run inference, waiting for a free accelerator slot
    pub async fn infer(&self, name: &str, input: &serde_json::Value) -> Result<serde_json::Value> {
        let _permit = self
            .inference_slots
            .acquire()
            .await
            .map_err(|e| NpuError::Configuration(format!("Inference slots closed: {}", e)))?;

        debug!("Running inference on '{}'", name);
        self.stats.inferences.fetch_add(1, Ordering::Relaxed);
        self.backend.infer(name, input).await.map_err(|e| {
            self.stats.inference_failures.fetch_add(1, Ordering::Relaxed);
            e
        })
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("kind", &self.backend.kind())
            .field("storage_root", &self.storage_root)
            .field("stats", &self.stats)
            .finish()
    }
}

/// Create the backend for a resolved kind
pub async fn create_backend(kind: NpuBackendKind, config: &NpuConfig) -> Result<Arc<dyn NpuBackend>> {
    match kind {
        NpuBackendKind::Rknn => Ok(Arc::new(RknnBackend::from_config(config).await?)),
        NpuBackendKind::Mock => Ok(Arc::new(StandInBackend::from_config(config))),
        NpuBackendKind::Auto => Err(NpuError::Detection(
            "backend must be resolved before it is created".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_concurrent_ensure_loaded_loads_once() {
        let registry = Arc::new(ModelRegistry::new(Arc::new(StandInBackend::default())));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.ensure_loaded("resnet18").await.unwrap()
            }));
        }
        let mut loaded = 0;
        for handle in handles {
            if handle.await.unwrap() == LoadOutcome::Loaded {
                loaded += 1;
            }
        }

        assert_eq!(loaded, 1);
        assert_eq!(registry.stats().loads_performed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_unknown_model_leaves_registry_untouched() {
        let registry = ModelRegistry::new(Arc::new(StandInBackend::default()));
        assert!(matches!(
            registry.ensure_loaded("ghost").await,
            Err(NpuError::UnknownModel(_))
        ));
        assert!(registry.status().await.loaded_models.is_empty());
        assert_eq!(registry.stats().loads_performed.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_inference_is_serialised_on_single_slot() {
        let backend = StandInBackend::default().with_inference_delay(Duration::from_millis(50));
        let registry = Arc::new(ModelRegistry::new(Arc::new(backend)));
        registry.load("yolov5s").await.unwrap();

        let started = std::time::Instant::now();
        let a = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.infer("yolov5s", &json!({})).await })
        };
        let b = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.infer("yolov5s", &json!({})).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(registry.stats().inferences.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_status_carries_storage_root() {
        let registry = ModelRegistry::new(Arc::new(StandInBackend::default()))
            .with_storage_root("/srv/storage_mock");
        assert_eq!(
            registry.status().await.storage_root,
            Some(PathBuf::from("/srv/storage_mock"))
        );
    }

    #[tokio::test]
    async fn test_from_config_with_forced_mock() {
        let dir = TempDir::new().unwrap();
        let config = NpuConfig {
            backend: NpuBackendKind::Mock,
            storage_root_mock: dir.path().join("storage_mock"),
            ..Default::default()
        };

        let registry = ModelRegistry::from_config(&config).await.unwrap();
        assert_eq!(registry.kind(), NpuBackendKind::Mock);
        assert!(dir.path().join("storage_mock").join("uploads").is_dir());
    }

    #[tokio::test]
    async fn test_from_config_with_forced_rknn() {
        let dir = TempDir::new().unwrap();
        let models = dir.path().join("models");
        std::fs::create_dir_all(&models).unwrap();
        std::fs::write(models.join("gemma-2b-int4.rknn"), b"rknn").unwrap();

        let config = NpuConfig {
            backend: NpuBackendKind::Rknn,
            model_dir: models,
            storage_root_real: dir.path().join("storage_real"),
            ..Default::default()
        };

        let registry = ModelRegistry::from_config(&config).await.unwrap();
        assert_eq!(registry.kind(), NpuBackendKind::Rknn);
        assert_eq!(registry.list_models().await, vec!["gemma-2b-int4"]);
    }

    #[tokio::test]
    async fn test_unload_is_idempotent() {
        let registry = ModelRegistry::new(Arc::new(StandInBackend::default()));
        assert_eq!(registry.unload("yolov5s").await.unwrap(), UnloadOutcome::NotLoaded);
        registry.load("yolov5s").await.unwrap();
        assert_eq!(registry.unload("yolov5s").await.unwrap(), UnloadOutcome::Unloaded);
        assert!(!registry.is_loaded("yolov5s").await);
        assert_eq!(registry.unload("ghost").await.unwrap(), UnloadOutcome::NotLoaded);
        assert_eq!(registry.stats().unloads_performed.load(Ordering::Relaxed), 1);
    }
}

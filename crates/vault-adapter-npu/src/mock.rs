//! Stand-in backend for machines without an NPU

use crate::backend::{Availability, LoadOutcome, LoadState, ModelInfo, NpuBackend, NpuStatus, UnloadOutcome};
use crate::{NpuError, Result};

use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};
use vault_core::{NpuBackendKind, NpuConfig};

const NOT_ROCKCHIP: &str = "Running on a non-Rockchip device. NPU is mocked.";

/// Reports unavailable hardware and answers every call without computing anything.
///
/// Several models may be resident at once.
pub struct StandInBackend {
    models: Vec<(String, PathBuf)>,
    loaded: RwLock<BTreeSet<String>>,
    inference_delay: Duration,
    slots: usize,
}

impl StandInBackend {
    /// Create a stand-in with the given model catalogue
    pub fn new(models: Vec<(String, PathBuf)>) -> Self {
        info!("Creating stand-in NPU backend with {} models", models.len());
        Self {
            models,
            loaded: RwLock::new(BTreeSet::new()),
            inference_delay: Duration::ZERO,
            slots: 1,
        }
    }

    pub fn from_config(config: &NpuConfig) -> Self {
        Self::default()
            .with_inference_delay(config.inference_delay())
            .with_slots(config.slots)
    }

    /// Simulate slow inference
    pub fn with_inference_delay(mut self, delay: Duration) -> Self {
        self.inference_delay = delay;
        self
    }

    pub fn with_slots(mut self, slots: usize) -> Self {
        self.slots = slots.max(1);
        self
    }

    fn storage_path(&self, name: &str) -> Result<&PathBuf> {
        self.models
            .iter()
            .find(|(model, _)| model == name)
            .map(|(_, path)| path)
            .ok_or_else(|| NpuError::UnknownModel(name.to_string()))
    }
}

impl Default for StandInBackend {
    fn default() -> Self {
        Self::new(vec![
            ("yolov5s".to_string(), PathBuf::from("models/yolov5s.rknn")),
            ("resnet18".to_string(), PathBuf::from("models/resnet18.rknn")),
        ])
    }
}

#[async_trait]
impl NpuBackend for StandInBackend {
    fn kind(&self) -> NpuBackendKind {
        NpuBackendKind::Mock
    }

    fn slots(&self) -> usize {
        self.slots
    }

    async fn status(&self) -> NpuStatus {
        NpuStatus {
            mode: NpuBackendKind::Mock,
            npu_status: Availability::Unavailable,
            drivers_found: false,
            loaded_models: self.loaded.read().await.iter().cloned().collect(),
            memory_usage_mb: None,
            performance_tops: None,
            storage_root: None,
            error: Some(NOT_ROCKCHIP.to_string()),
        }
    }

    async fn list_models(&self) -> Vec<String> {
        self.models.iter().map(|(name, _)| name.clone()).collect()
    }

    async fn model_info(&self, name: &str) -> Result<ModelInfo> {
        let storage_path = self.storage_path(name)?.clone();
        let load_state = if self.loaded.read().await.contains(name) {
            LoadState::Loaded
        } else {
            LoadState::Unloaded
        };

        Ok(ModelInfo {
            name: name.to_string(),
            storage_path,
            load_state,
        })
    }

    async fn load(&self, name: &str) -> Result<LoadOutcome> {
        self.storage_path(name)?;
        if self.loaded.write().await.insert(name.to_string()) {
            info!("Mock NPU: model '{}' loaded", name);
            Ok(LoadOutcome::Loaded)
        } else {
            debug!("Mock NPU: model '{}' already loaded", name);
            Ok(LoadOutcome::AlreadyLoaded)
        }
    }

    async fn unload(&self, name: &str) -> Result<UnloadOutcome> {
        if self.loaded.write().await.remove(name) {
            info!("Mock NPU: model '{}' unloaded", name);
            Ok(UnloadOutcome::Unloaded)
        } else {
            Ok(UnloadOutcome::NotLoaded)
        }
    }

    async fn infer(&self, name: &str, input: &serde_json::Value) -> Result<serde_json::Value> {
        self.storage_path(name)?;
        if !self.loaded.read().await.contains(name) {
            return Err(NpuError::ModelNotLoaded(name.to_string()));
        }

        debug!("Mock NPU: running '{}' on {}", name, input);
        if !self.inference_delay.is_zero() {
            tokio::time::sleep(self.inference_delay).await;
        }

        Ok(json!({
            "results": [
                {"label": "cat", "confidence": 0.92, "box": [100, 150, 300, 400]}
            ]
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_status_reports_unavailable_hardware() {
        let backend = StandInBackend::default();
        let status = backend.status().await;

        assert_eq!(status.npu_status, Availability::Unavailable);
        assert!(!status.drivers_found);
        assert!(status.loaded_models.is_empty());
        assert_eq!(status.error.as_deref(), Some(NOT_ROCKCHIP));
    }

    #[tokio::test]
    async fn test_list_models_is_ordered() {
        let backend = StandInBackend::default();
        assert_eq!(backend.list_models().await, vec!["yolov5s", "resnet18"]);
    }

    #[tokio::test]
    async fn test_load_is_idempotent_and_multi_resident() {
        let backend = StandInBackend::default();

        assert_eq!(backend.load("yolov5s").await.unwrap(), LoadOutcome::Loaded);
        assert_eq!(backend.load("yolov5s").await.unwrap(), LoadOutcome::AlreadyLoaded);
        assert_eq!(backend.load("resnet18").await.unwrap(), LoadOutcome::Loaded);

        assert_eq!(backend.status().await.loaded_models, vec!["resnet18", "yolov5s"]);
    }

    #[tokio::test]
    async fn test_unknown_model_is_rejected() {
        let backend = StandInBackend::default();
        assert!(matches!(
            backend.load("ghost").await,
            Err(NpuError::UnknownModel(_))
        ));
        assert!(backend.list_models().await.iter().all(|m| m != "ghost"));
    }

    #[tokio::test]
    async fn test_unload_without_load_is_noop() {
        let backend = StandInBackend::default();
        assert_eq!(backend.unload("resnet18").await.unwrap(), UnloadOutcome::NotLoaded);
        assert!(!backend.is_loaded("resnet18").await);
        assert_eq!(backend.unload("ghost").await.unwrap(), UnloadOutcome::NotLoaded);
    }

    #[tokio::test]
    async fn test_infer_requires_resident_model() {
        let backend = StandInBackend::default();
        let input = json!({"image": "frame.jpg"});

        assert!(matches!(
            backend.infer("yolov5s", &input).await,
            Err(NpuError::ModelNotLoaded(_))
        ));

        backend.load("yolov5s").await.unwrap();
        let output = backend.infer("yolov5s", &input).await.unwrap();
        assert_eq!(output["results"][0]["label"], "cat");
    }
}

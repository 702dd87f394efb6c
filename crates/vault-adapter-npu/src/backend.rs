//! Accelerator backend interface

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use vault_core::NpuBackendKind;

/// Whether the accelerator can take work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    /// No usable accelerator; the stand-in answers instead
    Unavailable,
    /// Hardware present, no model resident
    Available,
    /// Hardware present with a model resident
    Active,
}

/// Load state of one model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    Unloaded,
    Loaded,
}

/// Registry entry for one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub storage_path: PathBuf,
    pub load_state: LoadState,
}

/// Backend status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpuStatus {
    /// Which backend answered
    pub mode: NpuBackendKind,

    pub npu_status: Availability,

    /// Whether real accelerator drivers were found
    pub drivers_found: bool,

    /// Resident models; at most one on single-slot hardware
    pub loaded_models: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_usage_mb: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance_tops: Option<f64>,

    /// Active storage root, filled in by the registry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_root: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a successful load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOutcome {
    /// The model was brought into the slot by this call
    Loaded,
    /// The model was already resident; nothing happened
    AlreadyLoaded,
}

/// Result of a successful unload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnloadOutcome {
    Unloaded,
    NotLoaded,
}

/// Capability set shared by every accelerator backend
#[async_trait]
pub trait NpuBackend: Send + Sync {
    /// Backend variant
    fn kind(&self) -> NpuBackendKind;

    /// Number of inferences the accelerator can run at once
    fn slots(&self) -> usize;

    /// Current status; never fails
    async fn status(&self) -> NpuStatus;

    /// Known model names, in a stable order
    async fn list_models(&self) -> Vec<String>;

    /// Registry entry for `name`
    async fn model_info(&self, name: &str) -> Result<ModelInfo>;

    /// Bring `name` into the accelerator. Loading a resident model is a no-op.
    async fn load(&self, name: &str) -> Result<LoadOutcome>;

    /// Release `name`. Unloading a model that is not resident is a no-op.
    async fn unload(&self, name: &str) -> Result<UnloadOutcome>;

    /// Run `name` over `input`; fails if the model is not resident
    async fn infer(&self, name: &str, input: &serde_json::Value) -> Result<serde_json::Value>;

    /// Whether `name` is currently resident
    async fn is_loaded(&self, name: &str) -> bool {
        matches!(
            self.model_info(name).await,
            Ok(ModelInfo {
                load_state: LoadState::Loaded,
                ..
            })
        )
    }
}

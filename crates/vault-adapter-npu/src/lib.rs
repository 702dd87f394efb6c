//! # vault-adapter-npu
//!
//! Accelerator backends and the model registry for npuvault.
//!
//! This crate provides:
//! - The `NpuBackend` capability set (status, list, load, unload, infer)
//! - A capability-limited stand-in backend for machines without an NPU
//! - A Rockchip backend with a single shared model slot
//! - Hardware detection and storage-root selection
//! - `ModelRegistry`, which serialises load/unload and bounds concurrent inference
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use vault_adapter_npu::{ModelRegistry, StandInBackend};
//!
//! # #[tokio::main]
//! # async fn main() -> vault_adapter_npu::Result<()> {
//! let registry = ModelRegistry::new(Arc::new(StandInBackend::default()));
//!
//! registry.ensure_loaded("yolov5s").await?;
//! let output = registry.infer("yolov5s", &serde_json::json!({"image": "cat.jpg"})).await?;
//! assert!(output.get("results").is_some());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use thiserror::Error;

pub mod backend;
pub mod detection;
pub mod mock;
pub mod registry;
pub mod rknn;

// Re-export main types
pub use backend::{Availability, LoadOutcome, LoadState, ModelInfo, NpuBackend, NpuStatus, UnloadOutcome};
pub use detection::{detect_backend, is_rockchip, prepare_storage_root};
pub use mock::StandInBackend;
pub use registry::{create_backend, ModelRegistry, RegistryStats};
pub use rknn::RknnBackend;

/// Result type for NPU operations
pub type Result<T> = std::result::Result<T, NpuError>;

/// Errors that can occur during NPU operations
#[derive(Error, Debug)]
pub enum NpuError {
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Model '{0}' is not loaded")]
    ModelNotLoaded(String),

    #[error("Model slot is occupied by '{resident}'; unload it before loading '{requested}'")]
    SlotOccupied { resident: String, requested: String },

    #[error("Model file not found at {}. Run conversion scripts first.", .0.display())]
    ModelFileMissing(PathBuf),

    #[error("Hardware detection failed: {0}")]
    Detection(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NpuError {
    /// Check if the error was caused by the request rather than the accelerator
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            NpuError::UnknownModel(_) | NpuError::ModelNotLoaded(_) | NpuError::SlotOccupied { .. }
        )
    }

    /// Check if the error reflects the current load state of the slot
    pub fn is_resource_state(&self) -> bool {
        matches!(self, NpuError::ModelNotLoaded(_) | NpuError::SlotOccupied { .. })
    }
}

impl From<NpuError> for vault_core::Error {
    fn from(err: NpuError) -> Self {
        match err {
            NpuError::UnknownModel(_) | NpuError::ModelFileMissing(_) => {
                vault_core::Error::not_found(err.to_string())
            }
            NpuError::ModelNotLoaded(_) => vault_core::Error::model_not_loaded(err.to_string()),
            NpuError::SlotOccupied { .. } => vault_core::Error::conflict(err.to_string()),
            NpuError::Configuration(_) => vault_core::Error::config(err.to_string()),
            NpuError::Io(e) => vault_core::Error::transient_io(e.to_string()),
            NpuError::Detection(_) => {
                vault_core::Error::internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_npu_error_properties() {
        let err = NpuError::SlotOccupied {
            resident: "a".to_string(),
            requested: "b".to_string(),
        };
        assert!(err.is_client_error());
        assert!(err.is_resource_state());
        assert!(err.to_string().contains("'a'"));

        let err = NpuError::UnknownModel("ghost".to_string());
        assert!(err.is_client_error());
        assert!(!err.is_resource_state());
    }

    #[test]
    fn test_conversion_to_core_error() {
        let err: vault_core::Error = NpuError::UnknownModel("ghost".to_string()).into();
        assert_eq!(err.to_http_status(), 404);

        let err: vault_core::Error = NpuError::SlotOccupied {
            resident: "a".to_string(),
            requested: "b".to_string(),
        }
        .into();
        assert_eq!(err.to_http_status(), 409);

        let err: vault_core::Error = NpuError::ModelNotLoaded("a".to_string()).into();
        assert_eq!(err.category(), "resource_state");
    }
}

//! Hardware detection and storage-root selection

use crate::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use vault_core::{NpuBackendKind, NpuConfig};

/// Whether the device-tree compatible string names a Rockchip SoC
pub async fn is_rockchip(device_tree_path: &Path) -> bool {
    match tokio::fs::read(device_tree_path).await {
        // The compatible property is a list of NUL-separated strings
        Ok(raw) => String::from_utf8_lossy(&raw).contains("rockchip"),
        Err(e) => {
            debug!("Cannot read {}: {}", device_tree_path.display(), e);
            false
        }
    }
}

/// Resolve the configured backend to a concrete variant
pub async fn detect_backend(config: &NpuConfig) -> NpuBackendKind {
    match config.backend {
        NpuBackendKind::Auto => {
            if is_rockchip(&config.device_tree_path).await {
                info!("Real Orange Pi hardware detected. Loading RKNN NPU implementation.");
                NpuBackendKind::Rknn
            } else {
                info!("No Orange Pi hardware detected. Loading mock NPU implementation.");
                NpuBackendKind::Mock
            }
        }
        explicit => {
            info!("NPU backend forced to {}", explicit);
            explicit
        }
    }
}

/// Create the storage root matching `kind` (with its `uploads` directory) and return its absolute path
pub async fn prepare_storage_root(config: &NpuConfig, kind: NpuBackendKind) -> Result<PathBuf> {
    let root = match kind {
        NpuBackendKind::Rknn => &config.storage_root_real,
        _ => &config.storage_root_mock,
    };
    let root = if root.is_absolute() {
        root.clone()
    } else {
        std::env::current_dir()?.join(root)
    };

    let uploads = root.join("uploads");
    if !tokio::fs::try_exists(&uploads).await.unwrap_or(false) {
        info!("Creating storage directory at {}", root.display());
        tokio::fs::create_dir_all(&uploads).await?;
    }
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_rockchip_compatible_string() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("compatible");
        std::fs::write(&path, b"xunlong,orangepi-5\0rockchip,rk3588s\0").unwrap();
        assert!(is_rockchip(&path).await);

        std::fs::write(&path, b"raspberrypi,4-model-b\0brcm,bcm2711\0").unwrap();
        assert!(!is_rockchip(&path).await);

        assert!(!is_rockchip(&dir.path().join("missing")).await);
    }

    #[tokio::test]
    async fn test_auto_detection_falls_back_to_mock() {
        let dir = TempDir::new().unwrap();
        let config = NpuConfig {
            device_tree_path: dir.path().join("missing"),
            ..Default::default()
        };
        assert_eq!(detect_backend(&config).await, NpuBackendKind::Mock);
    }

    #[tokio::test]
    async fn test_explicit_backend_skips_probe() {
        let config = NpuConfig {
            backend: NpuBackendKind::Rknn,
            device_tree_path: PathBuf::from("/nonexistent"),
            ..Default::default()
        };
        assert_eq!(detect_backend(&config).await, NpuBackendKind::Rknn);
    }

    #[tokio::test]
    async fn test_storage_root_follows_backend() {
        let dir = TempDir::new().unwrap();
        let config = NpuConfig {
            storage_root_real: dir.path().join("storage_real"),
            storage_root_mock: dir.path().join("storage_mock"),
            ..Default::default()
        };

        let root = prepare_storage_root(&config, NpuBackendKind::Mock).await.unwrap();
        assert_eq!(root, dir.path().join("storage_mock"));
        assert!(root.join("uploads").is_dir());
        assert!(!dir.path().join("storage_real").exists());

        // Second call finds the directory already there
        prepare_storage_root(&config, NpuBackendKind::Mock).await.unwrap();
    }
}

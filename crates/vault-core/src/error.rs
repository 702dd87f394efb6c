//! Error handling for npuvault
//!
//! Provides a unified error type and result type for use across all npuvault components.
//! The variants follow the controller's error taxonomy: validation failures are rejected
//! at the boundary, lookups fail with `NotFound`, inference against a non-resident model
//! fails with `ModelNotLoaded`, and side-channel problems surface as `TransientIo`.

/// Result type alias for npuvault operations
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for npuvault
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or out-of-range input at the boundary
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    InvalidConfiguration(String),

    /// Resource not found (unknown model, unknown task)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Inference requested against a model that is not resident
    #[error("Model not loaded: {0}")]
    ModelNotLoaded(String),

    /// Operation conflicts with current resource state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Actuator channel, peripheral or alert delivery failure
    #[error("Transient I/O error: {0}")]
    TransientIo(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration parsing errors
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a model not loaded error
    pub fn model_not_loaded(msg: impl Into<String>) -> Self {
        Self::ModelNotLoaded(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a transient I/O error
    pub fn transient_io(msg: impl Into<String>) -> Self {
        Self::TransientIo(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error is transient (safe to log and continue)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::TransientIo(_) | Error::Timeout(_) | Error::Io(_)
        )
    }

    /// Check if this error indicates a client-side problem
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::InvalidConfiguration(_)
                | Error::NotFound(_)
                | Error::Conflict(_)
        )
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::InvalidConfiguration(_) => "configuration",
            Error::NotFound(_) => "not_found",
            Error::ModelNotLoaded(_) => "resource_state",
            Error::Conflict(_) => "conflict",
            Error::TransientIo(_) => "transient_io",
            Error::Timeout(_) => "timeout",
            Error::Internal(_) => "internal",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Yaml(_) => "yaml",
            Error::Config(_) => "config",
            Error::Other(_) => "other",
        }
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> u16 {
        match self {
            Error::Validation(_) | Error::InvalidConfiguration(_) | Error::Json(_) => 400,
            Error::NotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::Timeout(_) => 504,
            Error::TransientIo(_) => 503,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::validation("speed must be an integer");
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(err.to_string(), "Validation error: speed must be an integer");
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(Error::validation("x").category(), "validation");
        assert_eq!(Error::model_not_loaded("x").category(), "resource_state");
        assert_eq!(Error::transient_io("x").category(), "transient_io");
    }

    #[test]
    fn test_error_classification() {
        let client_err = Error::not_found("resnet50");
        assert!(client_err.is_client_error());
        assert!(!client_err.is_transient());

        let io_err = Error::transient_io("fan channel unwritable");
        assert!(!io_err.is_client_error());
        assert!(io_err.is_transient());

        assert!(!Error::model_not_loaded("yolov5s").is_client_error());
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(Error::validation("test").to_http_status(), 400);
        assert_eq!(Error::not_found("test").to_http_status(), 404);
        assert_eq!(Error::conflict("test").to_http_status(), 409);
        assert_eq!(Error::model_not_loaded("test").to_http_status(), 500);
    }
}

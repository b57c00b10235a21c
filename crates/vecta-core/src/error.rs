//! Error types for Vecta Core.

use crate::config::ConfigError;
use thiserror::Error;
use vecta_abstraction::ProviderError;
use vecta_models::{CacheConfigError, CacheError};

/// Core error type for Vecta operations.
#[derive(Error, Debug)]
pub enum VectaError {
    /// Settings could not be loaded or parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Cache settings failed validation.
    #[error("Invalid cache configuration: {0}")]
    CacheConfig(#[from] CacheConfigError),

    /// Provider could not be created.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Load, inference or timeout failure from the model cache.
    #[error("{0}")]
    Cache(#[from] CacheError),

    /// One or more required models failed warm-up.
    #[error("Failed to load required models: {}", .0.join(", "))]
    WarmUpFailed(Vec<String>),
}

impl VectaError {
    /// Returns `true` if this error is an inference timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Cache(err) if err.is_timeout())
    }
}

/// Result type alias for Vecta operations.
pub type Result<T> = std::result::Result<T, VectaError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_vecta_error_cache_conversion() {
        let err: VectaError = CacheError::Timeout(Duration::from_secs(3)).into();
        assert!(err.is_timeout());
        match err {
            VectaError::Cache(CacheError::Timeout(limit)) => assert_eq!(limit.as_secs(), 3),
            _ => panic!("Expected Cache error variant"),
        }
    }

    #[test]
    fn test_vecta_error_provider_conversion() {
        let err: VectaError = ProviderError::UnsupportedProvider("onnx".to_string()).into();
        assert!(matches!(err, VectaError::Provider(_)));
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_warm_up_failed_lists_models() {
        let err = VectaError::WarmUpFailed(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "Failed to load required models: a, b");
    }
}

//! Provider factory for creating embedding providers from configuration.

use crate::MockProvider;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error};
use vecta_abstraction::{EmbeddingProvider, ProviderError};

/// Provider backend enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Deterministic mock provider for testing.
    Mock,
    /// Local ONNX models through fastembed.
    #[serde(alias = "fast-embed", alias = "onnx")]
    FastEmbed,
}

impl Default for ProviderKind {
    /// fastembed when compiled in, the mock provider otherwise.
    fn default() -> Self {
        if cfg!(feature = "fastembed") { Self::FastEmbed } else { Self::Mock }
    }
}

impl FromStr for ProviderKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "fastembed" | "fast-embed" | "onnx" => Ok(Self::FastEmbed),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Mock => "mock",
            Self::FastEmbed => "fastembed",
        })
    }
}

/// Provider configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Which backend to build.
    #[serde(default)]
    pub kind: ProviderKind,
    /// Directory where model weights are downloaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

impl ProviderConfig {
    /// Creates a new `ProviderConfig` for the given backend.
    #[must_use]
    pub const fn new(kind: ProviderKind) -> Self {
        Self { kind, cache_dir: None }
    }

    /// Sets the model download directory.
    #[must_use]
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(cache_dir.into());
        self
    }
}

/// Factory for creating embedding providers.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Creates a provider from the given configuration.
    ///
    /// # Errors
    /// Returns `ProviderError::UnsupportedProvider` if the backend was not
    /// compiled into this build.
    pub fn create(config: &ProviderConfig) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
        debug!(kind = %config.kind, cache_dir = ?config.cache_dir, "Creating embedding provider");

        match config.kind {
            ProviderKind::Mock => Ok(Arc::new(MockProvider::new())),
            #[cfg(feature = "fastembed")]
            ProviderKind::FastEmbed => {
                let provider = match &config.cache_dir {
                    Some(dir) => crate::FastEmbedProvider::with_cache_dir(dir.clone()),
                    None => crate::FastEmbedProvider::new(),
                };
                Ok(Arc::new(provider))
            }
            #[cfg(not(feature = "fastembed"))]
            ProviderKind::FastEmbed => Err(ProviderError::UnsupportedProvider(
                "fastembed support is not compiled in; rebuild with the `fastembed` feature"
                    .to_string(),
            )),
        }
    }

    /// Creates a provider from a backend name.
    ///
    /// # Errors
    /// Returns a `ProviderError` if the name is unrecognized or creation fails.
    pub fn create_from_str(kind: &str) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
        let kind = ProviderKind::from_str(kind).map_err(|()| {
            error!(kind = %kind, "Unrecognized provider kind");
            ProviderError::UnsupportedProvider(format!("Unrecognized provider kind: {kind}"))
        })?;
        Self::create(&ProviderConfig::new(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_from_str() {
        assert_eq!(ProviderKind::from_str("mock"), Ok(ProviderKind::Mock));
        assert_eq!(ProviderKind::from_str("MOCK"), Ok(ProviderKind::Mock));
        assert_eq!(ProviderKind::from_str("fastembed"), Ok(ProviderKind::FastEmbed));
        assert_eq!(ProviderKind::from_str("Fast-Embed"), Ok(ProviderKind::FastEmbed));
        assert_eq!(ProviderKind::from_str("onnx"), Ok(ProviderKind::FastEmbed));
        assert_eq!(ProviderKind::from_str("openai"), Err(()));
    }

    #[test]
    fn test_provider_kind_display_round_trips() {
        for kind in [ProviderKind::Mock, ProviderKind::FastEmbed] {
            assert_eq!(ProviderKind::from_str(&kind.to_string()), Ok(kind));
        }
    }

    #[test]
    fn test_provider_config_builder() {
        let config = ProviderConfig::new(ProviderKind::Mock).with_cache_dir("/tmp/models");
        assert_eq!(config.kind, ProviderKind::Mock);
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/models")));
        let expected =
            if cfg!(feature = "fastembed") { ProviderKind::FastEmbed } else { ProviderKind::Mock };
        assert_eq!(ProviderConfig::default().kind, expected);
    }

    #[test]
    fn test_factory_create_mock() {
        let provider = ProviderFactory::create(&ProviderConfig::new(ProviderKind::Mock)).unwrap();
        assert_eq!(provider.name(), "mock");
        let engine = provider.construct("test-model").unwrap();
        assert_eq!(engine.model_id(), "test-model");
    }

    #[test]
    fn test_factory_create_invalid_kind() {
        let result = ProviderFactory::create_from_str("invalid");
        assert!(matches!(result, Err(ProviderError::UnsupportedProvider(_))));
    }

    #[cfg(not(feature = "fastembed"))]
    #[test]
    fn test_factory_fastembed_requires_feature() {
        let result = ProviderFactory::create(&ProviderConfig::new(ProviderKind::FastEmbed));
        assert!(matches!(result, Err(ProviderError::UnsupportedProvider(_))));
    }
}

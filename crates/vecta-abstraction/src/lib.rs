//! Embedding provider abstraction layer for Vecta.
//!
//! This module defines the collaborator contract the model cache consumes: a
//! provider that constructs embedding engines by model identifier, and the
//! engines themselves. Both construction and inference are blocking calls;
//! callers are expected to run them off the async scheduler threads.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single embedding vector.
pub type Embedding = Vec<f32>;

/// Represents an error raised by an embedding provider.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderError {
    /// The provider could not build an engine for the given model.
    #[error("Construction Error for model '{model_id}': {message}")]
    Construction {
        /// The model identifier that failed to load.
        model_id: String,
        /// Provider-supplied failure description.
        message: String,
    },

    /// Inference failed on an otherwise valid engine.
    #[error("Inference Error for model '{model_id}': {message}")]
    Inference {
        /// The model identifier the engine was built for.
        model_id: String,
        /// Provider-supplied failure description.
        message: String,
    },

    /// The requested provider backend is not available in this build.
    #[error("Unsupported Embedding Provider: {0}")]
    UnsupportedProvider(String),
}

impl ProviderError {
    /// Shorthand for a construction failure.
    pub fn construction(model_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Construction { model_id: model_id.into(), message: message.into() }
    }

    /// Shorthand for an inference failure.
    pub fn inference(model_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Inference { model_id: model_id.into(), message: message.into() }
    }

    /// Returns `true` if this error happened while building an engine.
    #[must_use]
    pub const fn is_construction(&self) -> bool {
        matches!(self, Self::Construction { .. } | Self::UnsupportedProvider(_))
    }
}

/// A constructed, ready-to-run embedding model instance.
///
/// Engines are shared behind an `Arc` and may receive concurrent `embed`
/// calls. Backends that need exclusive access must serialize internally.
pub trait EmbeddingEngine: Send + Sync {
    /// Returns the model identifier this engine was built from.
    fn model_id(&self) -> &str;

    /// Embeds `texts`, returning one vector per input in input order.
    ///
    /// This call blocks the current thread.
    ///
    /// # Errors
    /// Returns `ProviderError::Inference` if the backend fails.
    fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>, ProviderError>;

    /// Returns the fixed output dimension, if the engine knows it up front.
    fn dimension(&self) -> Option<usize> {
        None
    }
}

impl std::fmt::Debug for dyn EmbeddingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingEngine")
            .field("model_id", &self.model_id())
            .field("dimension", &self.dimension())
            .finish()
    }
}

/// Builds embedding engines from opaque model identifiers.
pub trait EmbeddingProvider: Send + Sync {
    /// Short provider name used in logs (e.g., "mock", "fastembed").
    fn name(&self) -> &str;

    /// Constructs an engine for `model_id`.
    ///
    /// This call blocks the current thread and may take seconds.
    ///
    /// # Errors
    /// Returns `ProviderError::Construction` if the model cannot be built.
    fn construct(&self, model_id: &str) -> Result<Arc<dyn EmbeddingEngine>, ProviderError>;
}

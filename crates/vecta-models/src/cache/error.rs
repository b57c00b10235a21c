//! Errors surfaced by model cache operations.

use std::time::Duration;

use thiserror::Error;
use vecta_abstraction::ProviderError;

/// Errors that can occur while loading models or generating embeddings.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CacheError {
    /// The provider failed to construct an engine or to run inference.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The caller-supplied timeout elapsed before inference completed.
    ///
    /// The blocking call is not interrupted and may still be running.
    #[error("Embedding generation timed out after {0:?}")]
    Timeout(Duration),

    /// The worker pool has been shut down.
    #[error("Worker pool is shut down")]
    PoolClosed,

    /// A blocking provider call panicked or was aborted.
    #[error("Worker task failed: {0}")]
    Worker(String),

    /// The load this caller was waiting on ended without publishing a result.
    #[error("Load of model '{0}' was abandoned before completing")]
    LoadAbandoned(String),

    /// The provider returned the wrong number of vectors.
    #[error("Model '{model_id}' returned {actual} embeddings for {expected} inputs")]
    ShapeMismatch {
        /// Model that produced the output.
        model_id: String,
        /// Number of input texts.
        expected: usize,
        /// Number of vectors returned.
        actual: usize,
    },
}

impl CacheError {
    /// Returns `true` for the caller-supplied timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Returns `true` if no engine could be constructed.
    #[must_use]
    pub const fn is_construction(&self) -> bool {
        match self {
            Self::Provider(err) => err.is_construction(),
            _ => false,
        }
    }

    /// Returns `true` if inference itself failed on a loaded engine.
    #[must_use]
    pub const fn is_inference(&self) -> bool {
        matches!(
            self,
            Self::Provider(ProviderError::Inference { .. }) | Self::ShapeMismatch { .. }
        )
    }
}

//! Embedding engines and the model cache for Vecta.
//!
//! This crate provides the [`ModelCache`] and concrete implementations of the
//! `EmbeddingProvider` trait.
//!
//! # Supported Providers
//!
//! - **Mock**: Deterministic hash-based embeddings for testing and development
//! - **FastEmbed**: Local ONNX models via `fastembed` (feature `fastembed`)

pub mod cache;
pub mod factory;
#[cfg(feature = "fastembed")]
pub mod fastembed;

use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use vecta_abstraction::{Embedding, EmbeddingEngine, EmbeddingProvider, ProviderError};

pub use cache::{
    CacheConfig, CacheConfigError, CacheError, CacheSnapshot, CacheStats, ModelCache, ModelInfo,
    RemovalReason,
};
#[cfg(feature = "fastembed")]
pub use self::fastembed::{FastEmbedEngine, FastEmbedProvider};
pub use factory::{ProviderConfig, ProviderFactory, ProviderKind};

/// Default output dimension of mock engines.
pub const MOCK_DIMENSION: usize = 384;

/// Model ids with this prefix always fail to construct in the mock provider.
pub const MOCK_INVALID_PREFIX: &str = "invalid/";

/// Call counters shared by a mock provider and every engine it builds.
#[derive(Debug, Default)]
struct MockCounters {
    constructed: AtomicUsize,
    embed_calls: AtomicUsize,
    embedded_texts: AtomicUsize,
}

/// A mock implementation of `EmbeddingProvider` for testing and demonstration.
///
/// Vectors are derived from a SHA-256 digest of the model id and text, so the
/// same input always embeds to the same unit vector.
#[derive(Debug)]
pub struct MockProvider {
    dimension: usize,
    dimensions: HashMap<String, usize>,
    failing_models: HashSet<String>,
    failing_inference: HashSet<String>,
    construct_delay: Duration,
    embed_delay: Duration,
    counters: Arc<MockCounters>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Creates a mock provider producing `MOCK_DIMENSION`-sized vectors.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dimension: MOCK_DIMENSION,
            dimensions: HashMap::new(),
            failing_models: HashSet::new(),
            failing_inference: HashSet::new(),
            construct_delay: Duration::ZERO,
            embed_delay: Duration::ZERO,
            counters: Arc::new(MockCounters::default()),
        }
    }

    /// Sets the default output dimension.
    #[must_use]
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Sets the output dimension for one model id.
    #[must_use]
    pub fn with_model_dimension(mut self, model_id: &str, dimension: usize) -> Self {
        self.dimensions.insert(model_id.to_string(), dimension);
        self
    }

    /// Makes construction of `model_id` fail.
    #[must_use]
    pub fn with_failing_model(mut self, model_id: &str) -> Self {
        self.failing_models.insert(model_id.to_string());
        self
    }

    /// Makes inference on `model_id` fail after it loads.
    #[must_use]
    pub fn with_failing_inference(mut self, model_id: &str) -> Self {
        self.failing_inference.insert(model_id.to_string());
        self
    }

    /// Blocks every construction for `delay`.
    #[must_use]
    pub fn with_construct_delay(mut self, delay: Duration) -> Self {
        self.construct_delay = delay;
        self
    }

    /// Blocks every inference call for `delay`.
    #[must_use]
    pub fn with_embed_delay(mut self, delay: Duration) -> Self {
        self.embed_delay = delay;
        self
    }

    /// Number of engines constructed so far.
    #[must_use]
    pub fn construct_calls(&self) -> usize {
        self.counters.constructed.load(Ordering::SeqCst)
    }

    /// Number of inference calls so far, across all engines.
    #[must_use]
    pub fn embed_calls(&self) -> usize {
        self.counters.embed_calls.load(Ordering::SeqCst)
    }

    /// Number of texts embedded so far, across all engines.
    #[must_use]
    pub fn embedded_texts(&self) -> usize {
        self.counters.embedded_texts.load(Ordering::SeqCst)
    }
}

impl EmbeddingProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn construct(&self, model_id: &str) -> Result<Arc<dyn EmbeddingEngine>, ProviderError> {
        debug!(model_id = %model_id, "MockProvider constructing engine");

        if !self.construct_delay.is_zero() {
            std::thread::sleep(self.construct_delay);
        }

        if model_id.is_empty() {
            return Err(ProviderError::construction(model_id, "model id must not be empty"));
        }
        if model_id.starts_with(MOCK_INVALID_PREFIX) || self.failing_models.contains(model_id) {
            return Err(ProviderError::construction(model_id, "model not found"));
        }

        self.counters.constructed.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockEngine {
            model_id: model_id.to_string(),
            dimension: self.dimensions.get(model_id).copied().unwrap_or(self.dimension),
            embed_delay: self.embed_delay,
            fail_inference: self.failing_inference.contains(model_id),
            counters: Arc::clone(&self.counters),
        }))
    }
}

/// Engine built by [`MockProvider`].
#[derive(Debug)]
pub struct MockEngine {
    model_id: String,
    dimension: usize,
    embed_delay: Duration,
    fail_inference: bool,
    counters: Arc<MockCounters>,
}

impl EmbeddingEngine for MockEngine {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>, ProviderError> {
        self.counters.embed_calls.fetch_add(1, Ordering::SeqCst);

        if !self.embed_delay.is_zero() {
            std::thread::sleep(self.embed_delay);
        }
        if self.fail_inference {
            return Err(ProviderError::inference(&self.model_id, "mock inference failure"));
        }

        self.counters.embedded_texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|text| mock_vector(&self.model_id, text, self.dimension)).collect())
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }
}

/// Expand SHA-256 digests of `(model_id, text)` into a unit vector.
fn mock_vector(model_id: &str, text: &str, dimension: usize) -> Embedding {
    let mut values = Vec::with_capacity(dimension);
    let mut block: u32 = 0;
    while values.len() < dimension {
        let mut hasher = Sha256::new();
        hasher.update(model_id.as_bytes());
        hasher.update([0_u8]);
        hasher.update(text.as_bytes());
        hasher.update(block.to_le_bytes());
        let digest = hasher.finalize();

        let remaining = dimension - values.len();
        values.extend(digest.iter().take(remaining).map(|byte| f32::from(*byte) / 127.5 - 1.0));
        block += 1;
    }

    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut values {
            *value /= norm;
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_vectors_are_deterministic_unit_vectors() {
        let first = mock_vector("m", "hello", 384);
        let second = mock_vector("m", "hello", 384);
        assert_eq!(first, second);
        assert_eq!(first.len(), 384);

        let norm = first.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_mock_vectors_differ_by_text_and_model() {
        assert_ne!(mock_vector("m", "a", 16), mock_vector("m", "b", 16));
        assert_ne!(mock_vector("m1", "a", 16), mock_vector("m2", "a", 16));
    }

    #[test]
    fn test_mock_provider_rejects_invalid_models() {
        let provider = MockProvider::new().with_failing_model("broken");

        let err = provider.construct("invalid/model-name-xyz-123").unwrap_err();
        assert!(err.is_construction());
        assert!(provider.construct("broken").is_err());
        assert!(provider.construct("").is_err());
        assert_eq!(provider.construct_calls(), 0);
    }

    #[test]
    fn test_mock_engine_embeds_in_order() {
        let provider = MockProvider::new().with_model_dimension("small", 8);
        let engine = provider.construct("small").unwrap();
        let texts = vec!["one".to_string(), "two".to_string(), "three".to_string()];

        let vectors = engine.embed(&texts).unwrap();

        assert_eq!(vectors.len(), 3);
        assert!(vectors.iter().all(|v| v.len() == 8));
        assert_eq!(vectors[1], mock_vector("small", "two", 8));
        assert_eq!(engine.dimension(), Some(8));
        assert_eq!(provider.embed_calls(), 1);
        assert_eq!(provider.embedded_texts(), 3);
    }

    #[test]
    fn test_mock_engine_inference_failure() {
        let provider = MockProvider::new().with_failing_inference("flaky");
        let engine = provider.construct("flaky").unwrap();

        let err = engine.embed(&["x".to_string()]).unwrap_err();
        assert!(matches!(err, ProviderError::Inference { .. }));
    }
}

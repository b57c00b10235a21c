//! Local ONNX embedding engines backed by `fastembed`.
//!
//! Model ids are matched case-insensitively against the model codes fastembed
//! ships (e.g. `BAAI/bge-small-en-v1.5`). Weights are downloaded on first
//! construction into the configured cache directory.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::{debug, info};
use vecta_abstraction::{Embedding, EmbeddingEngine, EmbeddingProvider, ProviderError};

/// Provider that builds [`FastEmbedEngine`]s.
#[derive(Debug, Clone, Default)]
pub struct FastEmbedProvider {
    cache_dir: Option<PathBuf>,
}

impl FastEmbedProvider {
    /// Uses fastembed's default download directory.
    #[must_use]
    pub const fn new() -> Self {
        Self { cache_dir: None }
    }

    /// Downloads model weights into `cache_dir`.
    #[must_use]
    pub const fn with_cache_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir: Some(cache_dir) }
    }

    /// Model codes fastembed can construct.
    #[must_use]
    pub fn supported_models() -> Vec<String> {
        TextEmbedding::list_supported_models().into_iter().map(|info| info.model_code).collect()
    }

    fn resolve(model_id: &str) -> Option<(EmbeddingModel, usize)> {
        TextEmbedding::list_supported_models()
            .into_iter()
            .find(|info| info.model_code.eq_ignore_ascii_case(model_id))
            .map(|info| (info.model, info.dim))
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn name(&self) -> &str {
        "fastembed"
    }

    fn construct(&self, model_id: &str) -> Result<Arc<dyn EmbeddingEngine>, ProviderError> {
        let (model, dimension) = Self::resolve(model_id).ok_or_else(|| {
            ProviderError::construction(model_id, "not a model supported by fastembed")
        })?;

        let mut options = InitOptions::new(model).with_show_download_progress(false);
        if let Some(dir) = &self.cache_dir {
            options = options.with_cache_dir(dir.clone());
        }

        debug!(model_id = %model_id, cache_dir = ?self.cache_dir, "Initializing fastembed model");
        let embedding = TextEmbedding::try_new(options)
            .map_err(|e| ProviderError::construction(model_id, format!("{e:#}")))?;
        info!(model_id = %model_id, dimension, "fastembed model ready");

        Ok(Arc::new(FastEmbedEngine {
            model_id: model_id.to_string(),
            dimension,
            model: Mutex::new(embedding),
        }))
    }
}

/// A fastembed text model. Inference needs exclusive access, so calls on
/// one engine are serialized.
pub struct FastEmbedEngine {
    model_id: String,
    dimension: usize,
    model: Mutex<TextEmbedding>,
}

impl std::fmt::Debug for FastEmbedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedEngine")
            .field("model_id", &self.model_id)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl EmbeddingEngine for FastEmbedEngine {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        model
            .embed(texts.to_vec(), None)
            .map_err(|e| ProviderError::inference(&self.model_id, format!("{e:#}")))
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }
}

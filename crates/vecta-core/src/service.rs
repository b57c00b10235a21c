//! Embedding service built on the model cache.
//!
//! The service owns the cache, applies the request timeout from settings and
//! shapes results into the reports the CLI prints. Startup is gated on every
//! required model warming up.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use vecta_abstraction::{Embedding, EmbeddingProvider};
use vecta_models::{CacheSnapshot, ModelCache, ProviderFactory, RemovalReason};

use crate::config::Settings;
use crate::error::{Result, VectaError};

/// Health status reported while the service is up.
pub const HEALTHY: &str = "healthy";

/// Result of a single-text embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedOutput {
    /// The embedding vector.
    pub embedding: Embedding,
    /// Model that produced the vector.
    pub model_id: String,
    /// Vector length.
    pub dimension: usize,
    /// Input length in characters.
    pub text_length: usize,
    /// Wall time for the request, including any model load.
    pub processing_time_ms: f64,
}

/// Result of a batch embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEmbedOutput {
    /// One vector per input, in input order.
    pub embeddings: Vec<Embedding>,
    /// Model that produced the vectors.
    pub model_id: String,
    /// Vector length, or 0 for an empty batch.
    pub dimension: usize,
    /// Number of vectors returned.
    pub count: usize,
    /// Wall time for the request, including any model load.
    pub processing_time_ms: f64,
}

/// Liveness report with the current cache contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Always [`HEALTHY`] while the service answers.
    pub status: String,
    /// Cached models and lifetime counters.
    pub cache: CacheSnapshot,
    /// Whole seconds since the service was created.
    pub uptime_seconds: u64,
}

/// Configured and currently cached model ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelsReport {
    /// Models warmed up at startup, in configuration order.
    pub required_models: Vec<String>,
    /// Least recently used first.
    pub cached_models: Vec<String>,
}

/// Model metadata. Ids the cache has never held report `is_cached = false`
/// and no timings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfoReport {
    pub model_id: String,
    pub is_cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_duration_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_reason: Option<RemovalReason>,
}

/// Embedding service.
pub struct EmbeddingService {
    settings: Settings,
    cache: Arc<ModelCache>,
    started_at: Instant,
}

impl std::fmt::Debug for EmbeddingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingService")
            .field("settings", &self.settings)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl EmbeddingService {
    /// Create a service backed by `provider`.
    ///
    /// # Errors
    /// Returns `VectaError::CacheConfig` if the cache settings are invalid.
    pub fn new(settings: Settings, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let cache = ModelCache::new(settings.cache.clone(), provider)?;
        Ok(Self { settings, cache: Arc::new(cache), started_at: Instant::now() })
    }

    /// Create a service with the provider named in `settings`.
    ///
    /// # Errors
    /// Returns `VectaError::Provider` if the backend is unavailable.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let provider = ProviderFactory::create(&settings.provider)?;
        Self::new(settings, provider)
    }

    /// Start the cache sweep and warm up every required model.
    ///
    /// # Errors
    /// Returns `VectaError::WarmUpFailed` listing the models that failed, after
    /// stopping the cache.
    pub async fn start(&self) -> Result<()> {
        self.cache.start();

        if self.settings.required_models.is_empty() {
            info!("No required models configured, skipping warm-up");
            return Ok(());
        }

        info!(models = ?self.settings.required_models, "Warming up required models");
        let results = self.cache.warm_up(&self.settings.required_models).await;
        let failed: Vec<String> =
            results.into_iter().filter(|(_, ok)| !ok).map(|(model_id, _)| model_id).collect();

        if !failed.is_empty() {
            error!(failed = ?failed, "Failed to load required models");
            self.cache.stop().await;
            return Err(VectaError::WarmUpFailed(failed));
        }

        info!(count = self.settings.required_models.len(), "All required models loaded");
        Ok(())
    }

    /// Start the sweep without warming anything up.
    pub fn start_without_warm_up(&self) {
        warn!("Skipping warm-up of required models");
        self.cache.start();
    }

    /// Stop the cache. Calling this more than once is harmless.
    pub async fn shutdown(&self) {
        info!("Shutting down embedding service");
        self.cache.stop().await;
    }

    /// Embed one text.
    pub async fn embed(&self, model_id: &str, text: &str) -> Result<EmbedOutput> {
        let started = Instant::now();
        let embedding = self.cache.embed(model_id, text, self.settings.request_timeout()).await?;

        Ok(EmbedOutput {
            dimension: embedding.len(),
            embedding,
            model_id: model_id.to_string(),
            text_length: text.chars().count(),
            processing_time_ms: elapsed_ms(started),
        })
    }

    /// Embed many texts in one inference call.
    pub async fn embed_batch(&self, model_id: &str, texts: &[String]) -> Result<BatchEmbedOutput> {
        let started = Instant::now();
        let embeddings =
            self.cache.embed_batch(model_id, texts, self.settings.request_timeout()).await?;

        Ok(BatchEmbedOutput {
            dimension: embeddings.first().map_or(0, Vec::len),
            count: embeddings.len(),
            embeddings,
            model_id: model_id.to_string(),
            processing_time_ms: elapsed_ms(started),
        })
    }

    /// Report service health.
    ///
    /// # Returns
    /// A [`HealthReport`] with status, cache snapshot and uptime.
    #[must_use]
    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: HEALTHY.to_string(),
            cache: self.cache.cache_snapshot(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }

    /// List required and cached models.
    ///
    /// # Returns
    /// A [`ModelsReport`] with cached models least recently used first.
    #[must_use]
    pub fn models(&self) -> ModelsReport {
        ModelsReport {
            required_models: self.settings.required_models.clone(),
            cached_models: self.cache.cache_snapshot().cached_models,
        }
    }

    /// Describe one model.
    ///
    /// # Arguments
    /// * `model_id` - The model to look up
    ///
    /// # Returns
    /// Timings for cached or previously removed models. Unknown ids come back
    /// with `is_cached = false` and no timings.
    #[must_use]
    pub fn model_info(&self, model_id: &str) -> ModelInfoReport {
        match self.cache.model_info(model_id) {
            Some(info) => ModelInfoReport {
                model_id: info.model_id,
                is_cached: info.is_cached,
                load_duration_ms: Some(info.load_duration_ms),
                loaded_at: Some(info.loaded_at),
                last_used: Some(info.last_used),
                removed_reason: info.removed_reason,
            },
            None => ModelInfoReport {
                model_id: model_id.to_string(),
                is_cached: false,
                load_duration_ms: None,
                loaded_at: None,
                last_used: None,
                removed_reason: None,
            },
        }
    }

    /// Check a model without caching it.
    pub async fn validate(&self, model_id: &str) -> bool {
        self.cache.validate(model_id, false).await
    }

    /// Drop a model from the cache.
    ///
    /// # Arguments
    /// * `model_id` - The model to unload
    ///
    /// # Returns
    /// `true` if the model was cached.
    pub fn unload(&self, model_id: &str) -> bool {
        self.cache.unload(model_id)
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Shared handle to the underlying cache.
    #[must_use]
    pub fn cache(&self) -> Arc<ModelCache> {
        Arc::clone(&self.cache)
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

//! Core data types for model caching.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use vecta_abstraction::EmbeddingEngine;

/// A cached engine with its load metadata.
#[derive(Clone)]
pub struct CacheEntry {
    /// The constructed engine.
    pub engine: Arc<dyn EmbeddingEngine>,
    /// How long construction took.
    pub load_duration: Duration,
    /// Wall-clock time the entry was created.
    pub loaded_at: DateTime<Utc>,
    /// Monotonic time of the last lookup or load; drives TTL expiry.
    pub last_used: Instant,
    /// Position in the recency order (higher is more recent).
    pub(crate) stamp: u64,
}

impl CacheEntry {
    /// Create a new cache entry for an engine that just finished loading.
    pub fn new(engine: Arc<dyn EmbeddingEngine>, load_duration: Duration) -> Self {
        Self { engine, load_duration, loaded_at: Utc::now(), last_used: Instant::now(), stamp: 0 }
    }

    /// How long the entry has been idle as of `now`.
    #[must_use]
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used)
    }

    /// Wall-clock estimate of `last_used`.
    #[must_use]
    pub fn last_used_at(&self) -> DateTime<Utc> {
        let idle = chrono::Duration::from_std(self.last_used.elapsed()).unwrap_or_default();
        Utc::now() - idle
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("model_id", &self.engine.model_id())
            .field("load_duration", &self.load_duration)
            .field("loaded_at", &self.loaded_at)
            .field("last_used", &self.last_used)
            .finish_non_exhaustive()
    }
}

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    /// Evicted to make room for another model.
    Lru,
    /// Offloaded by the idle sweep.
    TtlExpired,
    /// Removed explicitly.
    Unloaded,
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Lru => "lru_eviction",
            Self::TtlExpired => "ttl_expired",
            Self::Unloaded => "unloaded",
        })
    }
}

/// Cache statistics for observability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub total_hits: u64,
    /// Lookups that started a load.
    pub total_misses: u64,
    /// Lookups that joined a load already in flight.
    pub coalesced_loads: u64,
    /// Loads that failed to construct an engine.
    pub load_failures: u64,
    /// Entries evicted to respect capacity.
    pub lru_evictions: u64,
    /// Entries offloaded by the idle sweep.
    pub ttl_evictions: u64,
    /// Entries removed explicitly.
    pub unloads: u64,
    /// Current number of models in cache.
    pub cache_size: usize,
}

impl CacheStats {
    pub(crate) fn record_removal(&mut self, reason: RemovalReason) {
        match reason {
            RemovalReason::Lru => self.lru_evictions += 1,
            RemovalReason::TtlExpired => self.ttl_evictions += 1,
            RemovalReason::Unloaded => self.unloads += 1,
        }
    }
}

/// Point-in-time view of the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    /// Cached model ids, least recently used first.
    pub cached_models: Vec<String>,
    /// Number of cached models.
    pub num_cached: usize,
    /// Configured capacity.
    pub max_cached: usize,
    /// Configured idle TTL in seconds.
    pub ttl_secs: u64,
    /// Configured sweep interval in seconds.
    pub sweep_interval_secs: u64,
    /// Counters since the cache was created.
    pub stats: CacheStats,
}

/// Metadata about a model that is, or was, cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// The model identifier.
    pub model_id: String,
    /// Whether an engine is currently held.
    pub is_cached: bool,
    /// Construction time in milliseconds.
    pub load_duration_ms: f64,
    /// When the engine was loaded.
    pub loaded_at: DateTime<Utc>,
    /// Last lookup or load.
    pub last_used: DateTime<Utc>,
    /// Set once the entry has left the cache.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_reason: Option<RemovalReason>,
}

impl ModelInfo {
    pub(crate) fn cached(model_id: &str, entry: &CacheEntry) -> Self {
        Self {
            model_id: model_id.to_string(),
            is_cached: true,
            load_duration_ms: entry.load_duration.as_secs_f64() * 1000.0,
            loaded_at: entry.loaded_at,
            last_used: entry.last_used_at(),
            removed_reason: None,
        }
    }

    pub(crate) fn removed(model_id: &str, entry: &CacheEntry, reason: RemovalReason) -> Self {
        Self { is_cached: false, removed_reason: Some(reason), ..Self::cached(model_id, entry) }
    }
}

//! Model caching system for embedding engines.
//!
//! This module keeps a bounded set of constructed engines in memory, loads
//! missing ones on demand through a single shared construction per model,
//! evicts the least recently used engine at capacity, and offloads engines
//! that sit idle past their TTL.

pub mod cache;
pub mod config;
pub mod error;
pub mod pool;
pub mod types;

pub use cache::{ModelCache, VALIDATION_SAMPLE};
pub use config::{CacheConfig, CacheConfigError, MAX_WORKER_COUNT};
pub use error::CacheError;
pub use pool::WorkerPool;
pub use types::{CacheEntry, CacheSnapshot, CacheStats, ModelInfo, RemovalReason};

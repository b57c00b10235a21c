//! Configuration for the model cache.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Upper bound on worker slots; beyond this the blocking pool itself becomes the limit.
pub const MAX_WORKER_COUNT: usize = 1024;

/// Configuration for the model cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of models to keep in memory (default: 5).
    #[serde(default = "default_max_cached")]
    pub max_cached: usize,

    /// Seconds a model may sit idle before the sweep offloads it (default: 3600).
    ///
    /// Zero makes every entry eligible on the next sweep.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// How often the idle sweep runs in seconds (default: 60).
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Number of blocking provider calls allowed to run at once (default: 4).
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
}

fn default_max_cached() -> usize {
    5
}

fn default_ttl_secs() -> u64 {
    3600 // 1 hour
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_worker_count() -> usize {
    4
}

/// Errors that can occur during cache configuration validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheConfigError {
    /// Invalid max cache size (must be > 0).
    #[error("Invalid max cached models: must be greater than 0")]
    InvalidMaxCached,

    /// Invalid sweep interval (must be > 0).
    #[error("Invalid sweep interval: must be greater than 0")]
    InvalidSweepInterval,

    /// Invalid worker count (must be in 1..=MAX_WORKER_COUNT).
    #[error("Invalid worker count {0}: must be between 1 and {MAX_WORKER_COUNT}")]
    InvalidWorkerCount(usize),
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cached: default_max_cached(),
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            worker_count: default_worker_count(),
        }
    }
}

impl CacheConfig {
    /// Validate the cache configuration.
    ///
    /// # Errors
    /// Returns `CacheConfigError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), CacheConfigError> {
        if self.max_cached == 0 {
            return Err(CacheConfigError::InvalidMaxCached);
        }

        if self.sweep_interval_secs == 0 {
            return Err(CacheConfigError::InvalidSweepInterval);
        }

        if self.worker_count == 0 || self.worker_count > MAX_WORKER_COUNT {
            return Err(CacheConfigError::InvalidWorkerCount(self.worker_count));
        }

        Ok(())
    }

    /// Get the idle TTL as a Duration.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Get the sweep interval as a Duration.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.max_cached, 5);
        assert_eq!(config.ttl_secs, 3600);
        assert_eq!(config.sweep_interval_secs, 60);
        assert_eq!(config.worker_count, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cache_config_zero_ttl_is_valid() {
        let config = CacheConfig { ttl_secs: 0, ..CacheConfig::default() };
        assert!(config.validate().is_ok());
        assert_eq!(config.ttl(), Duration::ZERO);
    }

    #[test]
    fn test_cache_config_validation_invalid_max_cached() {
        let config = CacheConfig { max_cached: 0, ..CacheConfig::default() };
        assert_eq!(config.validate(), Err(CacheConfigError::InvalidMaxCached));
    }

    #[test]
    fn test_cache_config_validation_invalid_sweep_interval() {
        let config = CacheConfig { sweep_interval_secs: 0, ..CacheConfig::default() };
        assert_eq!(config.validate(), Err(CacheConfigError::InvalidSweepInterval));
    }

    #[test]
    fn test_cache_config_validation_invalid_worker_count() {
        let none = CacheConfig { worker_count: 0, ..CacheConfig::default() };
        assert_eq!(none.validate(), Err(CacheConfigError::InvalidWorkerCount(0)));

        let too_many = CacheConfig { worker_count: MAX_WORKER_COUNT + 1, ..CacheConfig::default() };
        assert!(matches!(too_many.validate(), Err(CacheConfigError::InvalidWorkerCount(_))));
    }

    #[test]
    fn test_cache_config_partial_deserialization_uses_defaults() {
        let config: CacheConfig = toml_like_json(r#"{"max_cached": 2}"#);
        assert_eq!(config.max_cached, 2);
        assert_eq!(config.ttl_secs, 3600);
        assert_eq!(config.worker_count, 4);
    }

    #[test]
    fn test_cache_config_durations() {
        let config = CacheConfig {
            max_cached: 3,
            ttl_secs: 1800,
            sweep_interval_secs: 300,
            worker_count: 2,
        };

        assert_eq!(config.ttl(), Duration::from_secs(1800));
        assert_eq!(config.sweep_interval(), Duration::from_secs(300));
    }

    fn toml_like_json(raw: &str) -> CacheConfig {
        serde_json::from_str(raw).unwrap()
    }
}

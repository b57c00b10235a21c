//! Service settings.
//!
//! Settings come from `vecta.toml`, then environment overrides, then CLI
//! flags (applied by the binary). Every field has a default, so an empty or
//! missing file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use vecta_models::{CacheConfig, ProviderConfig, ProviderKind};

/// Name of the settings file looked up in the working directory.
pub const SETTINGS_FILE_NAME: &str = "vecta.toml";

/// Environment variable names for overrides.
pub mod env {
    /// Comma-separated model ids to warm up at startup.
    pub const REQUIRED_MODELS: &str = "VECTA_REQUIRED_MODELS";
    /// Idle TTL in seconds.
    pub const MODEL_CACHE_TTL: &str = "VECTA_MODEL_CACHE_TTL";
    /// Cache capacity.
    pub const MAX_CACHED_MODELS: &str = "VECTA_MAX_CACHED_MODELS";
    /// Sweep interval in seconds.
    pub const CLEANUP_INTERVAL: &str = "VECTA_CLEANUP_INTERVAL";
    /// Worker pool size.
    pub const THREAD_POOL_WORKERS: &str = "VECTA_THREAD_POOL_WORKERS";
    /// Per-request inference timeout in seconds.
    pub const REQUEST_TIMEOUT: &str = "VECTA_REQUEST_TIMEOUT";
    /// Provider backend name.
    pub const PROVIDER: &str = "VECTA_PROVIDER";
    /// Log level.
    pub const LOG_LEVEL: &str = "VECTA_LOG_LEVEL";
}

/// Top-level service settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Models validated and cached before the service accepts work.
    #[serde(default = "default_required_models")]
    pub required_models: Vec<String>,

    /// Inference timeout per request in seconds. Zero disables it.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Log level used when neither `--log-level` nor `RUST_LOG` is set.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Embedding backend.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Model cache tuning.
    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_required_models() -> Vec<String> {
    vec![
        "BAAI/bge-small-en-v1.5".to_string(),
        "BAAI/bge-base-en-v1.5".to_string(),
        "sentence-transformers/all-MiniLM-L6-v2".to_string(),
    ]
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            required_models: default_required_models(),
            request_timeout_secs: default_request_timeout_secs(),
            log_level: default_log_level(),
            provider: ProviderConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

/// Errors that can occur during settings loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Settings file not found.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// Failed to read settings file.
    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    /// Failed to parse settings file.
    #[error("Failed to parse configuration file: {0}")]
    ParseError(String),

    /// An override could not be parsed.
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue {
        /// Setting or variable name.
        key: String,
        /// The rejected value.
        value: String,
    },
}

/// Result type for settings operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

impl Settings {
    /// Load settings from a TOML file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    /// Default settings file path inside `dir`.
    pub fn default_path(dir: &Path) -> PathBuf {
        dir.join(SETTINGS_FILE_NAME)
    }

    /// Discover and load the settings file.
    ///
    /// An explicit path must exist. Otherwise `vecta.toml` in `dir` is used
    /// if present, and defaults if not.
    pub fn discover_in(dir: &Path, explicit: Option<&Path>) -> ConfigResult<Self> {
        if let Some(path) = explicit {
            debug!(path = %path.display(), "Loading settings from explicit path");
            return Self::load_from_file(path);
        }

        let local = Self::default_path(dir);
        if local.exists() {
            debug!(path = %local.display(), "Loading settings from working directory");
            return Self::load_from_file(&local);
        }

        debug!("No settings file found, using defaults");
        Ok(Self::default())
    }

    /// Discover settings relative to the current directory.
    pub fn discover_and_load(explicit: Option<&Path>) -> ConfigResult<Self> {
        Self::discover_in(Path::new("."), explicit)
    }

    /// Discover settings and apply overrides from the process environment.
    pub fn load(explicit: Option<&Path>) -> ConfigResult<Self> {
        let mut settings = Self::discover_and_load(explicit)?;
        settings.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Apply `VECTA_*` overrides read through `lookup`.
    ///
    /// Unset and empty variables leave the current value alone.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = var(env::REQUIRED_MODELS) {
            self.required_models = parse_comma_list(&value);
        }
        if let Some(value) = var(env::MODEL_CACHE_TTL) {
            self.cache.ttl_secs = parse_number(env::MODEL_CACHE_TTL, &value)?;
        }
        if let Some(value) = var(env::MAX_CACHED_MODELS) {
            self.cache.max_cached = parse_number(env::MAX_CACHED_MODELS, &value)?;
        }
        if let Some(value) = var(env::CLEANUP_INTERVAL) {
            self.cache.sweep_interval_secs = parse_number(env::CLEANUP_INTERVAL, &value)?;
        }
        if let Some(value) = var(env::THREAD_POOL_WORKERS) {
            self.cache.worker_count = parse_number(env::THREAD_POOL_WORKERS, &value)?;
        }
        if let Some(value) = var(env::REQUEST_TIMEOUT) {
            self.request_timeout_secs = parse_number(env::REQUEST_TIMEOUT, &value)?;
        }
        if let Some(value) = var(env::PROVIDER) {
            self.provider.kind = ProviderKind::from_str(&value).map_err(|()| {
                ConfigError::InvalidValue { key: env::PROVIDER.to_string(), value: value.clone() }
            })?;
        }
        if let Some(value) = var(env::LOG_LEVEL) {
            self.log_level = value.trim().to_lowercase();
        }
        Ok(())
    }

    /// Inference timeout, or `None` when disabled.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

/// Split a comma-separated list, trimming whitespace and dropping empties.
pub fn parse_comma_list(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|item| !item.is_empty()).map(String::from).collect()
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key: key.to_string(), value: value.to_string() })
}

//! Vecta core: settings, errors and the embedding service.
//!
//! The service wraps [`vecta_models::ModelCache`] with a warm-up gate for
//! required models, a per-request inference timeout and JSON-friendly
//! reports for health and model status.

pub mod config;
pub mod error;
pub mod service;

pub use config::{ConfigError, Settings};
pub use error::{Result, VectaError};
pub use service::{
    BatchEmbedOutput, EmbedOutput, EmbeddingService, HealthReport, ModelInfoReport, ModelsReport,
};

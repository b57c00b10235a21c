//! Integration tests for the embedding service.

use std::sync::Arc;

use tempfile::TempDir;
use vecta_core::{EmbeddingService, Settings, VectaError};
use vecta_models::{MockProvider, ProviderKind, RemovalReason};

fn settings_with(required: &[&str], max_cached: usize) -> Settings {
    let mut settings = Settings {
        required_models: required.iter().map(ToString::to_string).collect(),
        ..Settings::default()
    };
    settings.cache.max_cached = max_cached;
    settings.provider.kind = ProviderKind::Mock;
    settings
}

#[tokio::test]
async fn test_start_warms_up_required_models() {
    let provider = Arc::new(MockProvider::new());
    let service =
        EmbeddingService::new(settings_with(&["m1", "m2"], 5), provider.clone()).unwrap();

    service.start().await.unwrap();

    let models = service.models();
    assert_eq!(models.required_models, vec!["m1", "m2"]);
    assert_eq!(models.cached_models, vec!["m1", "m2"]);
    assert_eq!(provider.construct_calls(), 2);

    // Warm models serve requests without another construction.
    service.embed("m1", "hello").await.unwrap();
    assert_eq!(provider.construct_calls(), 2);

    service.shutdown().await;
}

#[tokio::test]
async fn test_start_fails_when_a_required_model_fails() {
    let service = EmbeddingService::new(
        settings_with(&["m1", "invalid/model-name-xyz-123"], 5),
        Arc::new(MockProvider::new()),
    )
    .unwrap();

    let err = service.start().await.unwrap_err();

    match err {
        VectaError::WarmUpFailed(failed) => {
            assert_eq!(failed, vec!["invalid/model-name-xyz-123".to_string()]);
        }
        other => panic!("Expected WarmUpFailed, got {other:?}"),
    }
    assert!(!service.cache().is_running());
}

#[tokio::test]
async fn test_health_report_serializes() {
    let service = EmbeddingService::new(settings_with(&["m1"], 3), Arc::new(MockProvider::new()))
        .unwrap();
    service.start().await.unwrap();

    let health = service.health();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.cache.num_cached, 1);
    assert_eq!(health.cache.max_cached, 3);

    let json = serde_json::to_value(&health).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["cache"]["cached_models"][0], "m1");
    assert!(json["uptime_seconds"].is_u64());

    service.shutdown().await;
    service.shutdown().await;
}

#[tokio::test]
async fn test_model_info_after_eviction() {
    let service = EmbeddingService::new(settings_with(&[], 1), Arc::new(MockProvider::new()))
        .unwrap();

    service.embed("m1", "a").await.unwrap();
    service.embed("m2", "a").await.unwrap();

    let evicted = service.model_info("m1");
    assert!(!evicted.is_cached);
    assert_eq!(evicted.removed_reason, Some(RemovalReason::Lru));
    assert!(evicted.loaded_at.is_some());

    let cached = service.model_info("m2");
    assert!(cached.is_cached);
    assert!(cached.load_duration_ms.is_some());
}

#[tokio::test]
async fn test_validate_does_not_cache_and_unload_removes() {
    let service = EmbeddingService::new(settings_with(&[], 2), Arc::new(MockProvider::new()))
        .unwrap();

    assert!(service.validate("m1").await);
    assert!(!service.validate("invalid/model").await);
    assert!(service.models().cached_models.is_empty());

    service.embed("m1", "a").await.unwrap();
    assert!(service.unload("m1"));
    assert!(!service.unload("m1"));
    assert_eq!(service.model_info("m1").removed_reason, Some(RemovalReason::Unloaded));
}

#[tokio::test]
async fn test_batch_output() {
    let service = EmbeddingService::new(settings_with(&[], 2), Arc::new(MockProvider::new()))
        .unwrap();
    let texts = vec!["a".to_string(), "b".to_string()];

    let output = service.embed_batch("m1", &texts).await.unwrap();

    assert_eq!(output.count, 2);
    assert_eq!(output.dimension, 384);
    assert_eq!(output.model_id, "m1");
    assert_ne!(output.embeddings[0], output.embeddings[1]);
}

#[tokio::test]
async fn test_from_settings_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("vecta.toml");
    std::fs::write(
        &path,
        r#"
required_models = ["m1"]

[provider]
kind = "mock"

[cache]
max_cached = 2
"#,
    )
    .unwrap();

    let settings = Settings::discover_in(temp.path(), None).unwrap();
    let service = EmbeddingService::from_settings(settings).unwrap();
    service.start().await.unwrap();

    assert_eq!(service.models().cached_models, vec!["m1"]);
    assert_eq!(service.health().cache.max_cached, 2);
    service.shutdown().await;
}

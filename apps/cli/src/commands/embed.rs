//! Embed and batch commands.

use vecta_core::Settings;

use super::{print_json, start_service};

/// Execute the embed command.
pub async fn execute_single(
    settings: Settings,
    skip_warm_up: bool,
    model_id: &str,
    text: &str,
) -> anyhow::Result<()> {
    let service = start_service(settings, skip_warm_up).await?;
    let result = service.embed(model_id, text).await;
    service.shutdown().await;

    print_json(&result?)
}

/// Execute the batch command.
pub async fn execute_batch(
    settings: Settings,
    skip_warm_up: bool,
    model_id: &str,
    texts: &[String],
) -> anyhow::Result<()> {
    let service = start_service(settings, skip_warm_up).await?;
    let result = service.embed_batch(model_id, texts).await;
    service.shutdown().await;

    print_json(&result?)
}

//! Command implementations.

pub mod embed;
pub mod run;
pub mod status;
pub mod validate;

use anyhow::Context;
use vecta_core::{EmbeddingService, Settings};

/// Build the service and pass the warm-up gate unless skipped.
pub async fn start_service(settings: Settings, skip_warm_up: bool) -> anyhow::Result<EmbeddingService> {
    let service =
        EmbeddingService::from_settings(settings).context("Failed to create embedding service")?;

    if skip_warm_up {
        service.start_without_warm_up();
    } else {
        service.start().await.context("Service startup failed")?;
    }
    Ok(service)
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

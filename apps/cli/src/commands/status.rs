//! Status command implementation.

use vecta_core::Settings;

use super::{print_json, start_service};

/// Execute the status command.
///
/// Prints the health report after startup, including cache contents.
pub async fn execute(settings: Settings, skip_warm_up: bool) -> anyhow::Result<()> {
    let service = start_service(settings, skip_warm_up).await?;
    let health = service.health();
    service.shutdown().await;

    print_json(&health)
}

//! Foreground service command.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use vecta_core::Settings;

use super::start_service;

/// Execute the run command.
///
/// Starts the service, logs health every `health_interval` seconds and
/// shuts down on Ctrl-C.
pub async fn execute(
    settings: Settings,
    skip_warm_up: bool,
    health_interval: u64,
) -> anyhow::Result<()> {
    let service = start_service(settings, skip_warm_up).await?;
    info!(models = ?service.models().cached_models, "Vecta service running, press Ctrl-C to stop");

    let period = Duration::from_secs(health_interval.max(1));
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                if let Err(e) = signal {
                    warn!(error = %e, "Failed to listen for Ctrl-C, shutting down");
                }
                break;
            }
            _ = ticker.tick() => {
                let health = service.health();
                info!(
                    status = %health.status,
                    cached = health.cache.num_cached,
                    hits = health.cache.stats.total_hits,
                    misses = health.cache.stats.total_misses,
                    uptime_secs = health.uptime_seconds,
                    "Health check"
                );
            }
        }
    }

    service.shutdown().await;
    info!("Vecta service stopped");
    Ok(())
}

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::orchestrator::Scanner;

/// Fixed-interval driver for the scan loop. Fires one tick immediately,
/// then every `poll_interval`. Overlap is prevented by the scanner's
/// single-flight guard; teardown lets an in-flight tick finish its
/// current chunk rather than interrupting it.
pub async fn run_scan_scheduler(
    scanner: Arc<Scanner>,
    poll_interval: Duration,
    shutdown: CancellationToken,
) {
    tracing::info!(
        poll_interval_ms = poll_interval.as_millis() as u64,
        "starting scan scheduler"
    );

    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("scan scheduler shutting down");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = scanner.tick().await {
                    tracing::error!(error = %e, "scan tick failed");
                }
            }
        }
    }
}

//! Periodic redelivery of tasks abandoned by lost workers.

use std::sync::Arc;
use std::time::Duration;

use imagepp_queue::TaskQueue;
use tokio_util::sync::CancellationToken;

/// Run the stale-task sweep every `interval` until `cancel` is triggered.
pub async fn run(queue: Arc<dyn TaskQueue>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = interval.as_secs(), "Stale task recovery started");

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Stale task recovery stopping");
                break;
            }
            _ = ticker.tick() => {
                match queue.recover_stale().await {
                    Ok(0) => tracing::debug!("Stale task recovery: nothing to recover"),
                    Ok(recovered) => tracing::warn!(recovered, "Stale task recovery: redelivering abandoned tasks"),
                    Err(e) => tracing::error!(error = %e, "Stale task recovery failed"),
                }
            }
        }
    }
}

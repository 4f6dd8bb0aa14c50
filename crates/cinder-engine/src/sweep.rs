use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::PasteService;

/// Background task that removes expired pastes.
///
/// Runs on an interval and deletes every paste past its `expires_at`,
/// plus burn-after-read leftovers whose post-read deletion failed.
/// Lazy expiry on access covers the time between ticks.
pub async fn run_sweep_loop(service: Arc<PasteService>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        interval.tick().await;

        match sweep_once(service.clone()).await {
            Ok(count) => debug!("Sweep pass removed {} pastes", count),
            Err(e) => warn!("Sweep error: {}", e),
        }
    }
}

/// One sweep pass off the async runtime.
pub async fn sweep_once(service: Arc<PasteService>) -> anyhow::Result<usize> {
    let count = tokio::task::spawn_blocking(move || service.sweep_expired()).await??;
    Ok(count)
}

//! Background removal of expired session directories.

use std::sync::Arc;
use std::time::Duration;

use reimagine_core::Staging;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Sweep `staging` every minute, or once per `retention` when that is
/// shorter, removing session directories older than `retention`.
pub fn spawn_sweeper(staging: Arc<Staging>, retention: Duration) -> JoinHandle<()> {
    let period = retention.min(MAX_SWEEP_INTERVAL);
    info!(retention_secs = retention.as_secs(), "session retention enabled");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match staging.sweep(retention).await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "expired sessions removed"),
                Err(e) => warn!(root = %staging.root().display(), error = %e, "retention sweep failed"),
            }
        }
    })
}

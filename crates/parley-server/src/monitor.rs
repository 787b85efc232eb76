//! Inactivity monitor: periodically ages out idle users.
//!
//! Purely interval-based — a user crossing the idle timeout is marked
//! INACTIVE within one sweep interval, not instantly.

use crate::registry::UserRegistry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Spawn the sweep task. Exits when the shutdown watch flips.
pub fn spawn(
    users: Arc<UserRegistry>,
    sweep_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {
                    for username in users.check_inactive(Instant::now()).await {
                        info!(username = %username, "user marked inactive");
                    }
                }
            }
        }
        debug!("inactivity monitor stopped");
    })
}

//! Background reclamation of abandoned sessions

use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::session_store::SessionStore;

/// Spawns a task that sweeps stale sessions every `interval`.
///
/// The task runs until the returned handle is aborted or the runtime shuts
/// down. Missed ticks are skipped rather than replayed in a burst.
pub fn spawn_session_sweeper(store: SessionStore, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = store.sweep_stale(Utc::now()).await;
            if removed > 0 {
                info!("Session sweeper reclaimed {} stale sessions", removed);
            } else {
                debug!("Session sweeper found no stale sessions");
            }
        }
    })
}

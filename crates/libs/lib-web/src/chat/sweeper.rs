//! # Cleanup Sweeper
//!
//! Expires stale chat requests on a fixed interval. It only ever touches the
//! broker; sessions and presence are cleaned up by the events that end them.

use super::clock::Clock;
use super::requests::ChatRequestBroker;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Run one sweep now. Returns how many requests expired.
pub async fn sweep_once(broker: &ChatRequestBroker, clock: &dyn Clock) -> usize {
    let removed = broker.sweep(clock.now()).await;
    if removed > 0 {
        debug!(removed, "[SWEEP] Expired {} chat request(s)", removed);
    }
    removed
}

/// Spawn the sweep loop. Abort the returned handle to stop it.
pub fn spawn_sweeper(broker: Arc<ChatRequestBroker>, clock: Arc<dyn Clock>, interval: Duration) -> JoinHandle<()> {
    info!(interval_secs = interval.as_secs(), "[SWEEP] Starting request sweeper");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            sweep_once(&broker, clock.as_ref()).await;
        }
    })
}

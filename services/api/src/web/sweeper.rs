//! services/api/src/web/sweeper.rs
//!
//! Background task that cancels conversations abandoned mid-fill.

use chrono::Utc;
use nettable_core::registry::SessionRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Runs `sweep_expired` every `every` until `shutdown` is cancelled.
pub fn spawn_session_sweeper(
    registry: Arc<SessionRegistry>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Session sweeper started, running every {:?}.", every);
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Session sweeper stopped.");
                    break;
                }
                _ = ticker.tick() => {
                    let expired = registry.sweep_expired(Utc::now()).await;
                    for user_id in &expired {
                        info!(%user_id, "Abandoned fill cancelled after inactivity");
                    }
                    debug!(timed_out = expired.len(), "Sweep tick done");
                }
            }
        }
    })
}

use std::{sync::Arc, time::Duration};

use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info};

use crate::services::jobs::{JobTracker, current_timestamp_ms};

/// Schedule for evicting finished requests nobody collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweeperConfig {
    pub retention: Duration,
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(3600),
            interval: Duration::from_secs(60),
        }
    }
}

/// One sweep: evicts terminal records older than `retention`.
pub fn sweep_once(tracker: &JobTracker, retention: Duration) -> Vec<String> {
    let retention_ms = i64::try_from(retention.as_millis()).unwrap_or(i64::MAX);
    let cutoff_ms = current_timestamp_ms().saturating_sub(retention_ms);
    let evicted = tracker.evict_finished_before(cutoff_ms);
    for request_id in &evicted {
        info!(%request_id, "evicted unclaimed request");
    }
    evicted
}

/// Runs [`sweep_once`] every `config.interval` until `stop` flips to `true`
/// or its sender is dropped.
pub fn spawn_sweeper(
    tracker: Arc<JobTracker>,
    config: SweeperConfig,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    debug_assert!(!config.interval.is_zero());
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = sweep_once(&tracker, config.retention);
                    debug!(evicted = evicted.len(), remaining = tracker.len(), "sweep finished");
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        debug!("sweeper stopping");
                        break;
                    }
                }
            }
        }
    })
}

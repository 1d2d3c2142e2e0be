//! Background eviction of stale tracker entries.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::tracker::FloodTable;

/// Sweep period used when none is configured.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Entries whose episode started longer ago than this are evicted.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

/// Evicts tracker entries older than the retention ceiling.
///
/// Shares nothing with the tracker but the [`FloodTable`].
pub struct FloodReaper {
    table: FloodTable,
    interval: Duration,
    retention: chrono::Duration,
}

impl FloodReaper {
    pub fn new(table: FloodTable, interval: Duration, retention: Duration) -> Self {
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        Self {
            table,
            interval,
            retention,
        }
    }

    /// Remove every entry with `window_start < now - retention`.
    ///
    /// Returns how many entries were removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = now.checked_sub_signed(self.retention) else {
            return 0;
        };

        let mut table = self.table.lock();
        let before = table.len();
        table.retain(|_, entry| entry.window_start >= cutoff);
        before - table.len()
    }

    /// Start sweeping on a background task.
    ///
    /// The first sweep runs one interval after start. Stop the task with
    /// [`ReaperHandle::stop`].
    pub fn spawn(self) -> ReaperHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        info!(
            interval_secs = self.interval.as_secs(),
            retention_secs = self.retention.num_seconds(),
            "Flood reaper started"
        );

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.sweep(Utc::now());
                        if removed > 0 {
                            debug!(removed, "Evicted stale flood tracker entries");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Flood reaper stopped");
        });

        ReaperHandle { shutdown, task }
    }
}

/// Owner handle of a running reaper task.
pub struct ReaperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Signal the task to stop and wait for it to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("Flood reaper task ended abnormally: {}", e);
        }
    }
}

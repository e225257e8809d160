//! Retention manager for cleaning up old check history.

use crate::db::{HistoryStore, Store};

use chrono::{DateTime, Duration as ChronoDuration, Local, TimeZone, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default age after which check records are deleted.
pub const DEFAULT_RETENTION_DAYS: i64 = 365;

/// Deletes check history past the retention horizon once a day, at local
/// midnight.
pub struct RetentionManager {
    store: Arc<Store>,
    horizon: ChronoDuration,
    stop: broadcast::Sender<()>,
}

impl RetentionManager {
    pub fn new(store: Arc<Store>, retention_days: i64) -> Self {
        let (stop, _) = broadcast::channel(1);
        Self {
            store,
            horizon: ChronoDuration::days(retention_days),
            stop,
        }
    }

    /// Start the retention manager background task.
    pub fn start(&self) {
        let store = self.store.clone();
        let horizon = self.horizon;
        let mut stop_rx = self.stop.subscribe();

        tokio::spawn(async move {
            loop {
                let now = Local::now();
                let next = next_midnight(&now);
                let wait = (next.clone() - now).to_std().unwrap_or_default();
                tracing::info!(
                    "Retention: Next cleanup at {} (in {:?})",
                    next.format("%Y-%m-%d %H:%M:%S"),
                    wait
                );

                tokio::select! {
                    _ = stop_rx.recv() => break,
                    _ = tokio::time::sleep(wait) => {
                        purge_expired(store.as_ref(), horizon, Utc::now());
                    }
                }
            }
        });
    }

    /// Stop the retention manager.
    pub fn stop(&self) {
        let _ = self.stop.send(());
    }
}

/// Delete every check record older than `now - horizon`.
///
/// Failures are logged; the next daily run tries again.
pub fn purge_expired(
    history: &dyn HistoryStore,
    horizon: ChronoDuration,
    now: DateTime<Utc>,
) -> Option<usize> {
    let cutoff = now - horizon;
    tracing::info!(
        "Retention: Deleting check history older than {}",
        cutoff.format("%Y-%m-%d %H:%M:%S")
    );

    match history.delete_older_than(cutoff) {
        Ok(deleted) => {
            tracing::info!("Retention: Deleted {} check history records", deleted);
            Some(deleted)
        }
        Err(e) => {
            tracing::error!("Retention: Failed to clean old check history: {}", e);
            None
        }
    }
}

/// The first midnight strictly after `now` in its own time zone.
///
/// Falls back to 24 hours later when that midnight does not exist locally.
pub fn next_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    now.date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .and_then(|midnight| now.timezone().from_local_datetime(&midnight).earliest())
        .unwrap_or_else(|| now.clone() + ChronoDuration::hours(24))
}

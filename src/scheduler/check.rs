//! Applying a probe result to a monitor.

use crate::db::{CheckRecord, DbError, HistoryStore, Monitor, MonitorView, Store};
use crate::live::{Broadcaster, Debouncer, LiveUpdate};
use crate::probe::{ProbeOutcome, Prober};
use crate::stats::monitor_uptime;

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Runs one probe for a monitor and records everything it produces.
pub struct Checker {
    store: Arc<Store>,
    prober: Prober,
    broadcaster: Broadcaster,
    debouncer: Arc<Debouncer>,
}

impl Checker {
    pub fn new(
        store: Arc<Store>,
        prober: Prober,
        broadcaster: Broadcaster,
        debouncer: Arc<Debouncer>,
    ) -> Self {
        Self {
            store,
            prober,
            broadcaster,
            debouncer,
        }
    }

    /// Probe a monitor, append the check record, refresh its live fields,
    /// publish the updated monitor and signal the debouncer.
    ///
    /// Store failures abandon the result for this cycle and are returned so
    /// the caller can count them.
    pub async fn check(&self, monitor: &Monitor) -> Result<Monitor, DbError> {
        let outcome = self.prober.probe(&monitor.url).await;
        let checked_at = Utc::now();

        let updated = match self.apply(monitor.id, outcome, checked_at) {
            Ok(m) => m,
            Err(e) => {
                tracing::error!("Scheduler: Failed to record probe for {}: {}", monitor.name, e);
                return Err(e);
            }
        };

        tracing::debug!(
            "Scheduler: {} is {} ({}ms, uptime {:.2}%)",
            updated.name,
            updated.status,
            updated.response_time,
            updated.uptime
        );

        self.broadcaster
            .publish(&LiveUpdate::MonitorUpdate(MonitorView::new(updated.clone(), checked_at)));
        self.debouncer.trigger();

        Ok(updated)
    }

    fn apply(
        &self,
        monitor_id: i64,
        outcome: ProbeOutcome,
        checked_at: DateTime<Utc>,
    ) -> Result<Monitor, DbError> {
        self.store.append(&CheckRecord {
            monitor_id,
            status: outcome.status,
            response_time: outcome.response_time,
            created_at: checked_at,
        })?;

        let uptime = monitor_uptime(self.store.as_ref(), monitor_id, outcome.status, checked_at)?;
        self.store
            .record_probe(monitor_id, outcome.status, outcome.response_time, uptime, checked_at)?;

        self.store.get_monitor(monitor_id)
    }
}

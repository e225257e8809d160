//! Append-only probe history contract.

use chrono::{DateTime, Utc};

use super::models::{CheckRecord, MonitorStatus};
use super::store::DbError;

/// Records shown on a monitor's response time chart.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Ledger of past probe results.
///
/// A read issued after a write returns must observe that write; the stats
/// aggregator relies on this when it recomputes right after a probe.
pub trait HistoryStore: Send + Sync {
    /// Append one record.
    fn append(&self, record: &CheckRecord) -> Result<(), DbError>;

    /// Count records for a monitor strictly newer than `since`, optionally
    /// restricted to one status.
    fn count(
        &self,
        monitor_id: i64,
        since: DateTime<Utc>,
        status: Option<MonitorStatus>,
    ) -> Result<i64, DbError>;

    /// Mean response time across all monitors for records newer than `since`
    /// with a positive response time. `None` when no record matches.
    fn average_response_time(&self, since: DateTime<Utc>) -> Result<Option<f64>, DbError>;

    /// Newest `limit` records for a monitor, newest first.
    fn most_recent(&self, monitor_id: i64, limit: usize) -> Result<Vec<CheckRecord>, DbError>;

    /// Delete every record older than `cutoff` and return how many went.
    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, DbError>;
}

/// Newest `limit` records for a monitor in chronological order, for the
/// response time chart.
pub fn response_history(
    history: &dyn HistoryStore,
    monitor_id: i64,
    limit: usize,
) -> Result<Vec<CheckRecord>, DbError> {
    let mut records = history.most_recent(monitor_id, limit)?;
    records.reverse();
    Ok(records)
}

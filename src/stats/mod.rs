//! Health statistics.
//!
//! Per-monitor uptime is always derived from the monitor's own trailing
//! 24 hour window of check records. The overall snapshot averages those
//! per-monitor values and never keeps a counter of its own.

use crate::db::{DbError, HistoryStore, Monitor, MonitorStatus, Store};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Length of the window that uptime and average latency are computed over.
pub const STATS_WINDOW_HOURS: i64 = 24;

fn window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - ChronoDuration::hours(STATS_WINDOW_HOURS)
}

/// Point-in-time aggregate of overall health. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub overall_uptime: f64,
    pub services_up: usize,
    pub services_down: usize,
    /// Milliseconds, truncated.
    pub avg_response_time: i64,
}

/// Uptime percentage of one monitor over the trailing window.
///
/// With no records in the window the current status decides: 100 when up,
/// 0 otherwise.
pub fn monitor_uptime(
    history: &dyn HistoryStore,
    monitor_id: i64,
    current: MonitorStatus,
    now: DateTime<Utc>,
) -> Result<f64, DbError> {
    let since = window_start(now);
    let total = history.count(monitor_id, since, None)?;

    if total == 0 {
        return Ok(if current.is_up() { 100.0 } else { 0.0 });
    }

    let up = history.count(monitor_id, since, Some(MonitorStatus::Up))?;
    Ok(up as f64 / total as f64 * 100.0)
}

/// Compute a snapshot from the current monitors and recent history.
///
/// Paused monitors are left out of every figure. Anything not `up` counts as
/// down. The average response time prefers the history over the window and
/// falls back to the monitors' live latencies, then to zero.
pub fn compute_snapshot(
    monitors: &[Monitor],
    history: &dyn HistoryStore,
    now: DateTime<Utc>,
) -> StatsSnapshot {
    let active: Vec<&Monitor> = monitors.iter().filter(|m| !m.paused).collect();

    let services_up = active.iter().filter(|m| m.status.is_up()).count();
    let services_down = active.len() - services_up;

    let overall_uptime = if active.is_empty() {
        0.0
    } else {
        active.iter().map(|m| m.uptime).sum::<f64>() / active.len() as f64
    };

    let mut avg_response_time = match history.average_response_time(window_start(now)) {
        Ok(Some(avg)) => avg as i64,
        Ok(None) => 0,
        Err(e) => {
            tracing::warn!("Stats: Failed to average response times from history: {}", e);
            0
        }
    };

    if avg_response_time == 0 {
        let live: Vec<i64> = active
            .iter()
            .map(|m| m.response_time)
            .filter(|&rt| rt > 0)
            .collect();
        if !live.is_empty() {
            avg_response_time = live.iter().sum::<i64>() / live.len() as i64;
            tracing::debug!(
                "Stats: Using live latency of {} monitors for average response time",
                live.len()
            );
        }
    }

    StatsSnapshot {
        overall_uptime,
        services_up,
        services_down,
        avg_response_time,
    }
}

/// Something that can produce a fresh snapshot on demand.
pub trait SnapshotSource: Send + Sync {
    fn snapshot(&self) -> Result<StatsSnapshot, DbError>;
}

/// Computes snapshots from the store.
pub struct StatsAggregator {
    store: Arc<Store>,
}

impl StatsAggregator {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

impl SnapshotSource for StatsAggregator {
    fn snapshot(&self) -> Result<StatsSnapshot, DbError> {
        let monitors = self.store.list_monitors()?;
        Ok(compute_snapshot(&monitors, self.store.as_ref(), Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CheckRecord, NewMonitor};
    use tempfile::NamedTempFile;

    /// History stub with a fixed average and no records.
    struct FixedAverage(Result<Option<f64>, ()>);

    impl HistoryStore for FixedAverage {
        fn append(&self, _record: &CheckRecord) -> Result<(), DbError> {
            Ok(())
        }

        fn count(
            &self,
            _id: i64,
            _since: DateTime<Utc>,
            _status: Option<MonitorStatus>,
        ) -> Result<i64, DbError> {
            Ok(0)
        }

        fn average_response_time(&self, _since: DateTime<Utc>) -> Result<Option<f64>, DbError> {
            self.0.map_err(|_| DbError::LockPoisoned)
        }

        fn most_recent(&self, _id: i64, _limit: usize) -> Result<Vec<CheckRecord>, DbError> {
            Ok(vec![])
        }

        fn delete_older_than(&self, _cutoff: DateTime<Utc>) -> Result<usize, DbError> {
            Ok(0)
        }
    }

    fn monitor(id: i64, status: MonitorStatus, uptime: f64, response_time: i64) -> Monitor {
        Monitor {
            id,
            name: format!("m{}", id),
            url: format!("https://m{}.example.com", id),
            status,
            uptime,
            response_time,
            ..Default::default()
        }
    }

    fn store_with_monitor() -> (NamedTempFile, Store, i64) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let m = store
            .create_monitor(&NewMonitor {
                name: "svc".to_string(),
                url: "https://svc.example.com".to_string(),
                ..Default::default()
            })
            .unwrap();
        (tmp, store, m.id)
    }

    fn append_checks(store: &Store, id: i64, statuses: &[MonitorStatus], now: DateTime<Utc>) {
        for (i, status) in statuses.iter().enumerate() {
            store
                .append(&CheckRecord {
                    monitor_id: id,
                    status: *status,
                    response_time: if status.is_up() { 50 } else { 0 },
                    created_at: now - ChronoDuration::minutes(i as i64 + 1),
                })
                .unwrap();
        }
    }

    #[test]
    fn test_uptime_all_up_is_100() {
        let (_tmp, store, id) = store_with_monitor();
        let now = Utc::now();
        append_checks(&store, id, &[MonitorStatus::Up; 10], now);

        assert_eq!(monitor_uptime(&store, id, MonitorStatus::Down, now).unwrap(), 100.0);
    }

    #[test]
    fn test_uptime_all_down_is_0() {
        let (_tmp, store, id) = store_with_monitor();
        let now = Utc::now();
        append_checks(&store, id, &[MonitorStatus::Down; 10], now);

        assert_eq!(monitor_uptime(&store, id, MonitorStatus::Up, now).unwrap(), 0.0);
    }

    #[test]
    fn test_uptime_mixed() {
        let (_tmp, store, id) = store_with_monitor();
        let now = Utc::now();
        append_checks(
            &store,
            id,
            &[MonitorStatus::Up, MonitorStatus::Down, MonitorStatus::Up, MonitorStatus::Up],
            now,
        );

        assert_eq!(monitor_uptime(&store, id, MonitorStatus::Up, now).unwrap(), 75.0);
    }

    #[test]
    fn test_uptime_without_records_follows_current_status() {
        let (_tmp, store, id) = store_with_monitor();
        let now = Utc::now();

        // A record outside the window does not count
        store
            .append(&CheckRecord {
                monitor_id: id,
                status: MonitorStatus::Down,
                response_time: 0,
                created_at: now - ChronoDuration::hours(25),
            })
            .unwrap();

        assert_eq!(monitor_uptime(&store, id, MonitorStatus::Up, now).unwrap(), 100.0);
        assert_eq!(monitor_uptime(&store, id, MonitorStatus::Down, now).unwrap(), 0.0);
        assert_eq!(monitor_uptime(&store, id, MonitorStatus::Unknown, now).unwrap(), 0.0);
    }

    #[test]
    fn test_snapshot_counts_and_monitor_weighted_uptime() {
        let monitors = vec![
            monitor(1, MonitorStatus::Up, 100.0, 0),
            monitor(2, MonitorStatus::Up, 50.0, 0),
            monitor(3, MonitorStatus::Down, 0.0, 0),
        ];
        let snapshot = compute_snapshot(&monitors, &FixedAverage(Ok(Some(120.0))), Utc::now());

        assert_eq!(snapshot.overall_uptime, 50.0);
        assert_eq!(snapshot.services_up, 2);
        assert_eq!(snapshot.services_down, 1);
        assert_eq!(snapshot.avg_response_time, 120);
    }

    #[test]
    fn test_snapshot_excludes_paused_monitors() {
        let mut paused = monitor(4, MonitorStatus::Down, 0.0, 900);
        paused.paused = true;
        let monitors = vec![monitor(1, MonitorStatus::Up, 100.0, 100), paused];

        let snapshot = compute_snapshot(&monitors, &FixedAverage(Ok(None)), Utc::now());
        assert_eq!(snapshot.overall_uptime, 100.0);
        assert_eq!(snapshot.services_up, 1);
        assert_eq!(snapshot.services_down, 0);
        assert_eq!(snapshot.avg_response_time, 100);
    }

    #[test]
    fn test_unknown_status_counts_as_down() {
        let monitors = vec![monitor(1, MonitorStatus::Unknown, 0.0, 0)];
        let snapshot = compute_snapshot(&monitors, &FixedAverage(Ok(None)), Utc::now());
        assert_eq!(snapshot.services_up, 0);
        assert_eq!(snapshot.services_down, 1);
    }

    #[test]
    fn test_avg_response_time_falls_back_to_live_latency() {
        let monitors = vec![
            monitor(1, MonitorStatus::Up, 100.0, 100),
            monitor(2, MonitorStatus::Up, 100.0, 251),
            monitor(3, MonitorStatus::Down, 0.0, 0),
        ];

        // No history in the window
        let snapshot = compute_snapshot(&monitors, &FixedAverage(Ok(None)), Utc::now());
        assert_eq!(snapshot.avg_response_time, 175);

        // History read failure degrades the same way
        let snapshot = compute_snapshot(&monitors, &FixedAverage(Err(())), Utc::now());
        assert_eq!(snapshot.avg_response_time, 175);
    }

    #[test]
    fn test_avg_response_time_zero_when_nothing_known() {
        let monitors = vec![monitor(1, MonitorStatus::Down, 0.0, 0)];
        let snapshot = compute_snapshot(&monitors, &FixedAverage(Ok(None)), Utc::now());
        assert_eq!(snapshot.avg_response_time, 0);
    }

    #[test]
    fn test_empty_monitor_set() {
        let snapshot = compute_snapshot(&[], &FixedAverage(Ok(None)), Utc::now());
        assert_eq!(snapshot, StatsSnapshot::default());
    }

    #[test]
    fn test_aggregator_reads_store() {
        let (_tmp, store, id) = store_with_monitor();
        let now = Utc::now();
        append_checks(&store, id, &[MonitorStatus::Up, MonitorStatus::Up], now);
        store.record_probe(id, MonitorStatus::Up, 50, 100.0, now).unwrap();

        let aggregator = StatsAggregator::new(Arc::new(store));
        let snapshot = aggregator.snapshot().unwrap();
        assert_eq!(snapshot.services_up, 1);
        assert_eq!(snapshot.overall_uptime, 100.0);
        assert_eq!(snapshot.avg_response_time, 50);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let snapshot = StatsSnapshot {
            overall_uptime: 99.5,
            services_up: 3,
            services_down: 1,
            avg_response_time: 42,
        };
        let json = serde_json::to_value(snapshot).unwrap();
        assert_eq!(json["overallUptime"], 99.5);
        assert_eq!(json["servicesUp"], 3);
        assert_eq!(json["servicesDown"], 1);
        assert_eq!(json["avgResponseTime"], 42);
    }
}

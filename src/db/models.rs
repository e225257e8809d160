//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default probe interval for new monitors, in seconds.
pub const DEFAULT_CHECK_INTERVAL: i64 = 60;

/// Last known state of a monitored target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Up,
    Down,
    #[default]
    Unknown,
}

impl MonitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Up => "up",
            MonitorStatus::Down => "down",
            MonitorStatus::Unknown => "unknown",
        }
    }

    /// Parse a stored status. Anything unrecognised reads back as `Unknown`.
    pub fn from_db(s: &str) -> Self {
        match s {
            "up" => MonitorStatus::Up,
            "down" => MonitorStatus::Down,
            _ => MonitorStatus::Unknown,
        }
    }

    pub fn is_up(&self) -> bool {
        matches!(self, MonitorStatus::Up)
    }
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A watched target together with its live fields.
///
/// The live fields (`status`, `response_time`, `last_check`, `uptime`) are only
/// written by the probe pipeline through [`crate::db::Store::record_probe`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Monitor {
    pub id: i64,
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon: String,
    /// Seconds between probes. Stored and reported, but the scheduler runs a
    /// single global sweep so this is advisory.
    pub check_interval: i64,
    pub is_third_party: bool,
    pub paused: bool,
    pub status: MonitorStatus,
    /// Latency of the last probe in milliseconds, 0 when it was down.
    pub response_time: i64,
    /// Percentage of `up` checks over the trailing 24 hours.
    pub uptime: f64,
    pub last_check: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Monitor {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: String::new(),
            url: String::new(),
            icon: String::new(),
            check_interval: DEFAULT_CHECK_INTERVAL,
            is_third_party: false,
            paused: false,
            status: MonitorStatus::Unknown,
            response_time: 0,
            uptime: 0.0,
            last_check: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Attributes supplied when a monitor is created.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMonitor {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub check_interval: i64,
    #[serde(default)]
    pub is_third_party: bool,
    #[serde(default)]
    pub paused: bool,
}

/// User-editable attributes. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorChanges {
    pub name: Option<String>,
    pub url: Option<String>,
    pub icon: Option<String>,
    pub check_interval: Option<i64>,
    pub is_third_party: Option<bool>,
    pub paused: Option<bool>,
}

/// One probe's outcome, appended to the history and never updated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRecord {
    pub monitor_id: i64,
    pub status: MonitorStatus,
    /// Milliseconds, 0 for a `down` probe.
    pub response_time: i64,
    pub created_at: DateTime<Utc>,
}

/// A monitor as shown to dashboards, with the last-check age pre-rendered.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorView {
    #[serde(flatten)]
    pub monitor: Monitor,
    pub last_check_label: String,
}

impl MonitorView {
    pub fn new(monitor: Monitor, now: DateTime<Utc>) -> Self {
        let label = last_check_label(monitor.last_check, now);
        Self {
            monitor,
            last_check_label: label,
        }
    }
}

/// Human readable age of the last probe, as shown on the dashboard.
pub fn last_check_label(last_check: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(at) = last_check else {
        return "never".to_string();
    };

    let minutes = (now - at).num_minutes();
    if minutes < 1 {
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else {
        format!("{}h ago", minutes / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_status_round_trip_through_db_text() {
        for status in [MonitorStatus::Up, MonitorStatus::Down, MonitorStatus::Unknown] {
            assert_eq!(MonitorStatus::from_db(status.as_str()), status);
        }
        assert_eq!(MonitorStatus::from_db("degraded"), MonitorStatus::Unknown);
    }

    #[test]
    fn test_last_check_label() {
        let now = Utc::now();
        assert_eq!(last_check_label(None, now), "never");
        assert_eq!(last_check_label(Some(now - Duration::seconds(20)), now), "just now");
        assert_eq!(last_check_label(Some(now - Duration::minutes(5)), now), "5m ago");
        assert_eq!(last_check_label(Some(now - Duration::minutes(150)), now), "2h ago");
    }

    #[test]
    fn test_monitor_serializes_camel_case() {
        let monitor = Monitor {
            id: 3,
            name: "API".to_string(),
            url: "https://api.example.com".to_string(),
            status: MonitorStatus::Up,
            ..Default::default()
        };
        let json = serde_json::to_value(&monitor).unwrap();
        assert_eq!(json["status"], "up");
        assert_eq!(json["checkInterval"], 60);
        assert_eq!(json["isThirdParty"], false);
        assert!(json.get("icon").is_none());
    }
}

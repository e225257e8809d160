//! Live updates pushed to connected observers.
//!
//! Every message is a JSON envelope `{"type": ..., "data": ...}`.

mod broadcast;
mod debounce;

pub use broadcast::*;
pub use debounce::*;

use crate::db::MonitorView;
use crate::stats::StatsSnapshot;

use serde::Serialize;

/// A message for observers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LiveUpdate {
    StatsUpdate(StatsSnapshot),
    MonitorUpdate(MonitorView),
    MonitorDeleted { id: i64 },
}

impl LiveUpdate {
    pub fn kind(&self) -> &'static str {
        match self {
            LiveUpdate::StatsUpdate(_) => "stats_update",
            LiveUpdate::MonitorUpdate(_) => "monitor_update",
            LiveUpdate::MonitorDeleted { .. } => "monitor_deleted",
        }
    }
}

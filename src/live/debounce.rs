//! Debounced stats publication.
//!
//! Triggers move the debouncer from `Idle` to `Pending(deadline)`; every
//! further trigger pushes the deadline to `last trigger + window`. When the
//! deadline passes a fresh snapshot is computed and published if it differs
//! from the last one published, and the state returns to `Idle`.
//!
//! A single driver task owns the state machine, so publications are issued
//! strictly in order.

use super::{Broadcaster, LiveUpdate};
use crate::stats::{SnapshotSource, StatsSnapshot};

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

/// Default quiescence window.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Pending(Instant),
}

/// Coalesces "something changed" signals into one recompute-and-publish.
pub struct Debouncer {
    triggers: watch::Sender<Option<Instant>>,
    last_published: Arc<Mutex<Option<StatsSnapshot>>>,
    stop: broadcast::Sender<()>,
}

impl Debouncer {
    /// Create the debouncer and spawn its driver task.
    pub fn start(
        window: Duration,
        source: Arc<dyn SnapshotSource>,
        broadcaster: Broadcaster,
    ) -> Self {
        let (triggers, trigger_rx) = watch::channel(None);
        let (stop, stop_rx) = broadcast::channel(1);
        let last_published = Arc::new(Mutex::new(None));

        let driver = Driver {
            window,
            source,
            broadcaster,
            last_published: last_published.clone(),
        };
        tokio::spawn(driver.run(trigger_rx, stop_rx));

        Self {
            triggers,
            last_published,
            stop,
        }
    }

    /// Signal a change. Never blocks.
    pub fn trigger(&self) {
        self.triggers.send_replace(Some(Instant::now()));
    }

    /// The snapshot most recently handed to the broadcaster.
    pub fn last_published(&self) -> Option<StatsSnapshot> {
        *self.last_published.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop the driver. A pending publication is discarded.
    pub fn stop(&self) {
        let _ = self.stop.send(());
    }
}

struct Driver {
    window: Duration,
    source: Arc<dyn SnapshotSource>,
    broadcaster: Broadcaster,
    last_published: Arc<Mutex<Option<StatsSnapshot>>>,
}

impl Driver {
    async fn run(
        self,
        mut triggers: watch::Receiver<Option<Instant>>,
        mut stop: broadcast::Receiver<()>,
    ) {
        let mut phase = Phase::Idle;

        loop {
            phase = match phase {
                Phase::Idle => tokio::select! {
                    _ = stop.recv() => break,
                    changed = triggers.changed() => match changed {
                        Ok(()) => Phase::Pending(self.deadline(&mut triggers)),
                        Err(_) => break,
                    },
                },
                Phase::Pending(deadline) => tokio::select! {
                    _ = stop.recv() => break,
                    changed = triggers.changed() => match changed {
                        Ok(()) => Phase::Pending(self.deadline(&mut triggers)),
                        Err(_) => break,
                    },
                    _ = tokio::time::sleep_until(deadline) => {
                        self.fire();
                        Phase::Idle
                    }
                },
            };
        }

        tracing::debug!("Debouncer: Stopped");
    }

    fn deadline(&self, triggers: &mut watch::Receiver<Option<Instant>>) -> Instant {
        let last = *triggers.borrow_and_update();
        last.unwrap_or_else(Instant::now) + self.window
    }

    fn fire(&self) {
        let snapshot = match self.source.snapshot() {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Debouncer: Failed to compute stats, skipping publication: {}", e);
                return;
            }
        };

        {
            let mut last = self.last_published.lock().unwrap_or_else(PoisonError::into_inner);
            if last.as_ref() == Some(&snapshot) {
                tracing::debug!("Debouncer: Stats unchanged, skipping broadcast");
                return;
            }

            let old = last.unwrap_or_default();
            tracing::info!(
                "Debouncer: Stats changed (uptime: {:.2}% -> {:.2}%, up: {} -> {}, down: {} -> {}, \
                 avg: {}ms -> {}ms)",
                old.overall_uptime,
                snapshot.overall_uptime,
                old.services_up,
                snapshot.services_up,
                old.services_down,
                snapshot.services_down,
                old.avg_response_time,
                snapshot.avg_response_time
            );
            *last = Some(snapshot);
        }

        self.broadcaster.publish(&LiveUpdate::StatsUpdate(snapshot));
    }
}

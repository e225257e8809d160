//! Scheduler module for running probes and maintaining history.
//!
//! A single global tick drives sweeps. Each sweep probes every monitor one
//! after another with a short pause in between, so outbound requests stay
//! spread out and a sweep takes roughly `monitors * (probe time + delay)`.
//! Per-monitor check intervals are not honoured by this tick.
//!
//! Probes requested out of band (a newly created monitor) go through a
//! separate queue worker. They can overlap a sweep probing the same monitor;
//! whichever finishes last owns the live fields.

mod check;
mod retention;

pub use check::*;
pub use retention::*;

use crate::db::{DbError, Store};

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// Default cadence of full sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default pause between two probes inside a sweep.
pub const DEFAULT_PROBE_DELAY: Duration = Duration::from_millis(500);

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub up: usize,
    pub down: usize,
    pub failed: usize,
}

/// The main scheduler that orchestrates probe execution.
pub struct Scheduler {
    store: Arc<Store>,
    checker: Arc<Checker>,
    sweep_interval: Duration,
    probe_delay: Duration,
    queue_tx: mpsc::UnboundedSender<i64>,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<i64>>>,
    stop: broadcast::Sender<()>,
}

impl Scheduler {
    pub fn new(
        store: Arc<Store>,
        checker: Arc<Checker>,
        sweep_interval: Duration,
        probe_delay: Duration,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (stop, _) = broadcast::channel(1);

        Self {
            store,
            checker,
            sweep_interval,
            probe_delay,
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            stop,
        }
    }

    /// Start the sweep loop (first sweep runs immediately) and the
    /// on-demand probe worker.
    pub fn start(&self) {
        let queue_rx = self.queue_rx.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(queue_rx) = queue_rx else {
            tracing::warn!("Scheduler: Already started");
            return;
        };

        tracing::info!(
            "Scheduler: Starting, sweeping every {:?} with {:?} between probes",
            self.sweep_interval,
            self.probe_delay
        );

        tokio::spawn(run_sweep_loop(
            self.store.clone(),
            self.checker.clone(),
            self.sweep_interval,
            self.probe_delay,
            self.stop.subscribe(),
        ));
        tokio::spawn(run_probe_queue(
            self.store.clone(),
            self.checker.clone(),
            queue_rx,
            self.stop.subscribe(),
        ));
    }

    /// Queue an immediate probe for a monitor, outside the sweep cycle.
    /// Returns without waiting for the probe.
    pub fn submit(&self, monitor_id: i64) {
        if self.queue_tx.send(monitor_id).is_err() {
            tracing::error!(
                "Scheduler: Probe queue closed, dropping probe for monitor {}",
                monitor_id
            );
        }
    }

    /// Stop sweeping and drain no further queued probes.
    pub fn stop(&self) {
        let _ = self.stop.send(());
        tracing::info!("Scheduler: Stopped");
    }
}

/// Probe every monitor once, one at a time.
///
/// A failure for one monitor never aborts the rest of the sweep.
pub async fn run_sweep(store: &Store, checker: &Checker, probe_delay: Duration) -> SweepSummary {
    let monitors = match store.list_monitors() {
        Ok(m) => m,
        Err(e) => {
            tracing::error!("Scheduler: Failed to load monitors for sweep: {}", e);
            return SweepSummary::default();
        }
    };

    let mut summary = SweepSummary::default();
    for (i, monitor) in monitors.iter().enumerate() {
        if i > 0 && !probe_delay.is_zero() {
            tokio::time::sleep(probe_delay).await;
        }

        match checker.check(monitor).await {
            Ok(updated) if updated.status.is_up() => summary.up += 1,
            Ok(_) => summary.down += 1,
            Err(_) => summary.failed += 1,
        }
    }

    tracing::info!(
        "Scheduler: Sweep finished for {} monitors ({} up, {} down, {} not recorded)",
        monitors.len(),
        summary.up,
        summary.down,
        summary.failed
    );
    summary
}

async fn run_sweep_loop(
    store: Arc<Store>,
    checker: Arc<Checker>,
    sweep_interval: Duration,
    probe_delay: Duration,
    mut stop_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(sweep_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = interval.tick() => {
                run_sweep(&store, &checker, probe_delay).await;
            }
        }
    }
}

async fn run_probe_queue(
    store: Arc<Store>,
    checker: Arc<Checker>,
    mut queue_rx: mpsc::UnboundedReceiver<i64>,
    mut stop_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            next = queue_rx.recv() => {
                let Some(monitor_id) = next else { break };
                match store.get_monitor(monitor_id) {
                    Ok(monitor) => {
                        let _ = checker.check(&monitor).await;
                    }
                    Err(DbError::NotFound) => {
                        tracing::debug!(
                            "Scheduler: Monitor {} was deleted before its probe ran",
                            monitor_id
                        );
                    }
                    Err(e) => {
                        tracing::error!("Scheduler: Failed to load monitor {}: {}", monitor_id, e);
                    }
                }
            }
        }
    }
}

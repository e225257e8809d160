//! Fan-out of live updates to connected observers.
//!
//! Each observer owns a bounded queue. Publishing never waits: when an
//! observer's queue is full the message is dropped for that observer only.
//! Updates replace earlier state on the client, so a gap is harmless.

use super::LiveUpdate;

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::Stream;

/// Default number of messages an observer may have queued.
pub const DEFAULT_OBSERVER_BUFFER: usize = 256;

struct Observer {
    token: u64,
    tx: mpsc::Sender<Arc<str>>,
}

struct Registry {
    observers: RwLock<HashMap<String, Observer>>,
    capacity: usize,
    next_token: AtomicU64,
}

impl Registry {
    fn remove(&self, id: &str, token: Option<u64>) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        let matches = match (observers.get(id), token) {
            (Some(observer), Some(token)) => observer.token == token,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if matches {
            observers.remove(id);
            tracing::info!(
                "Broadcaster: Observer disconnected: {} (total: {})",
                id,
                observers.len()
            );
        }
        matches
    }
}

/// Outcome of one publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Registry of connected observers.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<Registry>,
}

impl Broadcaster {
    /// Create a broadcaster whose observers each buffer up to `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Registry {
                observers: RwLock::new(HashMap::new()),
                capacity: capacity.max(1),
                next_token: AtomicU64::new(1),
            }),
        }
    }

    /// Register an observer. Subscribing again with a live id replaces the
    /// earlier registration, whose queue is then closed.
    pub fn subscribe(&self, id: impl Into<String>) -> Subscription {
        let id = id.into();
        let (tx, rx) = mpsc::channel(self.registry.capacity);
        let token = self.registry.next_token.fetch_add(1, Ordering::Relaxed);

        let total = {
            let mut observers = self
                .registry
                .observers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if observers.insert(id.clone(), Observer { token, tx }).is_some() {
                tracing::warn!("Broadcaster: Observer {} subscribed twice, replacing", id);
            }
            observers.len()
        };
        tracing::info!("Broadcaster: Observer connected: {} (total: {})", id, total);

        Subscription {
            id,
            token,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deregister an observer. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: &str) -> bool {
        self.registry.remove(id, None)
    }

    pub fn observer_count(&self) -> usize {
        self.registry
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Serialize an update and deliver it to every observer.
    pub fn publish(&self, update: &LiveUpdate) -> DeliveryReport {
        match serde_json::to_string(update) {
            Ok(json) => self.publish_raw(Arc::from(json)),
            Err(e) => {
                tracing::error!("Broadcaster: Failed to serialize {} update: {}", update.kind(), e);
                DeliveryReport::default()
            }
        }
    }

    /// Deliver an already encoded message to every observer.
    fn publish_raw(&self, message: Arc<str>) -> DeliveryReport {
        let observers = self.registry.observers.read().unwrap_or_else(PoisonError::into_inner);

        if observers.is_empty() {
            tracing::debug!(
                "Broadcaster: No observers connected, dropping message ({} bytes)",
                message.len()
            );
            return DeliveryReport::default();
        }

        let mut report = DeliveryReport::default();
        for (id, observer) in observers.iter() {
            match observer.tx.try_send(message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    report.dropped += 1;
                    tracing::warn!("Broadcaster: Observer {} queue full, dropping message", id);
                }
                Err(TrySendError::Closed(_)) => {
                    report.dropped += 1;
                    tracing::debug!("Broadcaster: Observer {} already closed", id);
                }
            }
        }

        tracing::debug!(
            "Broadcaster: Sent to {}/{} observers ({} bytes, {} dropped)",
            report.delivered,
            observers.len(),
            message.len(),
            report.dropped
        );
        report
    }

    /// Disconnect every observer.
    pub fn shutdown(&self) {
        let mut observers = self.registry.observers.write().unwrap_or_else(PoisonError::into_inner);
        let count = observers.len();
        observers.clear();
        tracing::info!("Broadcaster: Shut down, disconnected {} observers", count);
    }
}

/// Handle an observer reads its queued messages from.
///
/// Dropping the handle unsubscribes the observer.
pub struct Subscription {
    id: String,
    token: u64,
    rx: mpsc::Receiver<Arc<str>>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the next message. `None` once the observer was removed and
    /// its queue is drained.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.rx.recv().await
    }

    /// Take a queued message without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<str>> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Arc<str>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.id, Some(self.token));
        }
    }
}

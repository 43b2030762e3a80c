//! Status event fan-out.
//!
//! Each observer gets its own bounded queue. Publishing never blocks: when an
//! observer's queue is full that observer misses the event and every other
//! observer still receives it. Dropping a [`StatusSubscription`] removes its
//! queue, after which publishing to it is a no-op.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use tokio::sync::mpsc;

/// Default per-observer queue depth.
pub const DEFAULT_OBSERVER_CAPACITY: usize = 64;

/// Severity of a status event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

fn rfc3339_seconds<S: Serializer>(time: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// A timestamped progress or outcome message.
///
/// Serializes compactly as `{"t": "<RFC 3339>", "l": "<level>", "msg": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    #[serde(rename = "t", serialize_with = "rfc3339_seconds")]
    pub time: DateTime<Utc>,
    #[serde(rename = "l")]
    pub level: StatusLevel,
    pub msg: String,
}

impl StatusEvent {
    pub fn new(level: StatusLevel, msg: impl Into<String>) -> Self {
        Self {
            time: Utc::now(),
            level,
            msg: msg.into(),
        }
    }

    pub fn info(msg: impl Into<String>) -> Self {
        Self::new(StatusLevel::Info, msg)
    }

    pub fn warning(msg: impl Into<String>) -> Self {
        Self::new(StatusLevel::Warning, msg)
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self::new(StatusLevel::Error, msg)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

struct BroadcastInner {
    observers: RwLock<HashMap<u64, mpsc::Sender<StatusEvent>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl BroadcastInner {
    fn unsubscribe(&self, id: u64) {
        self.observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
    }
}

/// Fan-out of [`StatusEvent`]s to any number of observers.
#[derive(Clone)]
pub struct StatusBroadcaster {
    inner: Arc<BroadcastInner>,
}

impl StatusBroadcaster {
    /// Create a broadcaster whose observers each buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BroadcastInner {
                observers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Register a new observer. Events published before this call are not seen.
    pub fn subscribe(&self) -> StatusSubscription {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, tx);
        StatusSubscription {
            id,
            rx,
            broadcaster: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `event` to every observer with room in its queue.
    pub fn publish(&self, event: StatusEvent) {
        let observers = self.inner.observers.read().unwrap_or_else(|e| e.into_inner());
        for tx in observers.values() {
            // Full: this observer misses the event. Closed: it is being dropped.
            let _ = tx.try_send(event.clone());
        }
    }

    pub fn observer_count(&self) -> usize {
        self.inner
            .observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_OBSERVER_CAPACITY)
    }
}

impl std::fmt::Debug for StatusBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusBroadcaster")
            .field("observers", &self.observer_count())
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

/// One observer's view of the status stream. Unsubscribes on drop.
pub struct StatusSubscription {
    id: u64,
    rx: mpsc::Receiver<StatusEvent>,
    broadcaster: Weak<BroadcastInner>,
}

impl StatusSubscription {
    /// Next event, or `None` once the broadcaster is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        self.rx.recv().await
    }

    /// Next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<StatusEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for StatusSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.broadcaster.upgrade() {
            inner.unsubscribe(self.id);
        }
    }
}

//! Status notifications delivered to subscribers.
//!
//! Callbacks run synchronously on the scheduler task that produced the
//! event. A subscriber that needs to hop onto another thread or UI context
//! must do so itself, and should return quickly.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDateTime;
use uptime_core::models::ProbeResult;

/// What a [`StatusEvent`] reports.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusKind {
    /// First probe found the target online, or it came back from offline.
    CameOnline,
    /// The probe found the target offline (sent on every offline probe).
    WentOffline,
    /// A MOTD change closed one session and opened another.
    Restarted,
    /// Emitted after every probe with a one-line summary.
    Refreshed(String),
    /// Writing or repairing the uptime log failed; polling continues.
    LogError(String),
}

/// A single notification for one target.
#[derive(Debug, Clone)]
pub struct StatusEvent {
    /// Target address as configured.
    pub target: String,
    pub result: ProbeResult,
    pub kind: StatusKind,
    pub at: NaiveDateTime,
}

/// Callback invoked for each event.
pub type StatusCallback = Arc<dyn Fn(&StatusEvent) + Send + Sync>;

/// Identifies a subscription for [`StatusBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, StatusCallback)>,
}

/// Fan-out of [`StatusEvent`]s to registered callbacks. Cheap to clone.
#[derive(Clone, Default)]
pub struct StatusBus {
    inner: Arc<Mutex<BusInner>>,
}

impl StatusBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `callback`; it receives every event published afterwards.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StatusEvent) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner.subscribers.push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(sid, _)| *sid != id);
        inner.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Deliver `event` to every subscriber in registration order.
    ///
    /// The subscriber list is copied first so callbacks may subscribe or
    /// unsubscribe without deadlocking.
    pub fn publish(&self, event: &StatusEvent) {
        let callbacks: Vec<StatusCallback> =
            self.lock().subscribers.iter().map(|(_, cb)| Arc::clone(cb)).collect();
        for callback in callbacks {
            callback(event);
        }
    }
}

impl std::fmt::Debug for StatusBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

//! Change notifications and the fan-out bus that carries them.
//!
//! Events carry no payload. A subscriber that sees `TimePointChanged` reads the
//! current time point through the getters, so it can never act on a value that
//! was already stale when the event was queued.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Kind of state change observed by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeEvent {
    /// The active spot changed.
    ActiveSpotChanged,
    /// The current time point changed.
    TimePointChanged,
    /// A different tag set was selected.
    TagSetSelectionChanged,
    /// A different sync group was selected.
    SyncGroupChanged,
    /// The viewer asked for spot colors to be resent.
    ColorsNeedRefresh,
    /// The list of available tag sets was replaced.
    TagSetListUpdated,
}

impl ChangeEvent {
    /// Every event kind.
    pub const ALL: [Self; 6] = [
        Self::ActiveSpotChanged,
        Self::TimePointChanged,
        Self::TagSetSelectionChanged,
        Self::SyncGroupChanged,
        Self::ColorsNeedRefresh,
        Self::TagSetListUpdated,
    ];

    /// Wire name of the event.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ActiveSpotChanged => "active_spot_changed",
            Self::TimePointChanged => "time_point_changed",
            Self::TagSetSelectionChanged => "tag_set_selection_changed",
            Self::SyncGroupChanged => "sync_group_changed",
            Self::ColorsNeedRefresh => "colors_need_refresh",
            Self::TagSetListUpdated => "tag_set_list_updated",
        }
    }
}

impl std::fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Default)]
struct BusInner {
    subscribers: HashMap<Uuid, mpsc::UnboundedSender<ChangeEvent>>,
    closed: bool,
}

/// Unbounded multi-producer fan-out of [`ChangeEvent`]s.
///
/// Each [`Subscription`] owns its own channel, so a slow subscriber never
/// causes another to lose events, and a subscriber only sees events published
/// after it subscribed. Cloning shares the bus.
#[derive(Clone, Default)]
pub struct ChangeBus {
    inner: Arc<Mutex<BusInner>>,
}

impl std::fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeBus")
            .field("subscribers", &self.subscriber_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ChangeBus {
    /// Create an open bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every live subscriber. Returns how many received it.
    ///
    /// Subscribers whose receiving side is gone are pruned.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let mut inner = self.lock();
        if inner.closed {
            return 0;
        }
        inner
            .subscribers
            .retain(|_, tx| tx.send(event).is_ok());
        let delivered = inner.subscribers.len();
        tracing::debug!(%event, delivered, "Change event published");
        delivered
    }

    /// Open a new subscription that sees every event published from now on.
    ///
    /// On a closed bus the subscription is already at its end.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        {
            let mut inner = self.lock();
            if inner.closed {
                drop(tx);
            } else {
                inner.subscribers.insert(id, tx);
            }
        }
        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Close the bus. Every subscription drains what it already holds and then
    /// reports [`Poll::Closed`]; later publishes are dropped.
    pub fn close(&self) {
        let mut inner = self.lock();
        if !inner.closed {
            inner.closed = true;
            let count = inner.subscribers.len();
            inner.subscribers.clear();
            tracing::info!(subscribers = count, "Change bus closed");
        }
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of registered subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Result of waiting on a [`Subscription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// The next event.
    Event(ChangeEvent),
    /// Nothing arrived within the timeout.
    Timeout,
    /// The bus is closed and every pending event has been consumed.
    Closed,
}

/// One subscriber's cursor on a [`ChangeBus`].
///
/// Dropping the subscription unregisters it.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    rx: mpsc::UnboundedReceiver<ChangeEvent>,
    bus: Weak<Mutex<BusInner>>,
}

impl Subscription {
    /// Unique id of this subscription.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait up to `timeout` for the next event.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Poll {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(event)) => Poll::Event(event),
            Ok(None) => Poll::Closed,
            Err(_) => Poll::Timeout,
        }
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .subscribers
                .remove(&self.id);
        }
    }
}

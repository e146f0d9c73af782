//! Subscriber registry for sync state transitions.
//!
//! Tracks registered listeners and fans every transition out to them in
//! registration order. Listeners are either plain callbacks or channels.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use contract_sync_engine::{SyncState, SyncSummary};
use serde::Serialize;
use tokio::sync::mpsc;

/// What subscribers receive on every state transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
    /// State just entered
    pub state: SyncState,
    /// Summary as far as the cycle has progressed
    pub summary: SyncSummary,
}

/// Callback invoked on every transition.
pub type SyncCallback = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

/// Identifier handed out on registration.
pub type SubscriberId = u64;

#[derive(Clone)]
enum Subscriber {
    Callback(SyncCallback),
    Channel(mpsc::UnboundedSender<SyncEvent>),
}

/// Ordered set of sync listeners.
///
/// Thread-safe and shared via `Arc`.
#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(SubscriberId, Subscriber)>>,
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.len())
            .finish()
    }
}

impl SubscriberRegistry {
    /// Create a new registry wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(SubscriberId, Subscriber)>> {
        // A panicking callback runs outside the lock, so poisoning only means
        // a panic elsewhere; the list itself is still consistent.
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn register(self: &Arc<Self>, subscriber: Subscriber) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, subscriber));
        tracing::debug!(subscriber = id, "Sync subscriber registered");
        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    /// Register a callback.
    pub fn subscribe<F>(self: &Arc<Self>, callback: F) -> Subscription
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.register(Subscriber::Callback(Arc::new(callback)))
    }

    /// Register a channel listener. Dropping the receiver unsubscribes it on
    /// the next transition.
    pub fn subscribe_channel(
        self: &Arc<Self>,
    ) -> (Subscription, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.register(Subscriber::Channel(tx)), rx)
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.lock();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        let removed = subscribers.len() != before;
        if removed {
            tracing::debug!(subscriber = id, "Sync subscriber unregistered");
        }
        removed
    }

    /// Deliver an event to every listener in registration order.
    ///
    /// Returns the number of listeners reached.
    pub fn notify(&self, event: &SyncEvent) -> usize {
        // Snapshot so callbacks may (un)subscribe without deadlocking.
        let snapshot: Vec<(SubscriberId, Subscriber)> = self.lock().clone();
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, subscriber) in snapshot {
            match subscriber {
                Subscriber::Callback(callback) => {
                    callback(event);
                    delivered += 1;
                }
                Subscriber::Channel(tx) => {
                    if tx.send(event.clone()).is_ok() {
                        delivered += 1;
                    } else {
                        closed.push(id);
                    }
                }
            }
        }

        if !closed.is_empty() {
            self.lock().retain(|(id, _)| !closed.contains(id));
        }

        tracing::trace!(state = %event.state, recipients = delivered, "Notified sync subscribers");
        delivered
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle returned by `subscribe`; call [`Subscription::unsubscribe`] to stop
/// receiving events. Dropping the handle keeps the subscription alive.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: SubscriberId,
    registry: Weak<SubscriberRegistry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Remove the listener. Returns whether it was still registered.
    pub fn unsubscribe(self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.unsubscribe(self.id),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(state: SyncState) -> SyncEvent {
        SyncEvent {
            state,
            summary: SyncSummary::default(),
        }
    }

    #[test]
    fn notifies_in_registration_order() {
        let registry = SubscriberRegistry::new_shared();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let seen = seen.clone();
            registry.subscribe(move |_| seen.lock().unwrap().push(name));
        }

        assert_eq!(registry.notify(&event(SyncState::Downloading)), 3);
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let registry = SubscriberRegistry::new_shared();
        let count = Arc::new(AtomicU64::new(0));

        let counter = count.clone();
        let subscription = registry.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        registry.notify(&event(SyncState::Downloading));
        assert!(subscription.clone().unsubscribe());
        registry.notify(&event(SyncState::Merging));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
        assert!(!subscription.unsubscribe());
    }

    #[test]
    fn channel_subscriber_receives_events() {
        let registry = SubscriberRegistry::new_shared();
        let (_subscription, mut rx) = registry.subscribe_channel();

        registry.notify(&event(SyncState::Uploading));

        let received = rx.try_recv().unwrap();
        assert_eq!(received.state, SyncState::Uploading);
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let registry = SubscriberRegistry::new_shared();
        let (_subscription, rx) = registry.subscribe_channel();
        drop(rx);

        assert_eq!(registry.notify(&event(SyncState::Downloading)), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn callback_may_unsubscribe_itself() {
        let registry = SubscriberRegistry::new_shared();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let inner = slot.clone();
        let subscription = registry.subscribe(move |_| {
            if let Some(subscription) = inner.lock().unwrap().take() {
                subscription.unsubscribe();
            }
        });
        *slot.lock().unwrap() = Some(subscription);

        registry.notify(&event(SyncState::Downloading));
        assert!(registry.is_empty());
    }
}

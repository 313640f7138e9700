//! In-memory fan-out of change events to subscriber queues.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

use crate::error::RelayError;
use crate::event::ChangeEvent;

/// Default number of pending events a subscriber queue can hold.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Identity of one subscriber queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Raw numeric value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Capacity of each subscriber queue. Events for a full queue are skipped.
    pub queue_capacity: usize,
}

impl BrokerConfig {
    /// Set the per-subscriber queue capacity (at least 1).
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Outcome of a single publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Queues that accepted the event.
    pub delivered: usize,
    /// Queues that were full and skipped this event.
    pub skipped: usize,
    /// Queues found closed and removed from the registry.
    pub pruned: usize,
}

/// Snapshot of one registered subscriber.
#[derive(Debug, Clone)]
pub struct SubscriberInfo {
    /// Subscriber identity.
    pub id: SubscriberId,
    /// Time since the subscriber registered.
    pub age: Duration,
    /// Events enqueued for this subscriber.
    pub delivered: u64,
    /// Events dropped because the queue was full.
    pub skipped: u64,
}

struct SubscriberEntry {
    tx: mpsc::Sender<Arc<ChangeEvent>>,
    created_at: Instant,
    delivered: u64,
    skipped: u64,
}

struct BrokerInner {
    /// Registry of live queues. Held for the whole of subscribe, unsubscribe
    /// and publish so the three are linearizable.
    registry: Mutex<HashMap<SubscriberId, SubscriberEntry>>,
    next_id: AtomicU64,
    published: AtomicU64,
    config: BrokerConfig,
}

impl BrokerInner {
    fn remove(&self, id: SubscriberId) -> bool {
        let entry = self.registry.lock().remove(&id);
        match entry {
            Some(entry) => {
                tracing::debug!(
                    subscriber_id = %id,
                    delivered = entry.delivered,
                    skipped = entry.skipped,
                    "subscriber removed"
                );
                true
            }
            None => false,
        }
    }
}

/// Fan-out hub between the change listener and stream sessions.
///
/// Cloning is cheap; all clones share one registry.
#[derive(Clone)]
pub struct EventBroker {
    inner: Arc<BrokerInner>,
}

impl EventBroker {
    /// Create a broker with default configuration.
    pub fn new() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    /// Create a broker with the given configuration.
    pub fn with_config(config: BrokerConfig) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                registry: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                published: AtomicU64::new(0),
                config,
            }),
        }
    }

    /// Register a new subscriber queue.
    ///
    /// The subscriber receives every event published after this returns.
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::channel(self.inner.config.queue_capacity.max(1));

        self.inner.registry.lock().insert(
            id,
            SubscriberEntry {
                tx,
                created_at: Instant::now(),
                delivered: 0,
                skipped: 0,
            },
        );

        tracing::debug!(subscriber_id = %id, "subscriber registered");

        Subscription {
            id,
            rx,
            broker: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a subscriber queue. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.remove(id)
    }

    /// Deliver an event to every registered queue.
    pub fn publish(&self, event: ChangeEvent) -> PublishReport {
        self.publish_shared(Arc::new(event))
    }

    /// Deliver an already shared event to every registered queue.
    ///
    /// Never blocks: a full queue is skipped for this event, a closed queue
    /// is pruned.
    pub fn publish_shared(&self, event: Arc<ChangeEvent>) -> PublishReport {
        let mut report = PublishReport::default();
        let mut registry = self.inner.registry.lock();

        registry.retain(|id, entry| match entry.tx.try_send(event.clone()) {
            Ok(()) => {
                entry.delivered += 1;
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                entry.skipped += 1;
                report.skipped += 1;
                tracing::warn!(
                    subscriber_id = %id,
                    error = %RelayError::SlowSubscriber(*id),
                    "dropping event for full subscriber queue"
                );
                true
            }
            Err(TrySendError::Closed(_)) => {
                report.pruned += 1;
                tracing::debug!(subscriber_id = %id, "pruning closed subscriber queue");
                false
            }
        });
        drop(registry);

        self.inner.published.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(
            operation = %event.operation,
            delivered = report.delivered,
            skipped = report.skipped,
            "published change event"
        );

        report
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.lock().len()
    }

    /// Whether the given subscriber is registered.
    pub fn is_subscribed(&self, id: SubscriberId) -> bool {
        self.inner.registry.lock().contains_key(&id)
    }

    /// Total number of publish calls.
    pub fn published_count(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }

    /// Snapshot of all registered subscribers, ordered by id.
    pub fn subscribers(&self) -> Vec<SubscriberInfo> {
        let registry = self.inner.registry.lock();
        let mut infos: Vec<SubscriberInfo> = registry
            .iter()
            .map(|(id, entry)| SubscriberInfo {
                id: *id,
                age: entry.created_at.elapsed(),
                delivered: entry.delivered,
                skipped: entry.skipped,
            })
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Broker configuration.
    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }
}

impl Default for EventBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of one subscriber queue.
///
/// Dropping the subscription removes it from the broker before the queue
/// itself is released.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Arc<ChangeEvent>>,
    broker: Weak<BrokerInner>,
}

impl Subscription {
    /// Subscriber identity.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the subscriber has been removed from the broker
    /// and its queue is drained.
    pub async fn recv(&mut self) -> Option<Arc<ChangeEvent>> {
        self.rx.recv().await
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Arc<ChangeEvent>> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.broker.upgrade() {
            inner.remove(self.id);
        }
    }
}

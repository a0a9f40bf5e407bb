//! In-process subscription fan-out.
//!
//! Uses one bounded tokio mpsc queue per subscriber. Delivery is
//! best-effort: a full queue drops the event and logs, a closed queue is
//! pruned. The push path never waits on a subscriber.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregate::AggregateType;
use crate::event::{Event, EventType};

/// Aggregate types a subscriber wants, optionally narrowed to event types.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Interest {
    types: HashMap<AggregateType, Option<HashSet<EventType>>>,
}

impl Interest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event of `aggregate_type`.
    pub fn aggregate(mut self, aggregate_type: impl Into<AggregateType>) -> Self {
        self.types.insert(aggregate_type.into(), None);
        self
    }

    /// Only the listed event types of `aggregate_type`.
    pub fn events<I, T>(mut self, aggregate_type: impl Into<AggregateType>, event_types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<EventType>,
    {
        let entry = self
            .types
            .entry(aggregate_type.into())
            .or_insert_with(|| Some(HashSet::new()));
        if let Some(types) = entry {
            types.extend(event_types.into_iter().map(Into::into));
        }
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        match self.types.get(&event.aggregate.aggregate_type) {
            Some(None) => true,
            Some(Some(types)) => types.contains(&event.event_type),
            None => false,
        }
    }
}

struct Subscriber {
    interest: Arc<Interest>,
    sender: mpsc::Sender<Event>,
}

struct Registry {
    capacity: usize,
    subscribers: Mutex<HashMap<Uuid, Subscriber>>,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registry of live subscriptions, shared by clones.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<Registry>,
}

impl SubscriptionRegistry {
    /// Create a registry whose subscribers buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Registry {
                capacity: capacity.max(1),
                subscribers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self, interest: Interest) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.inner.capacity);
        let id = Uuid::new_v4();
        self.inner.lock().insert(
            id,
            Subscriber {
                interest: Arc::new(interest),
                sender,
            },
        );
        info!(subscription = %id, "Subscription registered");

        Subscription {
            id,
            receiver,
            registry: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().len()
    }

    /// Deliver pushed events to interested subscribers.
    pub fn notify(&self, events: &[Event]) {
        // senders are cloned so no lock is held while delivering
        let targets: Vec<(Uuid, Arc<Interest>, mpsc::Sender<Event>)> = self
            .inner
            .lock()
            .iter()
            .map(|(id, s)| (*id, Arc::clone(&s.interest), s.sender.clone()))
            .collect();

        let mut closed = Vec::new();
        for (id, interest, sender) in &targets {
            for event in events.iter().filter(|event| interest.matches(event)) {
                match sender.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!(
                            subscription = %id,
                            aggregate_type = %event.aggregate.aggregate_type,
                            sequence = event.sequence,
                            "Subscriber queue full, dropping event"
                        );
                    }
                    Err(TrySendError::Closed(_)) => {
                        closed.push(*id);
                        break;
                    }
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = self.inner.lock();
            for id in &closed {
                subscribers.remove(id);
            }
            debug!(pruned = closed.len(), "Closed subscriptions removed");
        }
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Receiving end of a subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: Uuid,
    receiver: mpsc::Receiver<Event>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next event, or `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Stop receiving new events. Buffered events stay readable.
    pub fn unsubscribe(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.lock().remove(&self.id).is_some() {
                info!(subscription = %self.id, "Subscription removed");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

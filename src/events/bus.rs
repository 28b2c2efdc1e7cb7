//! Typed publish/subscribe hub for pipeline events.
//!
//! Each subscription owns an independent unbounded channel, so a slow
//! consumer never stalls delivery to another. Delivery is per-subscriber FIFO
//! in publish order; predicates are evaluated at publish time. Nothing is
//! persisted and nothing is replayed: a subscription sees only events
//! published after it was created.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::trace;

use super::{Event, EventKind};

type EventPredicate = Box<dyn Fn(&Event) -> bool + Send + Sync>;

struct SubscriberSlot {
    tx: mpsc::UnboundedSender<Event>,
    filter: EventPredicate,
}

/// In-process event bus. Cheap to clone; clones share the subscriber set.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<Vec<SubscriberSlot>>>,
}

impl EventBus {
    /// Create a new bus with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Publish an event to every matching subscriber.
    ///
    /// Returns the number of subscribers the event was delivered to. Closed
    /// subscriptions are pruned here; dropping one subscriber never drops
    /// events destined for the others.
    pub fn publish(&self, event: Event) -> usize {
        let mut subscribers = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut delivered = 0;
        subscribers.retain(|slot| {
            if (slot.filter)(&event) {
                if slot.tx.send(event.clone()).is_ok() {
                    delivered += 1;
                    true
                } else {
                    false
                }
            } else {
                !slot.tx.is_closed()
            }
        });
        trace!(kind = ?event.kind(), delivered, "published event");
        delivered
    }

    /// Subscribe to future events matching `filter`.
    pub fn subscribe<F>(&self, filter: F) -> Subscription
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SubscriberSlot {
                tx,
                filter: Box::new(filter),
            });
        Subscription { rx }
    }

    /// Subscribe to every future event.
    pub fn subscribe_all(&self) -> Subscription {
        self.subscribe(|_| true)
    }

    /// Subscribe to a fixed whitelist of event kinds.
    pub fn subscribe_kinds(&self, kinds: &[EventKind]) -> Subscription {
        let kinds = kinds.to_vec();
        self.subscribe(move |event| kinds.contains(&event.kind()))
    }

    /// Number of live subscriptions (for diagnostics).
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// One subscriber's independent, ordered event sequence.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl Subscription {
    /// Receive the next matching event.
    ///
    /// Returns `None` once the bus (every publisher handle) is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Receive a matching event without waiting.
    pub fn try_recv(&mut self) -> Result<Option<Event>, BusError> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(BusError::Closed),
        }
    }
}

/// Bus errors.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Bus closed")]
    Closed,
}

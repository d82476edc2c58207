//! Typed publish/subscribe bus for engine change notifications.
//!
//! Replaces single settable callbacks: any number of observers (sequencer UI,
//! broadcast layer, test harnesses) attach via [`EventBus::subscribe`] and
//! detach by dropping the [`Subscription`]. Publishing never blocks; each
//! subscriber gets its own unbounded channel.

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use std::sync::Arc;

struct BusInner<T> {
    subscribers: Vec<(u64, Sender<T>)>,
    next_id: u64,
}

pub struct EventBus<T> {
    inner: Arc<Mutex<BusInner<T>>>,
}

impl<T: Clone> EventBus<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                subscribers: Vec::new(),
                next_id: 1,
            })),
        }
    }

    /// Attach an observer. The returned handle receives every event published
    /// after this call, in publish order.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, tx));
        Subscription {
            id,
            receiver: rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `event` to every live subscriber, pruning dropped ones.
    pub fn publish(&self, event: &T) {
        let mut inner = self.inner.lock();
        inner
            .subscribers
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

impl<T: Clone> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of an [`EventBus`] subscription. Dropping it detaches the
/// observer on the next publish.
pub struct Subscription<T> {
    id: u64,
    receiver: Receiver<T>,
    bus: std::sync::Weak<Mutex<BusInner<T>>>,
}

impl<T> Subscription<T> {
    /// Next pending event, if any.
    pub fn try_recv(&self) -> Option<T> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// All pending events, in publish order.
    pub fn drain(&self) -> Vec<T> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Detach eagerly instead of waiting for the next publish to prune.
    pub fn unsubscribe(self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.lock().subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}

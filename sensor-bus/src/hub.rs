use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::{error::HubError, sample::SensorSample};

/// Serialized sample shared by every subscriber of one publish.
pub type Payload = Arc<str>;

const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriberState {
    Open,
    Closing,
    Closed,
}

struct Subscriber {
    state: SubscriberState,
    tx: mpsc::Sender<Payload>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub dropped: usize,
    pub closed: usize,
}

/// Fan-out point between the single active producer and every live subscriber.
pub struct BroadcastHub {
    subscribers: Mutex<BTreeMap<u64, Subscriber>>,
    next_id: AtomicU64,
    producer_active: AtomicBool,
    capacity: usize,
}

impl BroadcastHub {
    pub fn new() -> Arc<Self> {
        Self::with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    /// `capacity` is the per-subscriber queue depth before messages are dropped.
    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            subscribers: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            producer_active: AtomicBool::new(false),
            capacity: capacity.max(1),
        })
    }

    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);
        self.lock().insert(
            id,
            Subscriber {
                state: SubscriberState::Open,
                tx,
            },
        );
        log::info!("hub: subscriber {} connected", id);
        Subscription {
            id,
            rx,
            hub: Arc::downgrade(self),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|s| s.state == SubscriberState::Open)
            .count()
    }

    /// Claims the right to publish. Only one producer may hold it at a time.
    pub fn producer(self: &Arc<Self>) -> Result<Producer, HubError> {
        if self.producer_active.swap(true, Ordering::AcqRel) {
            return Err(HubError::ProducerBusy);
        }
        Ok(Producer {
            hub: Arc::clone(self),
        })
    }

    fn broadcast(&self, payload: Payload) -> Delivery {
        let mut delivery = Delivery::default();
        let mut subscribers = self.lock();
        subscribers.retain(|id, subscriber| {
            if subscriber.state == SubscriberState::Closing {
                subscriber.state = SubscriberState::Closed;
                log::info!("hub: subscriber {} evicted after close", id);
                delivery.closed += 1;
                return false;
            }
            match subscriber.tx.try_send(Arc::clone(&payload)) {
                Ok(()) => {
                    delivery.delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    log::warn!("hub: subscriber {} is lagging, message dropped", id);
                    delivery.dropped += 1;
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    subscriber.state = SubscriberState::Closed;
                    log::info!("hub: subscriber {} closed during send", id);
                    delivery.closed += 1;
                    false
                }
            }
        });
        delivery
    }

    fn set_state(&self, id: u64, state: SubscriberState) {
        if let Some(subscriber) = self.lock().get_mut(&id) {
            subscriber.state = state;
        }
    }

    fn remove(&self, id: u64) {
        if self.lock().remove(&id).is_some() {
            log::info!("hub: subscriber {} disconnected", id);
        }
    }

    pub fn state_of(&self, id: u64) -> Option<SubscriberState> {
        self.lock().get(&id).map(|s| s.state)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, Subscriber>> {
        // Never held across an await; a poisoned map is still consistent.
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Publishing lease. Dropping it lets another producer take over.
pub struct Producer {
    hub: Arc<BroadcastHub>,
}

impl Producer {
    /// Serializes once and fans out. A failing subscriber never affects the others.
    pub fn publish(&self, sample: &SensorSample) -> Delivery {
        match sample.to_json() {
            Ok(json) => self.publish_payload(Payload::from(json)),
            Err(e) => {
                log::error!("hub: serialize sample failed: {}", e);
                Delivery::default()
            }
        }
    }

    /// Publishes an already serialized payload verbatim.
    pub fn publish_payload(&self, payload: Payload) -> Delivery {
        self.hub.broadcast(payload)
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        self.hub.producer_active.store(false, Ordering::Release);
    }
}

/// Receiving side of one subscriber. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Payload>,
    hub: Weak<BroadcastHub>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Payload> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Payload> {
        self.rx.try_recv().ok()
    }

    /// Stops further deliveries. Messages already queued can still be drained.
    /// The entry stays `Closing` until the next publish or drop evicts it.
    pub fn close(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.set_state(self.id, SubscriberState::Closing);
        }
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
        }
    }
}

#[cfg(test)]
#[path = "hub_test.rs"]
mod hub_test;

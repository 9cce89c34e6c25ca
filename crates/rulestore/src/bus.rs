//! Propagation of rule changes.
//!
//! Every successful rule mutation results in a [`ChangeEvent`] holding the
//! complete rule set for the mutated schema. Events are pushed to every
//! subscriber's queue. Subscribers are expected to treat an event carrying a
//! version they've already applied as a no-op, which makes redelivery (e.g. a
//! publisher retrying after `SubscriberOverloaded`) safe.
//!
//! ```text
//!                          +--> Subscription (node A metadata)
//!                          |
//! RuleStore --> ChangeBus -+--> Subscription (node B metadata)
//!                          |
//!                          +--> Subscription (peer forwarder)
//! ```
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::RuleConfigurationSet;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Change subscriber overloaded; schema: {schema}")]
    SubscriberOverloaded { schema: String },

    #[error("Change bus closed")]
    Closed,
}

/// A full snapshot of a schema's rules after a mutation.
///
/// The schema is always taken from the rules themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub rules: Arc<RuleConfigurationSet>,
}

impl ChangeEvent {
    pub fn new(rules: Arc<RuleConfigurationSet>) -> Self {
        ChangeEvent { rules }
    }

    pub fn schema(&self) -> &str {
        &self.rules.schema
    }

    pub fn version(&self) -> u64 {
        self.rules.version
    }

    /// Encode the event for delivery to cluster peers.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Handle to the process-wide change bus.
///
/// Cheap to clone. Created once and passed to every component that publishes
/// or subscribes.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    inner: Arc<BusInner>,
}

#[derive(Debug)]
struct BusInner {
    /// Queue length for each subscriber.
    buffer: usize,
    state: Mutex<BusState>,
}

#[derive(Debug, Default)]
struct BusState {
    closed: bool,
    subscribers: Vec<mpsc::Sender<ChangeEvent>>,
    /// Latest version published per schema.
    latest: HashMap<String, u64>,
}

impl ChangeBus {
    pub fn new(buffer: usize) -> Self {
        ChangeBus {
            inner: Arc::new(BusInner {
                buffer: buffer.max(1),
                state: Mutex::new(BusState::default()),
            }),
        }
    }

    /// Register a new subscriber. Only events published after this call are
    /// received.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.buffer);
        let mut state = self.inner.state.lock();
        if !state.closed {
            state.subscribers.push(tx);
        }
        Subscription { recv: rx }
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns once the event has been queued for every live subscriber.
    /// Events older than one already published for the same schema are
    /// dropped so that no subscriber sees versions go backwards.
    pub fn publish(&self, event: ChangeEvent) -> Result<(), BusError> {
        let permit = self.reserve(event.schema())?;
        permit.send(event);
        Ok(())
    }

    /// Reserve a queue slot on every live subscriber for one event on
    /// `schema`.
    ///
    /// Fails without reserving anything if any subscriber's queue is full.
    /// Subscribers registered after the reservation don't receive the event.
    pub fn reserve(&self, schema: &str) -> Result<PublishPermit, BusError> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(BusError::Closed);
        }

        let mut permits = Vec::with_capacity(state.subscribers.len());
        let mut overloaded = false;
        state
            .subscribers
            .retain(|sub| match sub.clone().try_reserve_owned() {
                Ok(permit) => {
                    permits.push(permit);
                    true
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    overloaded = true;
                    true
                }
                // Subscriber went away.
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });

        if overloaded {
            warn!(%schema, "change subscriber overloaded");
            return Err(BusError::SubscriberOverloaded {
                schema: schema.to_string(),
            });
        }

        Ok(PublishPermit {
            bus: self.clone(),
            permits,
        })
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.inner.state.lock();
        state.subscribers.retain(|sub| !sub.is_closed());
        state.subscribers.len()
    }

    /// Close the bus. All subscriptions end after draining queued events.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        state.closed = true;
        state.subscribers.clear();
    }
}

/// Queue slots reserved on every subscriber by [`ChangeBus::reserve`].
///
/// Dropping the permit without sending releases the slots.
#[derive(Debug)]
pub struct PublishPermit {
    bus: ChangeBus,
    permits: Vec<mpsc::OwnedPermit<ChangeEvent>>,
}

impl PublishPermit {
    /// Send the event into every reserved slot. Never blocks.
    ///
    /// A stale event (older than one already published for its schema) is
    /// dropped.
    pub fn send(self, event: ChangeEvent) {
        let mut state = self.bus.inner.state.lock();

        let version = event.version();
        if let Some(latest) = state.latest.get(event.schema()) {
            if version < *latest {
                debug!(schema = %event.schema(), %version, %latest, "dropping stale change event");
                return;
            }
        }

        let subscribers = self.permits.len();
        for permit in self.permits {
            permit.send(event.clone());
        }

        debug!(schema = %event.schema(), %version, %subscribers, "published change event");
        state.latest.insert(event.schema().to_string(), version);
    }
}

/// Receiving end of the change bus.
#[derive(Debug)]
pub struct Subscription {
    recv: mpsc::Receiver<ChangeEvent>,
}

impl Subscription {
    /// Wait for the next event. Returns `None` once the bus is closed and all
    /// queued events have been received.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.recv.recv().await
    }

    /// Get the next event if one is immediately available.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.recv.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(schema: &str, version: u64) -> ChangeEvent {
        let mut rules = RuleConfigurationSet::empty(schema);
        rules.version = version;
        ChangeEvent::new(Arc::new(rules))
    }

    #[tokio::test]
    async fn all_subscribers_receive() {
        let bus = ChangeBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(event("test", 1)).unwrap();

        assert_eq!(1, a.recv().await.unwrap().version());
        assert_eq!(1, b.recv().await.unwrap().version());
    }

    #[tokio::test]
    async fn stale_events_dropped_per_schema() {
        let bus = ChangeBus::new(8);
        let mut sub = bus.subscribe();

        bus.publish(event("test", 2)).unwrap();
        bus.publish(event("test", 1)).unwrap();
        // Different schema isn't affected.
        bus.publish(event("other", 1)).unwrap();
        // Redelivery of the same version is allowed.
        bus.publish(event("test", 2)).unwrap();

        let received: Vec<_> = std::iter::from_fn(|| sub.try_recv())
            .map(|e| (e.schema().to_string(), e.rules.version))
            .collect();
        assert_eq!(
            vec![
                ("test".to_string(), 2),
                ("other".to_string(), 1),
                ("test".to_string(), 2)
            ],
            received
        );
    }

    #[test]
    fn overloaded_subscriber() {
        let bus = ChangeBus::new(1);
        let _sub = bus.subscribe();

        bus.publish(event("test", 1)).unwrap();
        let err = bus.publish(event("test", 2)).unwrap_err();
        assert!(matches!(err, BusError::SubscriberOverloaded { .. }));
    }

    #[tokio::test]
    async fn reservation_is_all_or_nothing() {
        let bus = ChangeBus::new(1);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        // Fill only `b`.
        bus.publish(event("test", 1)).unwrap();
        a.try_recv().unwrap();

        let err = bus.reserve("test").unwrap_err();
        assert!(matches!(err, BusError::SubscriberOverloaded { .. }));
        // Nothing stays reserved on `a`, a fresh reservation succeeds once `b`
        // is drained.
        b.try_recv().unwrap();
        let permit = bus.reserve("test").unwrap();

        // Slots are held until sent.
        assert!(matches!(
            bus.reserve("test"),
            Err(BusError::SubscriberOverloaded { .. })
        ));
        permit.send(event("test", 2));
        assert_eq!(2, a.recv().await.unwrap().version());
        assert_eq!(2, b.recv().await.unwrap().version());
    }

    #[test]
    fn dropped_permit_releases_slots() {
        let bus = ChangeBus::new(1);
        let mut sub = bus.subscribe();

        drop(bus.reserve("test").unwrap());
        bus.publish(event("test", 1)).unwrap();
        assert_eq!(1, sub.try_recv().unwrap().version());
    }

    #[test]
    fn stale_permit_send_dropped() {
        let bus = ChangeBus::new(4);
        let mut sub = bus.subscribe();

        let older = bus.reserve("test").unwrap();
        let newer = bus.reserve("test").unwrap();
        newer.send(event("test", 2));
        older.send(event("test", 1));

        assert_eq!(2, sub.try_recv().unwrap().version());
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn schema_taken_from_rules() {
        let rules = serde_json::to_value(RuleConfigurationSet::empty("test")).unwrap();
        let json = serde_json::json!({ "schema": "other", "rules": rules }).to_string();
        let decoded = ChangeEvent::from_json(&json).unwrap();
        assert_eq!("test", decoded.schema());
    }

    #[test]
    fn dropped_subscribers_pruned() {
        let bus = ChangeBus::new(1);
        let sub = bus.subscribe();
        assert_eq!(1, bus.subscriber_count());

        drop(sub);
        bus.publish(event("test", 1)).unwrap();
        assert_eq!(0, bus.subscriber_count());
    }

    #[tokio::test]
    async fn close_ends_subscriptions() {
        let bus = ChangeBus::new(4);
        let mut sub = bus.subscribe();
        bus.publish(event("test", 1)).unwrap();
        bus.close();

        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_none());
        assert!(matches!(
            bus.publish(event("test", 2)),
            Err(BusError::Closed)
        ));
    }

    #[test]
    fn json_round_trip_keeps_snapshot() {
        let ev = event("test", 3);
        let decoded = ChangeEvent::from_json(&ev.to_json().unwrap()).unwrap();
        assert_eq!(ev, decoded);
    }
}

//! Per event kind subscriptions over unbounded channels.
//!
//! The host stack publishes from whatever task it runs on; each subscriber
//! drains its own receiver from a single context, so events reach the
//! registry one at a time and in delivery order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::trace;

use beaconscan_domain::event::{EventKind, HostEvent};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Listener {
    id: SubscriptionId,
    kinds: Vec<EventKind>,
    tx: mpsc::UnboundedSender<HostEvent>,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    listeners: Vec<Listener>,
}

#[derive(Clone, Default)]
pub struct EventHub {
    inner: Arc<Mutex<Listeners>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Listeners> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self, kinds: &[EventKind]) -> Subscription {
        let (tx, receiver) = mpsc::unbounded_channel();
        let mut listeners = self.lock();
        let id = SubscriptionId(listeners.next_id);
        listeners.next_id += 1;
        listeners.listeners.push(Listener {
            id,
            kinds: kinds.to_vec(),
            tx,
        });
        trace!("[EventHub] subscribed {:?} to {:?}", id, kinds);
        Subscription {
            id,
            receiver,
            hub: self.clone(),
        }
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.lock().listeners.retain(|l| l.id != id);
    }

    /// Returns how many subscribers the event was handed to.
    pub fn publish(&self, event: HostEvent) -> usize {
        let kind = event.kind();
        let mut listeners = self.lock();
        listeners.listeners.retain(|l| !l.tx.is_closed());
        let mut delivered = 0;
        for listener in listeners.listeners.iter().filter(|l| l.kinds.contains(&kind)) {
            if listener.tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().listeners.len()
    }
}

/// Receiving end of a subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriptionId,
    receiver: mpsc::UnboundedReceiver<HostEvent>,
    hub: EventHub,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<HostEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<HostEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn unsubscribe(self) {
        self.hub.unsubscribe(self.id);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod test {
    use beaconscan_domain::event::{DiscoveryEvent, EventKind, HostEvent};

    use super::EventHub;

    #[test]
    fn delivers_by_kind() {
        let hub = EventHub::new();
        let mut everything = hub.subscribe(&EventKind::ALL);
        let mut stops = hub.subscribe(&[EventKind::ScanStopped]);

        let discovered = HostEvent::Discovered(DiscoveryEvent::new("A", None, -40));
        assert_eq!(hub.publish(discovered.clone()), 1);
        assert_eq!(hub.publish(HostEvent::ScanStopped), 2);

        assert_eq!(everything.try_recv(), Some(discovered));
        assert_eq!(everything.try_recv(), Some(HostEvent::ScanStopped));
        assert_eq!(everything.try_recv(), None);
        assert_eq!(stops.try_recv(), Some(HostEvent::ScanStopped));
        assert_eq!(stops.try_recv(), None);
    }

    #[test]
    fn unsubscribe_and_drop_detach() {
        let hub = EventHub::new();
        let first = hub.subscribe(&EventKind::ALL);
        let second = hub.subscribe(&EventKind::ALL);
        assert_eq!(hub.subscriber_count(), 2);

        first.unsubscribe();
        assert_eq!(hub.subscriber_count(), 1);

        drop(second);
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.publish(HostEvent::ScanStopped), 0);
    }

    #[tokio::test]
    async fn keeps_delivery_order() {
        let hub = EventHub::new();
        let mut subscription = hub.subscribe(&EventKind::ALL);
        for rssi in [-10, -20, -30] {
            hub.publish(HostEvent::Discovered(DiscoveryEvent::new("A", None, rssi)));
        }
        for expected in [-10, -20, -30] {
            match subscription.recv().await {
                Some(HostEvent::Discovered(event)) => assert_eq!(event.rssi, expected),
                other => panic!("unexpected {other:?}"),
            }
        }
    }
}

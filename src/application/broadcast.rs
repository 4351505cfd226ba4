//! Live feed fan-out.
//!
//! Every subscriber owns a bounded channel. `publish` serializes a message
//! once and offers it to each channel with `try_send`: a full channel misses
//! that message, a closed one is dropped from the set. Nothing is replayed.

use crate::domain::event::PaymentEvent;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::{self, error::TrySendError};

/// A message on the live feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedMessage {
    PaymentEvent { event: PaymentEvent },
    Ping,
}

type Subscribers = DashMap<u64, mpsc::Sender<Arc<str>>>;

pub struct Broadcaster {
    subscribers: Arc<Subscribers>,
    next_id: AtomicU64,
    buffer: usize,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Broadcaster {
    /// `buffer` is the number of undelivered messages a subscriber may hold.
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Registers a new subscriber. Its first message is always a ping.
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.buffer);
        if let Some(ping) = encode(&FeedMessage::Ping) {
            let _ = sender.try_send(ping);
        }
        self.subscribers.insert(id, sender);
        tracing::debug!(subscriber = id, "live feed subscriber connected");

        Subscription {
            id,
            receiver,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    /// Offers `event` to every current subscriber and returns how many
    /// accepted it.
    pub fn publish(&self, event: &PaymentEvent) -> usize {
        let message = FeedMessage::PaymentEvent {
            event: event.clone(),
        };
        let Some(payload) = encode(&message) else {
            return 0;
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for entry in self.subscribers.iter() {
            match entry.value().try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(subscriber = *entry.key(), "subscriber lagging, message skipped");
                }
                Err(TrySendError::Closed(_)) => closed.push(*entry.key()),
            }
        }
        for id in closed {
            self.subscribers.remove(&id);
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

fn encode(message: &FeedMessage) -> Option<Arc<str>> {
    match serde_json::to_string(message) {
        Ok(json) => Some(json.into()),
        Err(e) => {
            tracing::warn!("failed to encode feed message: {}", e);
            None
        }
    }
}

/// A live feed registration. Dropping it deregisters the subscriber.
pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<Arc<str>>,
    subscribers: Weak<Subscribers>,
}

impl Subscription {
    /// Waits for the next serialized message. Returns `None` once the
    /// broadcaster is gone and the buffer is drained.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.receiver.recv().await
    }

    /// Takes a buffered message without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<str>> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.remove(&self.id);
            tracing::debug!(subscriber = self.id, "live feed subscriber disconnected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::{EventId, EventKind};
    use crate::domain::payment::PaymentId;
    use chrono::Utc;

    fn event(kind: EventKind) -> PaymentEvent {
        PaymentEvent {
            id: EventId::new(),
            payment_id: PaymentId::new(),
            kind,
            created_at: Utc::now(),
        }
    }

    fn decode(raw: Arc<str>) -> FeedMessage {
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn test_feed_message_wire_shape() {
        assert_eq!(
            serde_json::to_value(FeedMessage::Ping).unwrap(),
            serde_json::json!({"kind": "ping"})
        );
        let json = serde_json::to_value(FeedMessage::PaymentEvent {
            event: event(EventKind::Created),
        })
        .unwrap();
        assert_eq!(json["kind"], "payment_event");
        assert_eq!(json["event"]["type"], "Created");
    }

    #[tokio::test]
    async fn test_new_subscriber_gets_ping_then_events_in_order() {
        let broadcaster = Broadcaster::default();
        let mut sub = broadcaster.subscribe();

        let created = event(EventKind::Created);
        let authorized = event(EventKind::Authorized);
        assert_eq!(broadcaster.publish(&created), 1);
        assert_eq!(broadcaster.publish(&authorized), 1);

        assert_eq!(decode(sub.recv().await.unwrap()), FeedMessage::Ping);
        assert_eq!(
            decode(sub.recv().await.unwrap()),
            FeedMessage::PaymentEvent { event: created }
        );
        assert_eq!(
            decode(sub.recv().await.unwrap()),
            FeedMessage::PaymentEvent { event: authorized }
        );
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let broadcaster = Broadcaster::default();
        broadcaster.publish(&event(EventKind::Created));

        let mut sub = broadcaster.subscribe();
        assert_eq!(decode(sub.try_recv().unwrap()), FeedMessage::Ping);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_full_subscriber_is_skipped_without_blocking_others() {
        let broadcaster = Broadcaster::new(2);
        let mut slow = broadcaster.subscribe();
        let mut fast = broadcaster.subscribe();

        // The ping already occupies one slot of each buffer.
        let first = event(EventKind::Created);
        assert_eq!(broadcaster.publish(&first), 2);
        fast.try_recv().unwrap();
        fast.try_recv().unwrap();

        let second = event(EventKind::Authorized);
        assert_eq!(broadcaster.publish(&second), 1);
        assert_eq!(
            decode(fast.try_recv().unwrap()),
            FeedMessage::PaymentEvent { event: second }
        );

        assert_eq!(decode(slow.try_recv().unwrap()), FeedMessage::Ping);
        assert_eq!(
            decode(slow.try_recv().unwrap()),
            FeedMessage::PaymentEvent { event: first }
        );
        assert!(slow.try_recv().is_none());
        assert_eq!(broadcaster.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_dropped_subscription_deregisters() {
        let broadcaster = Broadcaster::default();
        let sub = broadcaster.subscribe();
        let mut other = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 2);

        drop(sub);
        assert_eq!(broadcaster.subscriber_count(), 1);

        assert_eq!(broadcaster.publish(&event(EventKind::Created)), 1);
        other.try_recv().unwrap();
        assert!(other.try_recv().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_disconnects_do_not_disturb_publishing() {
        let broadcaster = Arc::new(Broadcaster::new(1024));
        let mut keeper = broadcaster.subscribe();

        let churn = {
            let broadcaster = broadcaster.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let sub = broadcaster.subscribe();
                    tokio::task::yield_now().await;
                    drop(sub);
                }
            })
        };
        let publisher = {
            let broadcaster = broadcaster.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    broadcaster.publish(&event(EventKind::Created));
                    tokio::task::yield_now().await;
                }
            })
        };
        churn.await.unwrap();
        publisher.await.unwrap();

        assert_eq!(decode(keeper.try_recv().unwrap()), FeedMessage::Ping);
        let mut received = 0;
        while keeper.try_recv().is_some() {
            received += 1;
        }
        assert_eq!(received, 200);
        assert_eq!(broadcaster.subscriber_count(), 1);
    }
}

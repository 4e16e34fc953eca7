//! Publish/Subscribe Hub
//!
//! Channel-based message fan-out. Each subscriber owns a bounded queue; a
//! publish walks the channel's subscriber list and offers the message to each
//! queue without ever blocking, so one stalled consumer cannot hold up a
//! publisher or its fellow subscribers. When a queue is full the message is
//! simply dropped for that subscriber.
//!
//! Subscribers are identified by a unique id so a session can remove exactly
//! its own queue when it disconnects.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tokio::sync::mpsc;

/// Messages a subscriber may fall behind by before it starts losing them.
const SUBSCRIBER_QUEUE_DEPTH: usize = 100;

struct Subscriber {
    id: u64,
    sender: mpsc::Sender<Bytes>,
}

/// A registered subscription: the receiving end of one subscriber queue.
///
/// Dropping the subscription alone does not deregister it; call
/// [`Hub::unsubscribe`] with [`Subscription::id`] so the hub forgets the
/// queue instead of discovering it closed on the next publish.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    id: u64,
    receiver: mpsc::Receiver<Bytes>,
}

impl Subscription {
    /// The channel this subscription listens on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Unique id, used to unsubscribe.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next message in publish order.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.receiver.recv().await
    }
}

/// The pub/sub hub: channel name to subscriber queues.
#[derive(Debug, Default)]
pub struct Hub {
    subs: RwLock<HashMap<String, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber").field("id", &self.id).finish()
    }
}

impl Hub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber on `channel` and returns its queue.
    pub fn subscribe(&self, channel: &str) -> Subscription {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut subs = self.subs.write().unwrap();
        subs.entry(channel.to_string())
            .or_default()
            .push(Subscriber { id, sender });

        Subscription {
            channel: channel.to_string(),
            id,
            receiver,
        }
    }

    /// Delivers `message` to every subscriber of `channel` that has queue
    /// space. Returns how many subscribers actually received it; full or
    /// closed queues are skipped silently.
    pub fn publish(&self, channel: &str, message: Bytes) -> usize {
        let subs = self.subs.read().unwrap();
        let subscribers = match subs.get(channel) {
            Some(subscribers) => subscribers,
            None => return 0,
        };

        let mut delivered = 0;
        for subscriber in subscribers {
            if subscriber.sender.try_send(message.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Removes the subscriber `id` from `channel`, dropping the channel entry
    /// when its last subscriber leaves.
    pub fn unsubscribe(&self, channel: &str, id: u64) {
        let mut subs = self.subs.write().unwrap();
        if let Some(subscribers) = subs.get_mut(channel) {
            subscribers.retain(|subscriber| subscriber.id != id);
            if subscribers.is_empty() {
                subs.remove(channel);
            }
        }
    }

    /// Number of subscribers currently registered on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.subs
            .read()
            .unwrap()
            .get(channel)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers() {
        let hub = Hub::new();
        assert_eq!(hub.publish("nobody", Bytes::from("hello")), 0);
    }

    #[tokio::test]
    async fn delivery_in_publish_order() {
        let hub = Hub::new();
        let mut sub = hub.subscribe("news");

        assert_eq!(hub.publish("news", Bytes::from("first")), 1);
        assert_eq!(hub.publish("news", Bytes::from("second")), 1);
        assert_eq!(hub.publish("news", Bytes::from("third")), 1);

        assert_eq!(sub.recv().await, Some(Bytes::from("first")));
        assert_eq!(sub.recv().await, Some(Bytes::from("second")));
        assert_eq!(sub.recv().await, Some(Bytes::from("third")));
    }

    #[tokio::test]
    async fn fan_out_counts_every_subscriber() {
        let hub = Hub::new();
        let mut first = hub.subscribe("news");
        let mut second = hub.subscribe("news");
        let mut other = hub.subscribe("sports");

        assert_eq!(hub.publish("news", Bytes::from("hi")), 2);

        assert_eq!(first.recv().await, Some(Bytes::from("hi")));
        assert_eq!(second.recv().await, Some(Bytes::from("hi")));

        // Channels are independent.
        assert_eq!(hub.publish("sports", Bytes::from("goal")), 1);
        assert_eq!(other.recv().await, Some(Bytes::from("goal")));
    }

    #[tokio::test]
    async fn slow_consumer_loses_overflow_only() {
        let hub = Hub::new();
        let mut sub = hub.subscribe("firehose");

        // Fill the queue to its depth without draining.
        for i in 0..SUBSCRIBER_QUEUE_DEPTH {
            assert_eq!(hub.publish("firehose", Bytes::from(format!("m{i}"))), 1);
        }
        // Queue is full: these are dropped and not counted.
        assert_eq!(hub.publish("firehose", Bytes::from("dropped")), 0);
        assert_eq!(hub.publish("firehose", Bytes::from("dropped too")), 0);

        // Everything that fit arrives, in order.
        for i in 0..SUBSCRIBER_QUEUE_DEPTH {
            assert_eq!(sub.recv().await, Some(Bytes::from(format!("m{i}"))));
        }

        // Once drained, delivery resumes.
        assert_eq!(hub.publish("firehose", Bytes::from("again")), 1);
        assert_eq!(sub.recv().await, Some(Bytes::from("again")));
    }

    #[test]
    fn unsubscribe_removes_only_that_queue() {
        let hub = Hub::new();
        let first = hub.subscribe("news");
        let _second = hub.subscribe("news");
        assert_eq!(hub.subscriber_count("news"), 2);

        hub.unsubscribe("news", first.id());
        assert_eq!(hub.subscriber_count("news"), 1);
        assert_eq!(hub.publish("news", Bytes::from("hi")), 1);

        // Unknown ids and channels are no-ops.
        hub.unsubscribe("news", 9999);
        hub.unsubscribe("nochannel", 0);
        assert_eq!(hub.subscriber_count("news"), 1);
    }

    #[test]
    fn dropped_receiver_is_not_counted() {
        let hub = Hub::new();
        let sub = hub.subscribe("news");
        let id = sub.id();
        drop(sub);

        // The hub still holds the queue, but a closed sender delivers nothing.
        assert_eq!(hub.subscriber_count("news"), 1);
        assert_eq!(hub.publish("news", Bytes::from("hi")), 0);

        hub.unsubscribe("news", id);
        assert_eq!(hub.subscriber_count("news"), 0);
    }
}

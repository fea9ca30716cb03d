//! Topic-keyed publish/subscribe bus for bridge output.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.  Topics are created on demand: per-segment pose and odometry
//! channels appear as segments are discovered, so the topic space is a
//! string-keyed map rather than a fixed enum.
//!
//! Publishing is *best effort*: a topic with no subscribers accepts the
//! message and reports zero receivers, and an inactive publisher logs that
//! messages are being dropped but still attempts the send.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use mocap_types::{MarkerList, Odometry, TransformStamped};
use tokio::sync::broadcast;
use tracing::warn;

use crate::qos::QosProfile;

/// Every message shape the bridge can emit.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Transform(TransformStamped),
    Odometry(Odometry),
    Markers(MarkerList),
    /// A batch of transforms broadcast in one send.
    TransformBatch(Vec<TransformStamped>),
}

/// Shared outbound bus.  Clone it cheaply – all clones share the same
/// underlying topic map and broadcast channels.
#[derive(Clone, Debug, Default)]
pub struct OutboundBus {
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<OutboundMessage>>>>,
}

impl OutboundBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a publisher handle for `topic`, sized by `qos`.
    ///
    /// The publisher starts **inactive**; call
    /// [`LifecyclePublisher::activate`] once the system is ready to emit.
    /// Creating a second publisher for an existing topic shares the existing
    /// channel so earlier subscribers keep receiving.
    pub fn create_publisher(&self, topic: impl Into<String>, qos: QosProfile) -> LifecyclePublisher {
        let topic = topic.into();
        let sender = self.sender_for(&topic, qos.capacity());
        LifecyclePublisher {
            topic,
            sender,
            active: AtomicBool::new(false),
        }
    }

    /// Subscribe to `topic`.
    ///
    /// Works before or after the publisher exists; subscribing first creates
    /// the channel with a default sensor-data capacity.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<OutboundMessage> {
        self.sender_for(topic, QosProfile::sensor_data().capacity())
            .subscribe()
    }

    /// Number of topics with a live channel.
    pub fn topic_count(&self) -> usize {
        self.topics.lock().expect("bus lock poisoned").len()
    }

    fn sender_for(&self, topic: &str, capacity: usize) -> broadcast::Sender<OutboundMessage> {
        let mut topics = self.topics.lock().expect("bus lock poisoned");
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .clone()
    }
}

/// A publisher handle gated by an active flag, mirroring a lifecycle-managed
/// transport publisher.
///
/// While inactive, [`publish`][Self::publish] warns that messages are being
/// dropped by the transport but still attempts the send; the internal bus
/// delivers either way, which keeps the pipeline observable in tests.
#[derive(Debug)]
pub struct LifecyclePublisher {
    topic: String,
    sender: broadcast::Sender<OutboundMessage>,
    active: AtomicBool,
}

impl LifecyclePublisher {
    /// Mark the publisher active.
    pub fn activate(&self) {
        self.active.store(true, Ordering::Release);
    }

    /// Mark the publisher inactive.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Whether the publisher is currently activated.
    pub fn is_activated(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// The topic this publisher emits on.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Send `message` to every current subscriber.
    ///
    /// Returns the number of receivers the message reached; zero subscribers
    /// is a normal condition, not an error.
    pub fn publish(&self, message: OutboundMessage) -> usize {
        if !self.is_activated() {
            warn!(
                topic = %self.topic,
                "publisher is currently inactive, messages are not delivered downstream"
            );
        }
        self.sender.send(message).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mocap_types::{Header, Transform3D};

    fn make_transform(child: &str) -> TransformStamped {
        TransformStamped {
            header: Header {
                stamp: Utc::now(),
                frame_id: "mocap_world".to_string(),
            },
            child_frame_id: child.to_string(),
            transform: Transform3D::identity(),
        }
    }

    #[tokio::test]
    async fn publish_and_receive() {
        let bus = OutboundBus::new();
        let publisher = bus.create_publisher("mocap/drone1/base", QosProfile::sensor_data());
        publisher.activate();
        let mut rx = bus.subscribe("mocap/drone1/base");

        let msg = OutboundMessage::Transform(make_transform("drone1"));
        assert_eq!(publisher.publish(msg.clone()), 1);
        assert_eq!(rx.recv().await.unwrap(), msg);
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = OutboundBus::new();
        let pub_a = bus.create_publisher("mocap/a/base", QosProfile::sensor_data());
        pub_a.activate();
        let _rx_a = bus.subscribe("mocap/a/base");
        let mut rx_b = bus.subscribe("mocap/b/base");

        pub_a.publish(OutboundMessage::Transform(make_transform("a")));

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(50), rx_b.recv()).await;
        assert!(result.is_err(), "topic b must not see topic a traffic");
    }

    #[tokio::test]
    async fn inactive_publisher_still_delivers() {
        // Mirrors the transport contract: the send is attempted and only a
        // warning is emitted while the publisher is inactive.
        let bus = OutboundBus::new();
        let publisher = bus.create_publisher("mocap/markers", QosProfile::keep_last(100));
        let mut rx = bus.subscribe("mocap/markers");

        assert!(!publisher.is_activated());
        let msg = OutboundMessage::Transform(make_transform("m"));
        assert_eq!(publisher.publish(msg.clone()), 1);
        assert_eq!(rx.recv().await.unwrap(), msg);
    }

    #[test]
    fn publish_without_subscribers_is_ok() {
        let bus = OutboundBus::new();
        let publisher = bus.create_publisher("mocap/empty", QosProfile::sensor_data());
        publisher.activate();
        assert_eq!(publisher.publish(OutboundMessage::Transform(make_transform("x"))), 0);
    }

    #[tokio::test]
    async fn second_publisher_shares_channel() {
        let bus = OutboundBus::new();
        let first = bus.create_publisher("mocap/shared", QosProfile::sensor_data());
        first.activate();
        let mut rx = bus.subscribe("mocap/shared");

        let second = bus.create_publisher("mocap/shared", QosProfile::sensor_data());
        second.activate();
        let msg = OutboundMessage::Transform(make_transform("shared"));
        second.publish(msg.clone());
        assert_eq!(rx.recv().await.unwrap(), msg);
    }
}

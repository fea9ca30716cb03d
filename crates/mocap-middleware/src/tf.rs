//! Batch transform broadcaster.
//!
//! Collects per-frame [`TransformStamped`] messages and sends them in one
//! batch on the shared `tf` topic, the way a transform tree broadcaster
//! would.  Also used for the one-off per-marker transforms emitted when
//! individual broadcasting is enabled.

use mocap_types::TransformStamped;

use crate::bus::{LifecyclePublisher, OutboundBus, OutboundMessage};
use crate::qos::QosProfile;

/// Topic the broadcaster publishes on.
pub const TF_TOPIC: &str = "tf";

/// Sends batches of stamped transforms on the [`TF_TOPIC`] channel.
#[derive(Debug)]
pub struct TfBroadcaster {
    publisher: LifecyclePublisher,
}

impl TfBroadcaster {
    /// Create a broadcaster on `bus`.  The underlying publisher is activated
    /// immediately; transform broadcasting is not lifecycle-gated.
    pub fn new(bus: &OutboundBus) -> Self {
        let publisher = bus.create_publisher(TF_TOPIC, QosProfile::keep_last(100));
        publisher.activate();
        Self { publisher }
    }

    /// Broadcast `transforms` as a single batch.
    ///
    /// Empty batches are dropped rather than sent.
    pub fn send_transforms(&self, transforms: Vec<TransformStamped>) -> usize {
        if transforms.is_empty() {
            return 0;
        }
        self.publisher.publish(OutboundMessage::TransformBatch(transforms))
    }
}

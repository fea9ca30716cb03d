//! Asynchronous segment registration.
//!
//! Output-channel construction for a newly discovered segment runs in a
//! detached-but-tracked Tokio task so its latency never stalls the frame
//! loop.  Tasks live in a [`JoinSet`], which lets shutdown wait for every
//! in-flight registration deterministically instead of abandoning raw
//! threads.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use mocap_middleware::{OutboundBus, QosProfile};
use mocap_types::Transform3D;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::registry::{SegmentPublication, SegmentSlot};

/// Spawns and tracks one registration task per newly discovered segment.
#[derive(Debug)]
pub struct SegmentRegistrar {
    bus: OutboundBus,
    topic_prefix: String,
    /// Shared lifecycle flag: channels built while the system is active are
    /// activated immediately, otherwise they wait for the next activation.
    active: Arc<AtomicBool>,
    tasks: Mutex<JoinSet<()>>,
    spawned: AtomicU64,
}

impl SegmentRegistrar {
    pub fn new(bus: OutboundBus, topic_prefix: impl Into<String>, active: Arc<AtomicBool>) -> Self {
        Self {
            bus,
            topic_prefix: topic_prefix.into(),
            active,
            tasks: Mutex::new(JoinSet::new()),
            spawned: AtomicU64::new(0),
        }
    }

    /// Spawn the registration task for `slot`.
    ///
    /// The caller has already inserted the placeholder under the registry
    /// lock, so this is invoked at most once per key.  Fire-and-forget from
    /// the polling loop's point of view; the task is tracked for shutdown.
    pub fn spawn_register(&self, subject_name: &str, segment_name: &str, slot: Arc<SegmentSlot>) {
        self.spawned.fetch_add(1, Ordering::Relaxed);

        let bus = self.bus.clone();
        let active = Arc::clone(&self.active);
        let pose_topic = format!("{}/{}/{}", self.topic_prefix, subject_name, segment_name);
        let subject = subject_name.to_string();
        let segment = segment_name.to_string();

        let mut tasks = self.tasks.lock().expect("registrar lock poisoned");
        tasks.spawn(async move {
            register(bus, active, pose_topic, subject, segment, slot);
        });
    }

    /// Total registration tasks spawned since construction.
    pub fn spawned_count(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }

    /// Wait for every in-flight registration to finish.
    ///
    /// In-flight tasks are allowed to run to completion rather than being
    /// cancelled; a segment registered during shutdown is simply deactivated
    /// by the lifecycle path afterwards.
    pub async fn drain(&self) {
        let mut tasks = {
            let mut guard = self.tasks.lock().expect("registrar lock poisoned");
            std::mem::take(&mut *guard)
        };
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "segment registration task failed");
            }
        }
    }
}

/// Build the output channels for one segment and promote its slot.
///
/// Runs off the polling thread.  The slot placeholder is already visible to
/// the frame loop, so ordering here only has to guarantee that `ready`
/// becomes true after the channels exist.
fn register(
    bus: OutboundBus,
    active: Arc<AtomicBool>,
    pose_topic: String,
    subject_name: String,
    segment_name: String,
    slot: Arc<SegmentSlot>,
) {
    info!(subject = %subject_name, segment = %segment_name, "creating new segment publishers ...");

    let qos = QosProfile::sensor_data();
    let pose = bus.create_publisher(pose_topic.clone(), qos);
    let odom = bus.create_publisher(format!("{pose_topic}_odom"), qos);

    if active.load(Ordering::Acquire) {
        pose.activate();
        odom.activate();
    }

    let promoted = slot.promote(SegmentPublication {
        calibration: Transform3D::identity(),
        pose,
        odom,
    });
    if promoted {
        info!(topic = %pose_topic, "... done, segment advertised");
    } else {
        warn!(topic = %pose_topic, "segment was already registered, ignoring duplicate");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{RegistryLookup, SegmentRegistry};

    #[tokio::test]
    async fn registration_promotes_the_slot() {
        let registry = SegmentRegistry::new();
        let bus = OutboundBus::new();
        let active = Arc::new(AtomicBool::new(true));
        let registrar = SegmentRegistrar::new(bus.clone(), "mocap", Arc::clone(&active));

        let RegistryLookup::Inserted(slot) = registry.try_lookup_or_insert("drone1", "base")
        else {
            panic!("expected Inserted");
        };
        registrar.spawn_register("drone1", "base", Arc::clone(&slot));
        registrar.drain().await;

        assert!(slot.is_ready());
        let publication = slot.publication().expect("publication must exist");
        assert!(publication.pose.is_activated());
        assert!(publication.odom.is_activated());
        assert_eq!(publication.pose.topic(), "mocap/drone1/base");
        assert_eq!(publication.odom.topic(), "mocap/drone1/base_odom");
        assert_eq!(registrar.spawned_count(), 1);
    }

    #[tokio::test]
    async fn inactive_system_leaves_channels_deactivated() {
        let bus = OutboundBus::new();
        let active = Arc::new(AtomicBool::new(false));
        let registrar = SegmentRegistrar::new(bus, "mocap", active);

        let slot = Arc::new(SegmentSlot::default());
        registrar.spawn_register("drone1", "base", Arc::clone(&slot));
        registrar.drain().await;

        // Ready for bookkeeping, but the channels wait for on_activate.
        assert!(slot.is_ready());
        assert!(!slot.publication().unwrap().pose.is_activated());
    }

    #[tokio::test]
    async fn drain_with_no_tasks_returns_immediately() {
        let registrar = SegmentRegistrar::new(
            OutboundBus::new(),
            "mocap",
            Arc::new(AtomicBool::new(true)),
        );
        registrar.drain().await;
        assert_eq!(registrar.spawned_count(), 0);
    }
}

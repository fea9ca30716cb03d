//! Per-segment pose processing and publication.
//!
//! For every tracked subject and segment the processor queries the global
//! translation and rotation, applies the occlusion and calibration rules,
//! and publishes a stamped transform plus a velocity-less odometry message.
//! A segment seen for the first time triggers lazy registration through the
//! [`SegmentRegistrar`]; the registry lookup itself is a non-blocking lock
//! attempt so the frame loop never waits on channel construction.

use chrono::{DateTime, Utc};
use mocap_middleware::{OutboundMessage, TfBroadcaster};
use mocap_source::FrameSource;
use mocap_types::msg::{Header, Odometry, Pose, PoseWithCovariance, TransformStamped};
use mocap_types::Transform3D;
use tracing::warn;

use crate::registrar::SegmentRegistrar;
use crate::registry::{RegistryLookup, SegmentRegistry};

/// Occlusion diagnostics are emitted every this many frames to avoid log
/// flooding while a subject is out of camera view.
pub const OCCLUSION_LOG_INTERVAL: u64 = 100;

/// Millimeter-to-meter conversion applied to segment translations.
///
/// Marker translations are deliberately left in source scale; see the
/// marker processor.
const MM_TO_M: f64 = 1.0 / 1000.0;

/// Iterates tracked subjects and publishes calibrated segment poses.
#[derive(Debug)]
pub struct SubjectProcessor {
    tf_ref_frame_id: String,
    broadcast_tf: bool,
    /// Free-running frame counter used only to rate-limit occlusion logs.
    frame_counter: u64,
}

impl SubjectProcessor {
    pub fn new(tf_ref_frame_id: impl Into<String>, broadcast_tf: bool) -> Self {
        Self {
            tf_ref_frame_id: tf_ref_frame_id.into(),
            broadcast_tf,
            frame_counter: 0,
        }
    }

    /// Process every subject and segment of the current frame.
    ///
    /// No per-segment failure aborts processing of sibling segments: failed
    /// queries and occlusions skip the one segment for this tick only.
    pub fn process(
        &mut self,
        source: &dyn FrameSource,
        registry: &SegmentRegistry,
        registrar: &SegmentRegistrar,
        tf: &TfBroadcaster,
        frame_time: DateTime<Utc>,
    ) {
        let mut transforms: Vec<TransformStamped> = Vec::new();

        for subject_index in 0..source.subject_count() {
            let subject_name = source.subject_name(subject_index);

            for segment_index in 0..source.segment_count(&subject_name) {
                let segment_name = source.segment_name(&subject_name, segment_index);

                let trans = source.segment_global_translation(&subject_name, &segment_name);
                let rot = source.segment_global_rotation_quaternion(&subject_name, &segment_name);

                if !trans.result.is_success() || !rot.result.is_success() {
                    warn!(
                        subject = %subject_name,
                        segment = %segment_name,
                        translation_result = %trans.result,
                        rotation_result = %rot.result,
                        "segment translation/rotation query failed, not publishing"
                    );
                    continue;
                }

                if trans.occluded || rot.occluded {
                    if self.frame_counter % OCCLUSION_LOG_INTERVAL == 0 {
                        warn!(subject = %subject_name, "occluded, not publishing ...");
                    }
                    continue;
                }

                let raw_pose = Transform3D::new(trans.value.scale(MM_TO_M), rot.value);

                match registry.try_lookup_or_insert(&subject_name, &segment_name) {
                    // Lock held by a registrar for a moment; retry next frame.
                    RegistryLookup::Contended => {}
                    RegistryLookup::Inserted(slot) => {
                        registrar.spawn_register(&subject_name, &segment_name, slot);
                    }
                    RegistryLookup::NotReady => {}
                    RegistryLookup::Ready(slot) => {
                        let Some(publication) = slot.publication() else {
                            // ready implies publication; tolerate the race anyway.
                            continue;
                        };
                        let calibrated = raw_pose.compose(publication.calibration);

                        let tf_msg = TransformStamped {
                            header: Header {
                                stamp: frame_time,
                                frame_id: self.tf_ref_frame_id.clone(),
                            },
                            child_frame_id: subject_name.clone(),
                            transform: calibrated,
                        };
                        let odom_msg = Odometry {
                            header: tf_msg.header.clone(),
                            child_frame_id: subject_name.clone(),
                            pose: PoseWithCovariance::with_default_covariance(Pose::from(
                                calibrated,
                            )),
                        };

                        if self.broadcast_tf {
                            transforms.push(tf_msg.clone());
                        }
                        publication.pose.publish(OutboundMessage::Transform(tf_msg));
                        publication.odom.publish(OutboundMessage::Odometry(odom_msg));
                    }
                }
            }
        }

        if self.broadcast_tf {
            tf.send_transforms(transforms);
        }
        self.frame_counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mocap_middleware::OutboundBus;
    use mocap_source::sim::{ScriptedFrame, ScriptedSegment, ScriptedSource, ScriptedSubject};
    use mocap_types::{Quaternion, ResultCode, Sample, Vec3};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    struct Fixture {
        source: ScriptedSource,
        registry: SegmentRegistry,
        registrar: SegmentRegistrar,
        tf: TfBroadcaster,
        bus: OutboundBus,
        processor: SubjectProcessor,
    }

    fn fixture(broadcast_tf: bool) -> Fixture {
        let bus = OutboundBus::new();
        let active = Arc::new(AtomicBool::new(true));
        Fixture {
            source: ScriptedSource::new(),
            registry: SegmentRegistry::new(),
            registrar: SegmentRegistrar::new(bus.clone(), "mocap", active),
            tf: TfBroadcaster::new(&bus),
            bus,
            processor: SubjectProcessor::new("mocap_world", broadcast_tf),
        }
    }

    fn drone_frame(number: u64, translation: Sample<Vec3>, rotation: Sample<Quaternion>) -> ScriptedFrame {
        ScriptedFrame::new(number).with_subject(
            ScriptedSubject::new("drone1")
                .with_segment(ScriptedSegment::new("base", translation, rotation)),
        )
    }

    async fn fetch(fx: &Fixture) {
        assert_eq!(fx.source.fetch_frame().await, ResultCode::Success);
    }

    fn run(fx: &mut Fixture) {
        let Fixture {
            source,
            registry,
            registrar,
            tf,
            processor,
            ..
        } = fx;
        processor.process(source, registry, registrar, tf, Utc::now());
    }

    #[tokio::test]
    async fn first_sighting_registers_exactly_once() {
        let mut fx = fixture(false);
        fx.source.push_frame(drone_frame(
            1,
            Sample::ok(Vec3::new(1000.0, 0.0, 0.0)),
            Sample::ok(Quaternion::identity()),
        ));
        fx.source.push_frame(drone_frame(
            2,
            Sample::ok(Vec3::new(1000.0, 0.0, 0.0)),
            Sample::ok(Quaternion::identity()),
        ));

        fetch(&fx).await;
        run(&mut fx);

        // Placeholder is visible immediately, before the registrar ran.
        assert_eq!(fx.registry.len(), 1);
        assert!(!fx.registry.get("drone1", "base").unwrap().is_ready());
        assert_eq!(fx.registrar.spawned_count(), 1);

        // A second frame observing the same key must not re-register.
        fetch(&fx).await;
        run(&mut fx);
        assert_eq!(fx.registrar.spawned_count(), 1);

        fx.registrar.drain().await;
        assert!(fx.registry.get("drone1", "base").unwrap().is_ready());
    }

    #[tokio::test]
    async fn publishes_calibrated_pose_in_meters() {
        let mut fx = fixture(false);
        for n in 1..=2 {
            fx.source.push_frame(drone_frame(
                n,
                Sample::ok(Vec3::new(1000.0, 2000.0, 3000.0)),
                Sample::ok(Quaternion::identity()),
            ));
        }

        fetch(&fx).await;
        run(&mut fx);
        fx.registrar.drain().await;

        let mut pose_rx = fx.bus.subscribe("mocap/drone1/base");
        let mut odom_rx = fx.bus.subscribe("mocap/drone1/base_odom");

        fetch(&fx).await;
        run(&mut fx);

        match pose_rx.recv().await.unwrap() {
            OutboundMessage::Transform(msg) => {
                assert_eq!(msg.header.frame_id, "mocap_world");
                assert_eq!(msg.child_frame_id, "drone1");
                assert_eq!(msg.transform.translation, Vec3::new(1.0, 2.0, 3.0));
            }
            other => panic!("unexpected message: {other:?}"),
        }
        match odom_rx.recv().await.unwrap() {
            OutboundMessage::Odometry(msg) => {
                assert_eq!(msg.pose.pose.position, Vec3::new(1.0, 2.0, 3.0));
                assert_eq!(msg.pose.covariance[0], 1e-4);
                assert_eq!(msg.pose.covariance[1], 0.0);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn occluded_sample_skips_publish_but_keeps_entry() {
        let mut fx = fixture(false);
        fx.source.push_frame(drone_frame(
            1,
            Sample::ok(Vec3::new(1000.0, 0.0, 0.0)),
            Sample::ok(Quaternion::identity()),
        ));
        fx.source.push_frame(drone_frame(
            2,
            Sample::occluded(Vec3::new(1000.0, 0.0, 0.0)),
            Sample::ok(Quaternion::identity()),
        ));

        fetch(&fx).await;
        run(&mut fx);
        fx.registrar.drain().await;
        let mut pose_rx = fx.bus.subscribe("mocap/drone1/base");

        fetch(&fx).await;
        run(&mut fx);

        assert!(pose_rx.try_recv().is_err(), "occluded segment must not publish");
        assert!(fx.registry.get("drone1", "base").unwrap().is_ready());
        assert_eq!(fx.registry.len(), 1);
    }

    #[tokio::test]
    async fn failed_query_skips_segment_without_registry_mutation() {
        let mut fx = fixture(false);
        fx.source.push_frame(drone_frame(
            1,
            Sample::failed(ResultCode::InvalidSegmentName),
            Sample::ok(Quaternion::identity()),
        ));

        fetch(&fx).await;
        run(&mut fx);

        assert!(fx.registry.is_empty());
        assert_eq!(fx.registrar.spawned_count(), 0);
    }

    #[tokio::test]
    async fn not_ready_entry_is_skipped() {
        let mut fx = fixture(false);
        for n in 1..=2 {
            fx.source.push_frame(drone_frame(
                n,
                Sample::ok(Vec3::new(0.0, 0.0, 0.0)),
                Sample::ok(Quaternion::identity()),
            ));
        }

        fetch(&fx).await;
        run(&mut fx);
        // Registrar deliberately not drained: the entry stays a placeholder.
        let mut pose_rx = fx.bus.subscribe("mocap/drone1/base");

        fetch(&fx).await;
        run(&mut fx);
        assert!(pose_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_tf_batches_segment_transforms() {
        let mut fx = fixture(true);
        for n in 1..=2 {
            fx.source.push_frame(drone_frame(
                n,
                Sample::ok(Vec3::new(500.0, 0.0, 0.0)),
                Sample::ok(Quaternion::identity()),
            ));
        }

        fetch(&fx).await;
        run(&mut fx);
        fx.registrar.drain().await;
        let mut tf_rx = fx.bus.subscribe(mocap_middleware::tf::TF_TOPIC);

        fetch(&fx).await;
        run(&mut fx);

        match tf_rx.recv().await.unwrap() {
            OutboundMessage::TransformBatch(batch) => {
                assert_eq!(batch.len(), 1);
                assert_eq!(batch[0].transform.translation, Vec3::new(0.5, 0.0, 0.0));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

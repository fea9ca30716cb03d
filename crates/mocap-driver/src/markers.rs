//! Labeled and unlabeled optical-marker batching.
//!
//! Builds one batch message per frame: every labeled marker of every subject
//! (occluded ones included, translations kept in raw source scale), followed
//! by the unlabeled markers.  Unlabeled markers have no identity across
//! frames; when individual transform broadcasting is enabled each one gets a
//! one-off stamped transform under a synthetic per-index child frame.

use chrono::{DateTime, Utc};
use mocap_middleware::{LifecyclePublisher, OutboundBus, OutboundMessage, QosProfile, TfBroadcaster};
use mocap_source::FrameSource;
use mocap_types::msg::{Header, Marker, MarkerList, TransformStamped};
use mocap_types::{Quaternion, Transform3D};
use tracing::{info, warn};

/// Builds and publishes the per-frame marker batch.
#[derive(Debug)]
pub struct MarkerProcessor {
    publisher: LifecyclePublisher,
    tf_ref_frame_id: String,
    tracked_frame_suffix: String,
    broadcast_tf: bool,
    marker_data_enabled: bool,
    unlabeled_marker_data_enabled: bool,
    n_markers: usize,
    n_unlabeled_markers: usize,
}

impl MarkerProcessor {
    /// Create the processor and its batch publisher on `bus`.
    ///
    /// The enable flags seed the lazy stream-enable logic: passing `true`
    /// means the corresponding stream is assumed already enabled upstream.
    pub fn new(
        bus: &OutboundBus,
        qos: QosProfile,
        tf_ref_frame_id: impl Into<String>,
        tracked_frame_suffix: impl Into<String>,
        broadcast_tf: bool,
        marker_data_enabled: bool,
        unlabeled_marker_data_enabled: bool,
    ) -> Self {
        let tracked_frame_suffix = tracked_frame_suffix.into();
        let publisher =
            bus.create_publisher(format!("{tracked_frame_suffix}/markers"), qos);
        Self {
            publisher,
            tf_ref_frame_id: tf_ref_frame_id.into(),
            tracked_frame_suffix,
            broadcast_tf,
            marker_data_enabled,
            unlabeled_marker_data_enabled,
            n_markers: 0,
            n_unlabeled_markers: 0,
        }
    }

    /// The batch publisher, for lifecycle activation.
    pub fn publisher(&self) -> &LifecyclePublisher {
        &self.publisher
    }

    /// Markers seen in the last processed frame, labeled + unlabeled.
    pub fn marker_count(&self) -> usize {
        self.n_markers
    }

    /// Unlabeled markers seen in the last processed frame.
    pub fn unlabeled_marker_count(&self) -> usize {
        self.n_unlabeled_markers
    }

    /// Build and publish the marker batch for the current frame.
    pub fn process(
        &mut self,
        source: &dyn FrameSource,
        tf: &TfBroadcaster,
        frame_time: DateTime<Utc>,
        frame_number: u64,
    ) {
        self.enable_streams(source);

        self.n_markers = 0;
        let mut markers_msg = MarkerList {
            header: Header {
                stamp: frame_time,
                frame_id: self.tf_ref_frame_id.clone(),
            },
            frame_number,
            markers: Vec::new(),
        };

        // Labeled markers: raw source-scale translation, occlusion flag
        // included unconditionally.
        for subject_index in 0..source.subject_count() {
            let subject_name = source.subject_name(subject_index);
            let subject_markers = source.marker_count(&subject_name);
            self.n_markers += subject_markers;

            for marker_index in 0..subject_markers {
                let marker_name = source.marker_name(&subject_name, marker_index);
                let segment_name = source.marker_parent_segment(&subject_name, &marker_name);
                let sample = source.marker_global_translation(&subject_name, &marker_name);

                markers_msg.markers.push(Marker {
                    marker_name,
                    subject_name: subject_name.clone(),
                    segment_name,
                    translation: sample.value,
                    occluded: sample.occluded,
                });
            }
        }

        // Unlabeled markers: translation only; a failed per-index query
        // skips that marker without aborting the batch.
        let unlabeled_count = source.unlabeled_marker_count();
        self.n_markers += unlabeled_count;
        self.n_unlabeled_markers = unlabeled_count;

        let mut broadcast_index = 0;
        for marker_index in 0..unlabeled_count {
            let sample = source.unlabeled_marker_global_translation(marker_index);
            if sample.result.is_success() {
                let marker = Marker {
                    translation: sample.value,
                    ..Marker::default()
                };
                if self.broadcast_tf {
                    self.broadcast_marker(&marker, broadcast_index, tf, frame_time);
                }
                broadcast_index += 1;
                markers_msg.markers.push(marker);
            } else {
                warn!(
                    index = marker_index,
                    result = %sample.result,
                    "unlabeled marker translation query failed"
                );
            }
        }

        if !self.publisher.is_activated() {
            warn!("marker publisher is currently inactive, messages are not delivered");
        }
        self.publisher.publish(OutboundMessage::Markers(markers_msg));
    }

    /// Enable the marker data streams on first use.  Idempotent.
    fn enable_streams(&mut self, source: &dyn FrameSource) {
        if !self.marker_data_enabled {
            self.marker_data_enabled = true;
            source.enable_marker_data();
            info!(
                enabled = source.is_marker_data_enabled(),
                "marker data stream enabled"
            );
        }
        if !self.unlabeled_marker_data_enabled {
            self.unlabeled_marker_data_enabled = true;
            source.enable_unlabeled_marker_data();
            info!(
                enabled = source.is_unlabeled_marker_data_enabled(),
                "unlabeled marker data stream enabled"
            );
        }
    }

    /// Publish a one-off transform for a single unlabeled marker.
    ///
    /// Unlabeled markers carry no orientation, so the rotation is identity;
    /// the child frame is synthetic and only stable within one frame.
    fn broadcast_marker(
        &self,
        marker: &Marker,
        marker_num: usize,
        tf: &TfBroadcaster,
        frame_time: DateTime<Utc>,
    ) {
        let transform = Transform3D::new(
            marker.translation.scale(1.0 / 1000.0),
            Quaternion::identity(),
        );
        let tf_msg = TransformStamped {
            header: Header {
                stamp: frame_time,
                frame_id: self.tf_ref_frame_id.clone(),
            },
            child_frame_id: format!("{}/marker_tf_{}", self.tracked_frame_suffix, marker_num),
            transform,
        };
        tf.send_transforms(vec![tf_msg]);
    }
}

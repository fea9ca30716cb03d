//! In-process scripted frame source for CI/CD testing without a capture
//! server.
//!
//! [`ScriptedSource`] plays back a queue of [`ScriptedFrame`]s.  Each frame
//! carries its own frame number, subjects, segment samples and markers, so a
//! test can inject dropped frames, duplicate fetches, occlusions and failed
//! queries precisely.
//!
//! # Example
//!
//! ```rust
//! use mocap_source::sim::{ScriptedFrame, ScriptedSegment, ScriptedSource, ScriptedSubject};
//! use mocap_types::{Quaternion, Sample, Vec3};
//!
//! let source = ScriptedSource::new();
//! source.push_frame(ScriptedFrame::new(1).with_subject(
//!     ScriptedSubject::new("drone1").with_segment(ScriptedSegment::new(
//!         "base",
//!         Sample::ok(Vec3::new(1000.0, 2000.0, 3000.0)),
//!         Sample::ok(Quaternion::identity()),
//!     )),
//! ));
//! ```

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use mocap_types::{Quaternion, ResultCode, Sample, StreamMode, Vec3};
use tracing::debug;

use crate::FrameSource;

/// One segment's scripted pose samples.
#[derive(Debug, Clone)]
pub struct ScriptedSegment {
    pub name: String,
    pub translation: Sample<Vec3>,
    pub rotation: Sample<Quaternion>,
}

impl ScriptedSegment {
    pub fn new(
        name: impl Into<String>,
        translation: Sample<Vec3>,
        rotation: Sample<Quaternion>,
    ) -> Self {
        Self {
            name: name.into(),
            translation,
            rotation,
        }
    }

    /// A segment at the given millimeter translation with identity rotation.
    pub fn at(name: impl Into<String>, translation_mm: Vec3) -> Self {
        Self::new(name, Sample::ok(translation_mm), Sample::ok(Quaternion::identity()))
    }
}

/// One labeled marker's scripted sample.
#[derive(Debug, Clone)]
pub struct ScriptedMarker {
    pub name: String,
    pub parent_segment: String,
    pub translation: Sample<Vec3>,
}

impl ScriptedMarker {
    pub fn new(
        name: impl Into<String>,
        parent_segment: impl Into<String>,
        translation: Sample<Vec3>,
    ) -> Self {
        Self {
            name: name.into(),
            parent_segment: parent_segment.into(),
            translation,
        }
    }
}

/// One subject with its segments and labeled markers.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSubject {
    pub name: String,
    pub segments: Vec<ScriptedSegment>,
    pub markers: Vec<ScriptedMarker>,
}

impl ScriptedSubject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_segment(mut self, segment: ScriptedSegment) -> Self {
        self.segments.push(segment);
        self
    }

    pub fn with_marker(mut self, marker: ScriptedMarker) -> Self {
        self.markers.push(marker);
        self
    }
}

/// One complete frame of scripted capture data.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFrame {
    pub number: u64,
    pub subjects: Vec<ScriptedSubject>,
    pub unlabeled_markers: Vec<Sample<Vec3>>,
}

impl ScriptedFrame {
    pub fn new(number: u64) -> Self {
        Self {
            number,
            ..Self::default()
        }
    }

    pub fn with_subject(mut self, subject: ScriptedSubject) -> Self {
        self.subjects.push(subject);
        self
    }

    pub fn with_unlabeled_marker(mut self, translation: Sample<Vec3>) -> Self {
        self.unlabeled_markers.push(translation);
        self
    }
}

#[derive(Debug, Default)]
struct SimState {
    queue: VecDeque<ScriptedFrame>,
    current: ScriptedFrame,
    connected: bool,
    stream_mode: Option<StreamMode>,
    segment_data_enabled: bool,
    marker_data_enabled: bool,
    unlabeled_marker_data_enabled: bool,
    fetch_count: u64,
}

/// A [`FrameSource`] that plays back scripted frames.
///
/// When the script runs out, [`fetch_frame`][FrameSource::fetch_frame]
/// returns [`ResultCode::NoFrame`] so the polling loop's retry path is
/// exercised too.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    state: Mutex<SimState>,
    latency: Duration,
    frame_rate: f64,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            latency: Duration::from_millis(5),
            frame_rate: 100.0,
        }
    }

    /// Override the reported total latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Append a frame to the playback queue.
    pub fn push_frame(&self, frame: ScriptedFrame) {
        self.state.lock().expect("sim lock poisoned").queue.push_back(frame);
    }

    /// Number of successful `fetch_frame` calls so far.
    pub fn fetch_count(&self) -> u64 {
        self.state.lock().expect("sim lock poisoned").fetch_count
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut SimState) -> T) -> T {
        f(&mut self.state.lock().expect("sim lock poisoned"))
    }
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn connect(&self, _host: &str) -> ResultCode {
        self.with_state(|s| {
            if s.connected {
                ResultCode::ClientAlreadyConnected
            } else {
                s.connected = true;
                ResultCode::Success
            }
        })
    }

    async fn disconnect(&self) -> ResultCode {
        self.with_state(|s| {
            s.connected = false;
            ResultCode::Success
        })
    }

    fn is_connected(&self) -> bool {
        self.with_state(|s| s.connected)
    }

    fn set_stream_mode(&self, mode: StreamMode) -> ResultCode {
        self.with_state(|s| {
            s.stream_mode = Some(mode);
            ResultCode::Success
        })
    }

    fn enable_segment_data(&self) -> ResultCode {
        self.with_state(|s| {
            s.segment_data_enabled = true;
            ResultCode::Success
        })
    }

    fn enable_marker_data(&self) -> ResultCode {
        self.with_state(|s| {
            s.marker_data_enabled = true;
            ResultCode::Success
        })
    }

    fn is_marker_data_enabled(&self) -> bool {
        self.with_state(|s| s.marker_data_enabled)
    }

    fn enable_unlabeled_marker_data(&self) -> ResultCode {
        self.with_state(|s| {
            s.unlabeled_marker_data_enabled = true;
            ResultCode::Success
        })
    }

    fn is_unlabeled_marker_data_enabled(&self) -> bool {
        self.with_state(|s| s.unlabeled_marker_data_enabled)
    }

    async fn fetch_frame(&self) -> ResultCode {
        self.with_state(|s| match s.queue.pop_front() {
            Some(frame) => {
                s.current = frame;
                s.fetch_count += 1;
                ResultCode::Success
            }
            None => {
                debug!("frame script exhausted");
                ResultCode::NoFrame
            }
        })
    }

    fn frame_number(&self) -> u64 {
        self.with_state(|s| s.current.number)
    }

    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn total_latency(&self) -> Duration {
        self.latency
    }

    fn subject_count(&self) -> usize {
        self.with_state(|s| s.current.subjects.len())
    }

    fn subject_name(&self, subject_index: usize) -> String {
        self.with_state(|s| {
            s.current
                .subjects
                .get(subject_index)
                .map(|subject| subject.name.clone())
                .unwrap_or_default()
        })
    }

    fn segment_count(&self, subject_name: &str) -> usize {
        self.with_state(|s| {
            s.current
                .subjects
                .iter()
                .find(|subject| subject.name == subject_name)
                .map(|subject| subject.segments.len())
                .unwrap_or(0)
        })
    }

    fn segment_name(&self, subject_name: &str, segment_index: usize) -> String {
        self.with_state(|s| {
            s.current
                .subjects
                .iter()
                .find(|subject| subject.name == subject_name)
                .and_then(|subject| subject.segments.get(segment_index))
                .map(|segment| segment.name.clone())
                .unwrap_or_default()
        })
    }

    fn segment_global_translation(&self, subject_name: &str, segment_name: &str) -> Sample<Vec3> {
        self.with_state(|s| {
            s.current
                .subjects
                .iter()
                .find(|subject| subject.name == subject_name)
                .and_then(|subject| {
                    subject
                        .segments
                        .iter()
                        .find(|segment| segment.name == segment_name)
                })
                .map(|segment| segment.translation)
                .unwrap_or_else(|| Sample::failed(ResultCode::InvalidSegmentName))
        })
    }

    fn segment_global_rotation_quaternion(
        &self,
        subject_name: &str,
        segment_name: &str,
    ) -> Sample<Quaternion> {
        self.with_state(|s| {
            s.current
                .subjects
                .iter()
                .find(|subject| subject.name == subject_name)
                .and_then(|subject| {
                    subject
                        .segments
                        .iter()
                        .find(|segment| segment.name == segment_name)
                })
                .map(|segment| segment.rotation)
                .unwrap_or(Sample {
                    result: ResultCode::InvalidSegmentName,
                    occluded: false,
                    value: Quaternion::identity(),
                })
        })
    }

    fn marker_count(&self, subject_name: &str) -> usize {
        self.with_state(|s| {
            s.current
                .subjects
                .iter()
                .find(|subject| subject.name == subject_name)
                .map(|subject| subject.markers.len())
                .unwrap_or(0)
        })
    }

    fn marker_name(&self, subject_name: &str, marker_index: usize) -> String {
        self.with_state(|s| {
            s.current
                .subjects
                .iter()
                .find(|subject| subject.name == subject_name)
                .and_then(|subject| subject.markers.get(marker_index))
                .map(|marker| marker.name.clone())
                .unwrap_or_default()
        })
    }

    fn marker_parent_segment(&self, subject_name: &str, marker_name: &str) -> String {
        self.with_state(|s| {
            s.current
                .subjects
                .iter()
                .find(|subject| subject.name == subject_name)
                .and_then(|subject| subject.markers.iter().find(|m| m.name == marker_name))
                .map(|marker| marker.parent_segment.clone())
                .unwrap_or_default()
        })
    }

    fn marker_global_translation(&self, subject_name: &str, marker_name: &str) -> Sample<Vec3> {
        self.with_state(|s| {
            s.current
                .subjects
                .iter()
                .find(|subject| subject.name == subject_name)
                .and_then(|subject| subject.markers.iter().find(|m| m.name == marker_name))
                .map(|marker| marker.translation)
                .unwrap_or_else(|| Sample::failed(ResultCode::InvalidMarkerName))
        })
    }

    fn unlabeled_marker_count(&self) -> usize {
        self.with_state(|s| s.current.unlabeled_markers.len())
    }

    fn unlabeled_marker_global_translation(&self, marker_index: usize) -> Sample<Vec3> {
        self.with_state(|s| {
            s.current
                .unlabeled_markers
                .get(marker_index)
                .copied()
                .unwrap_or_else(|| Sample::failed(ResultCode::InvalidIndex))
        })
    }
}

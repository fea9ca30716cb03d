//! `mocap-source` – the frame-source adapter seam.
//!
//! The bridge never talks to a capture server directly.  It drives the
//! [`FrameSource`] trait, which models the vendor SDK's output contract: a
//! blocking "get next frame" call plus per-frame queries for subjects,
//! segments and optical markers.  [`sim`] provides scripted in-process
//! sources so the full pipeline runs in headless tests and CI without a
//! capture server.

use std::time::Duration;

use async_trait::async_trait;
use mocap_types::{Quaternion, ResultCode, Sample, StreamMode, Vec3};

pub mod sim;

pub use sim::ScriptedSource;

/// Output contract of the capture server.
///
/// # Contract
///
/// * [`fetch_frame`][Self::fetch_frame] blocks (asynchronously) until the
///   next frame is available and returns its result code; all other frame
///   queries read the most recently fetched frame.
/// * Translation samples are in the source's native millimeter scale.
/// * Every per-sample query returns a [`Sample`]: result code and occlusion
///   flag are independent.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Connect to the capture server at `host`.
    async fn connect(&self, host: &str) -> ResultCode;

    /// Disconnect from the capture server.
    async fn disconnect(&self) -> ResultCode;

    /// Whether a connection is currently established.
    fn is_connected(&self) -> bool;

    /// Select push or pull frame delivery.
    fn set_stream_mode(&self, mode: StreamMode) -> ResultCode;

    /// Enable per-segment pose data.
    fn enable_segment_data(&self) -> ResultCode;

    /// Enable labeled marker data.  Idempotent.
    fn enable_marker_data(&self) -> ResultCode;
    fn is_marker_data_enabled(&self) -> bool;

    /// Enable unlabeled marker data.  Idempotent.
    fn enable_unlabeled_marker_data(&self) -> ResultCode;
    fn is_unlabeled_marker_data_enabled(&self) -> bool;

    /// Block until the next frame is available.
    async fn fetch_frame(&self) -> ResultCode;

    /// Monotonic frame counter of the current frame.
    fn frame_number(&self) -> u64;

    /// Capture rate reported by the server, in Hz.
    fn frame_rate(&self) -> f64;

    /// Total latency the server reports for the current frame.
    fn total_latency(&self) -> Duration;

    // ── Subjects and segments ────────────────────────────────────────────

    fn subject_count(&self) -> usize;
    fn subject_name(&self, subject_index: usize) -> String;
    fn segment_count(&self, subject_name: &str) -> usize;
    fn segment_name(&self, subject_name: &str, segment_index: usize) -> String;

    /// Global translation of a segment, millimeter scale.
    fn segment_global_translation(&self, subject_name: &str, segment_name: &str) -> Sample<Vec3>;

    /// Global rotation of a segment as a quaternion.
    fn segment_global_rotation_quaternion(
        &self,
        subject_name: &str,
        segment_name: &str,
    ) -> Sample<Quaternion>;

    // ── Markers ──────────────────────────────────────────────────────────

    fn marker_count(&self, subject_name: &str) -> usize;
    fn marker_name(&self, subject_name: &str, marker_index: usize) -> String;
    fn marker_parent_segment(&self, subject_name: &str, marker_name: &str) -> String;

    /// Global translation of a labeled marker, millimeter scale.
    fn marker_global_translation(&self, subject_name: &str, marker_name: &str) -> Sample<Vec3>;

    fn unlabeled_marker_count(&self) -> usize;

    /// Global translation of an unlabeled marker by index, millimeter scale.
    fn unlabeled_marker_global_translation(&self, marker_index: usize) -> Sample<Vec3>;
}

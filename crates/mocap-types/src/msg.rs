//! Stamped output messages published by the bridge.
//!
//! These mirror the downstream consumer's message shapes: a stamped
//! transform per tracked segment, a companion odometry message, and a batch
//! marker list per frame.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transform::{Quaternion, Transform3D, Vec3};

/// Common message header: capture timestamp plus reference frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub stamp: DateTime<Utc>,
    pub frame_id: String,
}

/// A timestamped rigid transform from `header.frame_id` to `child_frame_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformStamped {
    pub header: Header,
    pub child_frame_id: String,
    pub transform: Transform3D,
}

/// Position + orientation, translation in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quaternion,
}

impl From<Transform3D> for Pose {
    fn from(t: Transform3D) -> Self {
        Self {
            position: t.translation,
            orientation: t.rotation,
        }
    }
}

/// A pose with a row-major 6x6 covariance matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseWithCovariance {
    pub pose: Pose,
    #[serde(with = "serde_arrays")]
    pub covariance: [f64; 36],
}

/// Variance placed on the diagonal of the fixed odometry covariance.
// TODO: source the covariance from the capture server's residual estimate
// once the vendor exposes it instead of this constant.
pub const DEFAULT_POSE_VARIANCE: f64 = 1e-4;

impl PoseWithCovariance {
    /// Wrap `pose` with the fixed diagonal covariance the bridge publishes.
    pub fn with_default_covariance(pose: Pose) -> Self {
        let mut covariance = [0.0; 36];
        for i in (0..36).step_by(7) {
            covariance[i] = DEFAULT_POSE_VARIANCE;
        }
        Self { pose, covariance }
    }
}

/// Velocity-less odometry companion to the per-segment transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Odometry {
    pub header: Header,
    pub child_frame_id: String,
    pub pose: PoseWithCovariance,
}

/// One optical marker sample.
///
/// For unlabeled markers only `translation` is populated; they carry no
/// stable identity across frames.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Marker {
    pub marker_name: String,
    pub subject_name: String,
    pub segment_name: String,
    /// Raw source-scale translation (millimeters, unconverted).
    pub translation: Vec3,
    pub occluded: bool,
}

/// Batch of every marker seen in one frame, labeled then unlabeled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerList {
    pub header: Header,
    pub frame_number: u64,
    pub markers: Vec<Marker>,
}

// Serde cannot derive for arrays longer than 32 elements; (de)serialize the
// covariance as a plain sequence.
mod serde_arrays {
    use serde::de::{Error, SeqAccess, Visitor};
    use serde::ser::SerializeTuple;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(arr: &[f64; 36], ser: S) -> Result<S::Ok, S::Error> {
        let mut tup = ser.serialize_tuple(36)?;
        for v in arr {
            tup.serialize_element(v)?;
        }
        tup.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<[f64; 36], D::Error> {
        struct ArrayVisitor;

        impl<'de> Visitor<'de> for ArrayVisitor {
            type Value = [f64; 36];

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a sequence of 36 floats")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut arr = [0.0; 36];
                for (i, slot) in arr.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| A::Error::invalid_length(i, &self))?;
                }
                Ok(arr)
            }
        }

        de.deserialize_tuple(36, ArrayVisitor)
    }
}

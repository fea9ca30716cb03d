//! `mocap-types` – shared types for the motion-capture bridge.
//!
//! Everything that crosses a crate boundary lives here: the rigid-transform
//! math ([`transform`]), the stamped output messages ([`msg`]), the vendor
//! result taxonomy ([`ResultCode`]) and the workspace-wide error enum
//! ([`BridgeError`]).

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod msg;
pub mod transform;

pub use msg::{Header, Marker, MarkerList, Odometry, Pose, PoseWithCovariance, TransformStamped};
pub use transform::{Quaternion, Transform3D, Vec3};

/// Result codes reported by the capture server for every query.
///
/// Mirrors the vendor SDK result taxonomy; anything the bridge does not
/// recognise maps to [`ResultCode::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultCode {
    Success,
    NoFrame,
    NotConnected,
    ClientAlreadyConnected,
    ClientConnectionFailed,
    InvalidHostName,
    InvalidSubjectName,
    InvalidSegmentName,
    InvalidMarkerName,
    InvalidIndex,
    NotImplemented,
    Unknown,
}

impl ResultCode {
    /// `true` only for [`ResultCode::Success`].
    pub fn is_success(self) -> bool {
        matches!(self, ResultCode::Success)
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResultCode::Success => "Success",
            ResultCode::NoFrame => "NoFrame",
            ResultCode::NotConnected => "NotConnected",
            ResultCode::ClientAlreadyConnected => "ClientAlreadyConnected",
            ResultCode::ClientConnectionFailed => "ClientConnectionFailed",
            ResultCode::InvalidHostName => "InvalidHostName",
            ResultCode::InvalidSubjectName => "InvalidSubjectName",
            ResultCode::InvalidSegmentName => "InvalidSegmentName",
            ResultCode::InvalidMarkerName => "InvalidMarkerName",
            ResultCode::InvalidIndex => "InvalidIndex",
            ResultCode::NotImplemented => "NotImplemented",
            ResultCode::Unknown => "Unknown",
        };
        write!(f, "{name}")
    }
}

/// Output shape of every per-sample query to the capture server.
///
/// `result` and `occluded` are independent: a query can succeed while the
/// sample itself is occluded (the server could not resolve it this frame).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample<T> {
    pub result: ResultCode,
    pub occluded: bool,
    pub value: T,
}

impl<T> Sample<T> {
    /// A successful, non-occluded sample.
    pub fn ok(value: T) -> Self {
        Self {
            result: ResultCode::Success,
            occluded: false,
            value,
        }
    }

    /// A successful sample flagged as occluded.
    pub fn occluded(value: T) -> Self {
        Self {
            result: ResultCode::Success,
            occluded: true,
            value,
        }
    }

    /// A failed query carrying the given result code.
    pub fn failed(result: ResultCode) -> Self
    where
        T: Default,
    {
        Self {
            result,
            occluded: false,
            value: T::default(),
        }
    }
}

/// How the capture server delivers frames to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamMode {
    /// The server pushes every frame as it is captured.
    ServerPush,
    /// The client pulls the latest frame on demand.
    ClientPull,
}

impl std::str::FromStr for StreamMode {
    type Err = BridgeError;

    /// Parse the configured stream-mode string.
    ///
    /// An unrecognised value is a misconfiguration the bridge cannot resolve
    /// on its own, so it surfaces as a fatal [`BridgeError::Config`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ServerPush" => Ok(StreamMode::ServerPush),
            "ClientPull" => Ok(StreamMode::ClientPull),
            other => Err(BridgeError::Config(format!(
                "unknown stream mode '{other}' -- options are ServerPush, ClientPull"
            ))),
        }
    }
}

impl std::fmt::Display for StreamMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamMode::ServerPush => write!(f, "ServerPush"),
            StreamMode::ClientPull => write!(f, "ClientPull"),
        }
    }
}

/// Global error type spanning configuration faults, capture-server query
/// failures and publish-layer channel errors.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{call} failed (result = {code})")]
    Source { call: String, code: ResultCode },

    #[error("Channel error: {0}")]
    Channel(String),
}

impl BridgeError {
    /// Shorthand for a failed capture-server call.
    pub fn source(call: impl Into<String>, code: ResultCode) -> Self {
        BridgeError::Source {
            call: call.into(),
            code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn result_code_display() {
        assert_eq!(ResultCode::Success.to_string(), "Success");
        assert_eq!(ResultCode::InvalidSegmentName.to_string(), "InvalidSegmentName");
    }

    #[test]
    fn stream_mode_parses_known_values() {
        assert_eq!(StreamMode::from_str("ServerPush").unwrap(), StreamMode::ServerPush);
        assert_eq!(StreamMode::from_str("ClientPull").unwrap(), StreamMode::ClientPull);
    }

    #[test]
    fn stream_mode_rejects_unknown_value() {
        let err = StreamMode::from_str("Multicast").unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
        assert!(err.to_string().contains("Multicast"));
    }

    #[test]
    fn sample_constructors() {
        let s = Sample::ok(1.0_f64);
        assert!(s.result.is_success());
        assert!(!s.occluded);

        let o = Sample::occluded(2.0_f64);
        assert!(o.result.is_success());
        assert!(o.occluded);

        let f: Sample<f64> = Sample::failed(ResultCode::InvalidIndex);
        assert!(!f.result.is_success());
    }

    #[test]
    fn bridge_error_display() {
        let err = BridgeError::source("segment_global_translation", ResultCode::InvalidSegmentName);
        assert!(err.to_string().contains("segment_global_translation"));
        assert!(err.to_string().contains("InvalidSegmentName"));
    }
}

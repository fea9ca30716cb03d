//! Driver configuration, read from a toml file.

use std::path::Path;

use mocap_types::{BridgeError, StreamMode};
use serde::{Deserialize, Serialize};
use tracing::info;

/// All driver tunables, with the transport-layer QoS selectors included.
///
/// Every field has a default so a partial config file works; an empty file
/// yields a fully defaulted configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// "ServerPush" or "ClientPull".  Validated at configure time; any other
    /// value is a fatal configuration error.
    #[serde(default = "default_stream_mode")]
    pub stream_mode: String,

    /// Capture-server address, `host:port`.
    #[serde(default = "default_host_name")]
    pub host_name: String,

    /// Reference frame id stamped on every published transform.
    #[serde(default = "default_tf_ref_frame_id")]
    pub tf_ref_frame_id: String,

    /// Prefix for every output topic (`<suffix>/<subject>/<segment>`).
    #[serde(default = "default_tracked_frame_suffix")]
    pub tracked_frame_suffix: String,

    #[serde(default)]
    pub publish_markers: bool,

    #[serde(default)]
    pub publish_subjects: bool,

    /// Seed for the lazy labeled-marker stream enable.
    #[serde(default)]
    pub marker_data_enabled: bool,

    /// Seed for the lazy unlabeled-marker stream enable.
    #[serde(default)]
    pub unlabeled_marker_data_enabled: bool,

    /// Broadcast per-segment and per-marker transforms on the tf channel.
    #[serde(default)]
    pub broadcast_tf: bool,

    #[serde(default = "default_qos_history_policy")]
    pub qos_history_policy: String,

    #[serde(default = "default_qos_reliability_policy")]
    pub qos_reliability_policy: String,

    #[serde(default = "default_qos_depth")]
    pub qos_depth: usize,
}

fn default_stream_mode() -> String {
    "ClientPull".to_string()
}

fn default_host_name() -> String {
    "192.168.10.1:801".to_string()
}

fn default_tf_ref_frame_id() -> String {
    "mocap_world".to_string()
}

fn default_tracked_frame_suffix() -> String {
    "mocap".to_string()
}

fn default_qos_history_policy() -> String {
    "keep_all".to_string()
}

fn default_qos_reliability_policy() -> String {
    "best_effort".to_string()
}

fn default_qos_depth() -> usize {
    10
}

impl Default for DriverConfig {
    fn default() -> Self {
        toml::from_str("").expect("empty config must deserialize via field defaults")
    }
}

impl DriverConfig {
    /// Parse a toml configuration string.
    pub fn from_toml_str(s: &str) -> Result<Self, BridgeError> {
        toml::from_str(s).map_err(|e| BridgeError::Config(format!("invalid config: {e}")))
    }

    /// Load the configuration from a toml file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate the configured stream mode.
    pub fn stream_mode(&self) -> Result<StreamMode, BridgeError> {
        self.stream_mode.parse()
    }

    /// Log every parameter at info level, the way the driver has always
    /// announced its configuration on configure.
    pub fn log_parameters(&self) {
        info!(stream_mode = %self.stream_mode, "param stream_mode");
        info!(host_name = %self.host_name, "param host_name");
        info!(tf_ref_frame_id = %self.tf_ref_frame_id, "param tf_ref_frame_id");
        info!(tracked_frame_suffix = %self.tracked_frame_suffix, "param tracked_frame_suffix");
        info!(publish_markers = self.publish_markers, "param publish_markers");
        info!(publish_subjects = self.publish_subjects, "param publish_subjects");
        info!(marker_data_enabled = self.marker_data_enabled, "param marker_data_enabled");
        info!(
            unlabeled_marker_data_enabled = self.unlabeled_marker_data_enabled,
            "param unlabeled_marker_data_enabled"
        );
        info!(broadcast_tf = self.broadcast_tf, "param broadcast_tf");
        info!(qos_history_policy = %self.qos_history_policy, "param qos_history_policy");
        info!(qos_reliability_policy = %self.qos_reliability_policy, "param qos_reliability_policy");
        info!(qos_depth = self.qos_depth, "param qos_depth");
    }
}

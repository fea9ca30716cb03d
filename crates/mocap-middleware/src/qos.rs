//! Quality-of-service profiles for outbound channels.
//!
//! The bridge exposes the same three selectors the transport layer offers:
//! history (keep-all vs keep-last), depth, and reliability.  Internally a
//! profile only determines the broadcast-channel capacity; reliability is
//! recorded so subscribers can decide how to treat lagged receivers.

use mocap_types::BridgeError;
use serde::{Deserialize, Serialize};

/// Channel capacity used for keep-all history.  Broadcast channels need a
/// finite bound; this is large enough that a keep-all subscriber only lags
/// when it has effectively stopped consuming.
const KEEP_ALL_CAPACITY: usize = 4096;

/// How many messages are retained for a subscriber that falls behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryPolicy {
    /// Retain every message up to the internal bound.
    KeepAll,
    /// Retain only the most recent `depth` messages.
    KeepLast,
}

/// Delivery guarantee requested from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReliabilityPolicy {
    Reliable,
    BestEffort,
}

/// A (history, depth, reliability) triple applied at channel creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QosProfile {
    pub history: HistoryPolicy,
    pub depth: usize,
    pub reliability: ReliabilityPolicy,
}

impl QosProfile {
    /// Profile suited to high-rate sensor streams: best-effort, keep-last 10.
    pub fn sensor_data() -> Self {
        Self {
            history: HistoryPolicy::KeepLast,
            depth: 10,
            reliability: ReliabilityPolicy::BestEffort,
        }
    }

    /// Keep-last profile with an explicit depth.
    pub fn keep_last(depth: usize) -> Self {
        Self {
            history: HistoryPolicy::KeepLast,
            depth,
            reliability: ReliabilityPolicy::Reliable,
        }
    }

    /// Build a profile from the three configured selector strings.
    pub fn from_policies(
        history: &str,
        reliability: &str,
        depth: usize,
    ) -> Result<Self, BridgeError> {
        let history = match history {
            "keep_all" => HistoryPolicy::KeepAll,
            "keep_last" => HistoryPolicy::KeepLast,
            other => {
                return Err(BridgeError::Config(format!(
                    "unknown qos history policy '{other}' -- options are keep_all, keep_last"
                )));
            }
        };
        let reliability = match reliability {
            "reliable" => ReliabilityPolicy::Reliable,
            "best_effort" => ReliabilityPolicy::BestEffort,
            other => {
                return Err(BridgeError::Config(format!(
                    "unknown qos reliability policy '{other}' -- options are reliable, best_effort"
                )));
            }
        };
        Ok(Self {
            history,
            depth,
            reliability,
        })
    }

    /// Broadcast-channel capacity implied by this profile.
    ///
    /// Tokio broadcast channels panic on zero capacity, so a configured
    /// depth of 0 is clamped to 1.
    pub fn capacity(&self) -> usize {
        match self.history {
            HistoryPolicy::KeepAll => KEEP_ALL_CAPACITY,
            HistoryPolicy::KeepLast => self.depth.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_data_preset() {
        let qos = QosProfile::sensor_data();
        assert_eq!(qos.history, HistoryPolicy::KeepLast);
        assert_eq!(qos.depth, 10);
        assert_eq!(qos.reliability, ReliabilityPolicy::BestEffort);
        assert_eq!(qos.capacity(), 10);
    }

    #[test]
    fn keep_all_ignores_depth_for_capacity() {
        let qos = QosProfile::from_policies("keep_all", "best_effort", 10).unwrap();
        assert_eq!(qos.capacity(), KEEP_ALL_CAPACITY);
    }

    #[test]
    fn zero_depth_clamped() {
        let qos = QosProfile::keep_last(0);
        assert_eq!(qos.capacity(), 1);
    }

    #[test]
    fn unknown_policy_strings_rejected() {
        assert!(QosProfile::from_policies("keep_some", "reliable", 10).is_err());
        assert!(QosProfile::from_policies("keep_all", "mostly", 10).is_err());
    }
}

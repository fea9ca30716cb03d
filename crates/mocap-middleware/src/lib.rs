//! `mocap-middleware` – the bridge's publish layer.
//!
//! Routes outbound messages from the frame pipeline to downstream consumers
//! without caring about where the data came from.
//!
//! # Modules
//!
//! - [`bus`] – topic-keyed publish/subscribe bus built on Tokio broadcast
//!   channels, with lifecycle-gated publisher handles.
//! - [`qos`] – history/reliability/depth profiles that size the channels.
//! - [`tf`] – batch transform broadcaster.

pub mod bus;
pub mod qos;
pub mod tf;

pub use bus::{LifecyclePublisher, OutboundBus, OutboundMessage};
pub use qos::{HistoryPolicy, QosProfile, ReliabilityPolicy};
pub use tf::TfBroadcaster;

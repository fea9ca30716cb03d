//! `mocap-driver` – the frame-processing and segment-publication pipeline.
//!
//! Pulls frames from a [`FrameSource`][mocap_source::FrameSource], accounts
//! for dropped frames, converts per-segment pose samples into calibrated
//! stamped transforms and odometry, batches optical markers, and lazily
//! registers output channels for newly discovered segments without ever
//! blocking the polling loop.
//!
//! # Modules
//!
//! - [`stats`] – frame counter and dropped-frame accounting.
//! - [`registry`] – the concurrently accessed segment registry.
//! - [`registrar`] – asynchronous output-channel construction.
//! - [`subjects`] – per-segment pose processing and publication.
//! - [`markers`] – labeled/unlabeled marker batching.
//! - [`config`] – toml-backed driver configuration.
//! - [`driver`] – the polling-loop orchestrator and lifecycle hooks.

pub mod config;
pub mod driver;
pub mod markers;
pub mod registrar;
pub mod registry;
pub mod stats;
pub mod subjects;

pub use config::DriverConfig;
pub use driver::MocapDriver;
pub use registrar::SegmentRegistrar;
pub use registry::{RegistryLookup, SegmentRegistry};
pub use stats::FrameStats;

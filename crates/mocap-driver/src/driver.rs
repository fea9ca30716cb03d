//! The polling-loop orchestrator and lifecycle hooks.
//!
//! [`MocapDriver`] owns the whole pipeline: the frame source, frame
//! statistics, both processors, the segment registry and the registrar.  The
//! lifecycle host drives it through [`on_configure`][MocapDriver::on_configure],
//! [`on_activate`][MocapDriver::on_activate] and
//! [`on_deactivate`][MocapDriver::on_deactivate]; after activation the host
//! awaits [`run`][MocapDriver::run], which connects to the capture server and
//! polls until the shared running flag is cleared.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mocap_middleware::{OutboundBus, QosProfile, TfBroadcaster};
use mocap_source::FrameSource;
use mocap_types::BridgeError;
use tracing::{info, warn};

use crate::config::DriverConfig;
use crate::markers::MarkerProcessor;
use crate::registrar::SegmentRegistrar;
use crate::registry::SegmentRegistry;
use crate::stats::FrameStats;
use crate::subjects::SubjectProcessor;

/// Fixed interval between frame-fetch retries while the source is unready.
const FETCH_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Orchestrates frame fetching, processing and lifecycle transitions.
pub struct MocapDriver {
    config: DriverConfig,
    source: Arc<dyn FrameSource>,
    bus: OutboundBus,
    stats: FrameStats,
    registry: SegmentRegistry,
    registrar: SegmentRegistrar,
    subjects: SubjectProcessor,
    /// Created on configure, once the QoS selectors are validated.
    markers: Option<MarkerProcessor>,
    tf: Option<TfBroadcaster>,
    active: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl MocapDriver {
    pub fn new(config: DriverConfig, source: Arc<dyn FrameSource>) -> Self {
        let bus = OutboundBus::new();
        let active = Arc::new(AtomicBool::new(false));
        let registrar = SegmentRegistrar::new(
            bus.clone(),
            config.tracked_frame_suffix.clone(),
            Arc::clone(&active),
        );
        let subjects = SubjectProcessor::new(config.tf_ref_frame_id.clone(), config.broadcast_tf);
        Self {
            config,
            source,
            bus,
            stats: FrameStats::new(),
            registry: SegmentRegistry::new(),
            registrar,
            subjects,
            markers: None,
            tf: None,
            active,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// The outbound bus, for attaching subscribers.
    pub fn bus(&self) -> &OutboundBus {
        &self.bus
    }

    pub fn registry(&self) -> &SegmentRegistry {
        &self.registry
    }

    pub fn registrar(&self) -> &SegmentRegistrar {
        &self.registrar
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Shared flag that stops the polling loop when cleared.  Hand a clone
    /// to the signal handler.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Apply configuration: validate and set the stream mode, enable segment
    /// data, and create the frame-level output channels.
    ///
    /// # Errors
    ///
    /// An unrecognised stream mode or QoS selector is a fatal
    /// [`BridgeError::Config`]; the process cannot resolve it and should
    /// terminate.
    pub fn on_configure(&mut self) -> Result<(), BridgeError> {
        self.config.log_parameters();

        let mode = self.config.stream_mode()?;
        let result = self.source.set_stream_mode(mode);
        info!(mode = %mode, result = %result, "setting stream mode");

        let result = self.source.enable_segment_data();
        info!(result = %result, "segment data enabled");

        let qos = QosProfile::from_policies(
            &self.config.qos_history_policy,
            &self.config.qos_reliability_policy,
            self.config.qos_depth,
        )?;

        self.tf = Some(TfBroadcaster::new(&self.bus));
        self.markers = Some(MarkerProcessor::new(
            &self.bus,
            qos,
            self.config.tf_ref_frame_id.clone(),
            self.config.tracked_frame_suffix.clone(),
            self.config.broadcast_tf,
            self.config.marker_data_enabled,
            self.config.unlabeled_marker_data_enabled,
        ));

        info!("configured");
        Ok(())
    }

    /// Activate all output channels and mark registered segments ready.
    ///
    /// After this the host awaits [`run`][Self::run] to connect and poll.
    pub fn on_activate(&mut self) {
        self.active.store(true, Ordering::Release);
        if let Some(markers) = self.markers.as_ref() {
            markers.publisher().activate();
        }
        self.registry.activate_all();
        info!("activated");
    }

    /// Deactivate all output channels and mark every segment not ready.
    pub fn on_deactivate(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(markers) = self.markers.as_ref() {
            markers.publisher().deactivate();
        }
        self.registry.deactivate_all();
        info!("deactivated");
    }

    /// Connect to the capture server and poll frames until stopped.
    pub async fn run(&mut self) -> Result<(), BridgeError> {
        warn!(host = %self.config.host_name, "trying to connect to capture server ...");
        let code = self.source.connect(&self.config.host_name).await;
        if !code.is_success() {
            info!(result = %code, "... not connected");
            return Err(BridgeError::source("connect", code));
        }
        info!("... connected");

        self.poll().await;
        Ok(())
    }

    /// Stop polling, wait for in-flight registrations, and disconnect.
    pub async fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        self.registrar.drain().await;
        info!("disconnecting from capture server");
        self.source.disconnect().await;
        info!("... disconnected");
    }

    async fn poll(&mut self) {
        while self.running.load(Ordering::Acquire) {
            // Transient source unavailability: retry at a fixed interval,
            // never escalate.
            while self.running.load(Ordering::Acquire)
                && !self.source.fetch_frame().await.is_success()
            {
                warn!("fetch_frame returned no frame");
                tokio::time::sleep(FETCH_RETRY_INTERVAL).await;
            }
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            self.process_frame(Utc::now());
        }
    }

    /// Process the most recently fetched frame.
    ///
    /// A zero frame delta means a duplicate fetch; the frame is dropped
    /// before any downstream processing or registry access.
    pub fn process_frame(&mut self, now: DateTime<Utc>) {
        let frame_number = self.source.frame_number();
        let tick = self.stats.observe(frame_number);
        if tick.is_duplicate() {
            return;
        }

        // Stamp messages with the capture instant, not the arrival instant.
        let latency = chrono::Duration::from_std(self.source.total_latency())
            .unwrap_or_else(|_| chrono::Duration::zero());
        let frame_time = now - latency;

        let Some(tf) = self.tf.as_ref() else {
            // Not configured yet; nothing to publish on.
            return;
        };

        if self.config.publish_markers
            && let Some(markers) = self.markers.as_mut()
        {
            markers.process(self.source.as_ref(), tf, frame_time, frame_number);
        }

        if self.config.publish_subjects {
            self.subjects.process(
                self.source.as_ref(),
                &self.registry,
                &self.registrar,
                tf,
                frame_time,
            );
        }
    }
}

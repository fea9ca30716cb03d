//! `mocapd` – motion-capture bridge daemon.
//!
//! Entry point for the bridge stack.  Loads the driver configuration from a
//! toml file (first CLI argument, or `MOCAP_CONFIG`), wires the pipeline and
//! runs the polling loop until Ctrl-C.
//!
//! Without a real capture server linked in, the daemon runs against the
//! scripted replay source so the whole pipeline can be exercised headlessly:
//! a synthetic rigid body circles the origin with occasional occlusions and
//! a dropped frame, and every published message is logged by a subscriber
//! task.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use mocap_driver::{DriverConfig, MocapDriver};
use mocap_middleware::{OutboundBus, OutboundMessage};
use mocap_source::sim::{ScriptedFrame, ScriptedSegment, ScriptedSource, ScriptedSubject};
use mocap_types::{Quaternion, Sample, Vec3};
use tracing::{error, info, warn};

/// Number of synthetic frames scripted for the replay source.
const DEMO_FRAMES: u64 = 1000;

#[tokio::main]
async fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG controls the filter (default "info"); MOCAP_LOG_FORMAT=json
    // emits newline-delimited JSON for log aggregators.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("MOCAP_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    // ── Configuration ─────────────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("MOCAP_CONFIG").ok());
    let config = match config_path {
        Some(path) => match DriverConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                // Misconfiguration cannot be resolved automatically.
                error!(path = %path, error = %e, "fatal configuration error");
                std::process::exit(1);
            }
        },
        None => DriverConfig {
            publish_subjects: true,
            publish_markers: true,
            broadcast_tf: true,
            ..DriverConfig::default()
        },
    };

    let markers_topic = format!("{}/markers", config.tracked_frame_suffix);
    let source = Arc::new(demo_source());
    let mut driver = MocapDriver::new(config, source);

    if let Err(e) = driver.on_configure() {
        error!(error = %e, "fatal configuration error");
        std::process::exit(1);
    }

    spawn_output_logger(driver.bus(), &markers_topic);

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let stop = driver.stop_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        warn!("Ctrl-C received, stopping the polling loop");
        stop.store(false, Ordering::Release);
    }) {
        error!(error = %e, "failed to install Ctrl-C handler");
        std::process::exit(1);
    }

    driver.on_activate();
    if let Err(e) = driver.run().await {
        error!(error = %e, "capture server connection failed");
    }
    driver.on_deactivate();
    driver.shutdown().await;
    info!("bridge stopped");
}

/// Log every message published on the bus, one subscriber per frame-level
/// topic.  Per-segment topics are discovered lazily, so the logger listens
/// on the batch channels that always exist.
fn spawn_output_logger(bus: &OutboundBus, markers_topic: &str) {
    let mut markers_rx = bus.subscribe(markers_topic);
    let mut tf_rx = bus.subscribe(mocap_middleware::tf::TF_TOPIC);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = markers_rx.recv() => match msg {
                    Ok(OutboundMessage::Markers(m)) => {
                        info!(frame = m.frame_number, markers = m.markers.len(), "marker batch");
                    }
                    Ok(_) => {}
                    Err(_) => break,
                },
                msg = tf_rx.recv() => match msg {
                    Ok(OutboundMessage::TransformBatch(batch)) => {
                        info!(transforms = batch.len(), "tf broadcast");
                    }
                    Ok(_) => {}
                    Err(_) => break,
                },
            }
        }
    });
}

/// Script a synthetic capture session: one rigid body circling the origin,
/// an occlusion window, one dropped frame, and a pair of unlabeled markers.
fn demo_source() -> ScriptedSource {
    let source = ScriptedSource::new();
    let mut frame_number = 0u64;

    for i in 0..DEMO_FRAMES {
        frame_number += 1;
        // One simulated drop partway through the session.
        if i == DEMO_FRAMES / 2 {
            frame_number += 2;
        }

        let angle = i as f64 * 0.02;
        let translation = Vec3::new(1000.0 * angle.cos(), 1000.0 * angle.sin(), 1500.0);
        let occluded = (100..110).contains(&i);
        let translation_sample = if occluded {
            Sample::occluded(translation)
        } else {
            Sample::ok(translation)
        };

        source.push_frame(
            ScriptedFrame::new(frame_number)
                .with_subject(ScriptedSubject::new("drone1").with_segment(
                    ScriptedSegment::new(
                        "base",
                        translation_sample,
                        Sample::ok(Quaternion::identity()),
                    ),
                ))
                .with_unlabeled_marker(Sample::ok(translation.scale(0.5)))
                .with_unlabeled_marker(Sample::ok(translation.scale(0.25))),
        );
    }
    source
}

//! Hazard detection pipeline: sample a frame, ask the remote detector, draw
//! the overlay, track per-mode results, and persist positive events.
//!
//! The module is split into focused submodules:
//! - `config`: CLI configuration parsing.
//! - `cycle`: The detection-cycle orchestrator.
//! - `state`: Mode cycling and per-mode hazard flags.
//! - `overlay`: Bounding-box and label drawing.
//! - `persistence`: Detection event records and the object store sink.
//! - `telemetry`: Tracing subscriber and Prometheus recorder setup.

use std::sync::Arc;

use anyhow::{Context, Result};
use ml_core::InferenceClient;
use video_ingest::{FrameSampler, VideoSource};

pub mod config;
pub mod cycle;
mod glyphs;
pub mod overlay;
pub mod persistence;
pub mod state;
pub mod telemetry;

use config::HazardConfig;
use cycle::HazardMonitor;
use persistence::{DisabledSink, ObjectStoreSink, PersistenceSink};

/// Wire a monitor from configuration around an already running frame source.
pub fn build_monitor(config: &HazardConfig, source: Arc<dyn VideoSource>) -> Result<HazardMonitor> {
    let detector = InferenceClient::new(config.inference.clone())
        .context("failed to build inference client")?;

    let sink: Arc<dyn PersistenceSink> = match config.object_store.clone() {
        Some(store) => {
            tracing::info!("persisting detection events to bucket {}", store.bucket);
            Arc::new(ObjectStoreSink::new(store).context("failed to build object store client")?)
        }
        None => {
            tracing::info!("no bucket configured; detection events will not be persisted");
            Arc::new(DisabledSink)
        }
    };

    let mut sampler = FrameSampler::new(config.jpeg_quality);
    if let Some(age) = config.max_frame_age {
        sampler = sampler.with_max_frame_age(age);
    }

    Ok(HazardMonitor::new(source, Arc::new(detector), sink)
        .with_sampler(sampler)
        .with_location(config.location.clone())
        .with_initial_mode(config.initial_mode))
}

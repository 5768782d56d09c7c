//! Hazard monitoring pipeline built on top of `video-ingest` and `ml-core`.

pub mod pipeline;

pub use pipeline::{
    build_monitor,
    config::{HazardCliArgs, HazardConfig, TelemetryOptions},
    cycle::{CycleError, CycleOutcome, DEFAULT_LOCATION, HazardMonitor, MonitorSnapshot},
    overlay::{Canvas, OverlayRenderer, OverlayShape, RenderError},
    persistence::{
        DEFAULT_PERSISTENCE_TIMEOUT, DetectionEvent, DisabledSink, ObjectStoreConfig,
        ObjectStoreSink, PersistenceError, PersistenceSink,
    },
    state::{ActiveDetection, DetectionState, ModeController},
    telemetry::{
        TelemetryGuard, init_metrics_recorder, init_tracing, prometheus_handle, spawn_thread,
    },
};

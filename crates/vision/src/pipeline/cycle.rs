//! Detection-cycle orchestrator.
//!
//! A cycle binds the current mode, samples the camera, asks the remote
//! detector, and only after everything succeeded commits the new hazard state
//! and overlay together. Positive cycles hand their event to the persistence
//! sink on a detached task.

use std::{
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use chrono::Utc;
use image::RgbaImage;
use ml_core::{DetectionMode, InferenceError, Prediction, RemoteDetector};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};
use video_ingest::{CaptureError, FrameSampler, VideoSource};

use crate::pipeline::{
    overlay::{Canvas, OverlayRenderer, OverlayShape, RenderError},
    persistence::{DetectionEvent, PersistenceError, PersistenceSink},
    state::{ActiveDetection, ModeController},
};

pub const DEFAULT_LOCATION: &str = "unknown";
const OVERLAY_JPEG_QUALITY: u8 = 85;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("a detection cycle is already in flight")]
    InFlight,
    #[error(transparent)]
    SourceUnavailable(CaptureError),
    /// The frame was available but could not be prepared for upload.
    #[error("failed to prepare frame: {0}")]
    Capture(#[source] CaptureError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl CycleError {
    pub fn kind(&self) -> &'static str {
        match self {
            CycleError::InFlight => "in_flight",
            CycleError::SourceUnavailable(_) => "source_unavailable",
            CycleError::Capture(_) => "capture",
            CycleError::Inference(err) => err.kind(),
            CycleError::Render(_) => "render",
        }
    }
}

impl From<CaptureError> for CycleError {
    fn from(err: CaptureError) -> Self {
        if err.is_source_unavailable() {
            CycleError::SourceUnavailable(err)
        } else {
            CycleError::Capture(err)
        }
    }
}

/// Result of one completed cycle. Predictions are this cycle's own list.
#[derive(Debug)]
pub struct CycleOutcome {
    pub mode: DetectionMode,
    pub predictions: Vec<Prediction>,
    pub shapes: Vec<OverlayShape>,
    /// Detached store of the cycle's event; `None` when nothing was found.
    pub persistence: Option<JoinHandle<Result<(), PersistenceError>>>,
}

impl CycleOutcome {
    pub fn is_positive(&self) -> bool {
        !self.predictions.is_empty()
    }
}

/// Display state exposed to the control surface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MonitorSnapshot {
    pub mode: DetectionMode,
    pub headline: String,
    pub status: &'static str,
    pub fire_detected: bool,
    pub earthquake_detected: bool,
    pub people_detected: bool,
    pub last_detection: Option<ActiveDetection>,
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct HazardMonitor {
    source: Arc<dyn VideoSource>,
    sampler: FrameSampler,
    detector: Arc<dyn RemoteDetector>,
    sink: Arc<dyn PersistenceSink>,
    renderer: OverlayRenderer,
    modes: Mutex<ModeController>,
    canvas: Mutex<Canvas>,
    in_flight: AtomicBool,
    location: String,
}

impl HazardMonitor {
    pub fn new(
        source: Arc<dyn VideoSource>,
        detector: Arc<dyn RemoteDetector>,
        sink: Arc<dyn PersistenceSink>,
    ) -> Self {
        Self {
            source,
            sampler: FrameSampler::default(),
            detector,
            sink,
            renderer: OverlayRenderer,
            modes: Mutex::new(ModeController::default()),
            canvas: Mutex::new(Canvas::new()),
            in_flight: AtomicBool::new(false),
            location: DEFAULT_LOCATION.to_string(),
        }
    }

    pub fn with_sampler(mut self, sampler: FrameSampler) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_initial_mode(self, mode: DetectionMode) -> Self {
        *self.lock_modes() = ModeController::new(mode);
        self
    }

    pub fn current_mode(&self) -> DetectionMode {
        self.lock_modes().current_mode()
    }

    fn lock_modes(&self) -> MutexGuard<'_, ModeController> {
        self.modes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn advance_mode(&self) -> DetectionMode {
        let mode = self.lock_modes().advance();
        info!("detection mode switched to {mode}");
        mode
    }

    pub fn is_cycle_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let modes = self.lock_modes();
        let state = modes.detection_state();
        MonitorSnapshot {
            mode: modes.current_mode(),
            headline: modes.headline(),
            status: modes.hazard_status(),
            fire_detected: state.fire_detected,
            earthquake_detected: state.earthquake_detected,
            people_detected: state.people_detected,
            last_detection: modes.active_detection(),
        }
    }

    /// JPEG of the latest overlay, or `None` before the first render.
    pub fn overlay_jpeg(&self) -> Option<Result<Vec<u8>, RenderError>> {
        let canvas = self.canvas.lock().ok()?;
        if canvas.is_blank() {
            return None;
        }
        Some(canvas.encode_jpeg(OVERLAY_JPEG_QUALITY))
    }

    /// Copy of the latest overlay pixels, or `None` before the first render.
    pub fn overlay_image(&self) -> Option<RgbaImage> {
        let canvas = self.canvas.lock().ok()?;
        (!canvas.is_blank()).then(|| canvas.image().clone())
    }

    /// Run one detection cycle for the mode active right now. Overlapping
    /// calls are rejected with [`CycleError::InFlight`].
    pub async fn run_cycle(&self) -> Result<CycleOutcome, CycleError> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            debug!("rejecting detection trigger: cycle already in flight");
            return Err(CycleError::InFlight);
        };
        let mode = self.current_mode();
        let span = tracing::info_span!(
            "hazard.cycle",
            mode = %mode,
            predictions = tracing::field::Empty
        );

        let result = self.execute(mode).instrument(span.clone()).await;
        let outcome_label = match &result {
            Ok(outcome) => {
                span.record("predictions", outcome.predictions.len());
                if outcome.is_positive() { "positive" } else { "negative" }
            }
            Err(err) => {
                warn!(parent: &span, "detection cycle aborted ({}): {err}", err.kind());
                err.kind()
            }
        };
        metrics::counter!(
            "hazard_cycles_total",
            "mode" => mode.slug(),
            "outcome" => outcome_label
        )
        .increment(1);
        result
    }

    async fn execute(&self, mode: DetectionMode) -> Result<CycleOutcome, CycleError> {
        let sampled = self.sampler.capture(self.source.as_ref())?;

        let started = Instant::now();
        let inference = self.detector.infer(mode, &sampled.image).await;
        metrics::histogram!("hazard_inference_seconds", "mode" => mode.slug())
            .record(started.elapsed().as_secs_f64());
        let predictions = inference?;

        let mut canvas = Canvas::new();
        let shapes = self
            .renderer
            .render(&mut canvas, &sampled.frame, &predictions, mode)?;

        self.lock_modes()
            .apply_result(mode, !predictions.is_empty());
        match self.canvas.lock() {
            Ok(mut guard) => *guard = canvas,
            Err(poisoned) => *poisoned.into_inner() = canvas,
        }

        info!("{mode} cycle finished with {} prediction(s)", predictions.len());

        let persistence = if predictions.is_empty() {
            None
        } else {
            let event = DetectionEvent::new(
                Utc::now(),
                self.location.clone(),
                mode,
                predictions.clone(),
            );
            Some(self.persist(event))
        };

        Ok(CycleOutcome {
            mode,
            predictions,
            shapes,
            persistence,
        })
    }

    fn persist(&self, event: DetectionEvent) -> JoinHandle<Result<(), PersistenceError>> {
        let sink = self.sink.clone();
        let span = tracing::info_span!("hazard.persist", key = %event.object_key());
        tokio::spawn(
            async move {
                let result = sink.store(&event).await;
                if let Err(err) = &result {
                    warn!("failed to persist detection event: {err}");
                    metrics::counter!("hazard_persistence_failures_total").increment(1);
                }
                result
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::{panic, time::Duration};

    use anyhow::anyhow;
    use async_trait::async_trait;
    use ml_core::InferenceError;
    use video_ingest::{EncodedImage, Frame};

    use super::*;
    use crate::pipeline::persistence::DisabledSink;

    struct NoFrames;

    impl VideoSource for NoFrames {
        fn current_frame(&self) -> Option<Frame> {
            None
        }
    }

    struct Silent;

    #[async_trait]
    impl RemoteDetector for Silent {
        async fn infer(
            &self,
            _mode: DetectionMode,
            _image: &EncodedImage,
        ) -> Result<Vec<Prediction>, InferenceError> {
            Ok(Vec::new())
        }
    }

    fn monitor() -> HazardMonitor {
        HazardMonitor::new(Arc::new(NoFrames), Arc::new(Silent), Arc::new(DisabledSink))
    }

    #[test]
    fn capture_errors_split_by_availability() {
        let missing = CycleError::from(CaptureError::SourceUnavailable {
            reason: "no frame".into(),
        });
        assert_eq!(missing.kind(), "source_unavailable");

        let stale = CycleError::from(CaptureError::Stale {
            age: Duration::from_secs(3),
        });
        assert!(matches!(stale, CycleError::SourceUnavailable(_)));

        let encode = CycleError::from(CaptureError::Other(anyhow!("jpeg encoder failed")));
        assert!(matches!(encode, CycleError::Capture(_)));
        assert_eq!(encode.kind(), "capture");
    }

    #[test]
    fn poisoned_mode_lock_keeps_the_selected_mode() {
        let monitor = monitor().with_initial_mode(DetectionMode::People);
        let poisoned = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            let _guard = monitor.modes.lock().unwrap();
            panic!("poison the mode lock");
        }));
        assert!(poisoned.is_err());
        assert!(monitor.modes.is_poisoned());

        assert_eq!(monitor.current_mode(), DetectionMode::People);
        assert_eq!(monitor.snapshot().mode, DetectionMode::People);
        assert_eq!(monitor.advance_mode(), DetectionMode::Fire);
        assert_eq!(monitor.current_mode(), DetectionMode::Fire);
    }
}

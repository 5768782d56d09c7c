//! Actix Web control surface: the HUD page, the cycle and mode triggers, the
//! latest overlay, a live MJPEG preview, and Prometheus metrics.

use std::{sync::Arc, time::Duration};

use actix_web::{
    App, HttpResponse, HttpServer,
    http::{StatusCode, header},
    web::{self, Bytes},
};
use anyhow::{Context, Result};
use async_stream::stream;
use ml_core::InferenceError;
use serde::Serialize;
use tracing::{error, info};
use video_ingest::{CameraStream, FrameSampler};
use vision::{CycleError, HazardConfig, HazardMonitor, MonitorSnapshot, build_monitor};

const PREVIEW_INTERVAL: Duration = Duration::from_millis(100);

/// Shared state backing HTTP handlers.
pub(crate) struct ServerState {
    pub(crate) monitor: Arc<HazardMonitor>,
    pub(crate) camera: Arc<CameraStream>,
    pub(crate) camera_uri: String,
    pub(crate) capture_size: (i32, i32),
    pub(crate) preview: FrameSampler,
}

#[derive(Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    snapshot: MonitorSnapshot,
    camera_running: bool,
}

#[derive(Serialize)]
struct CameraResponse {
    started: bool,
    running: bool,
}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    error: &'a str,
    message: String,
}

/// Bind the control surface and block until the server exits.
pub(crate) fn run(config: HazardConfig) -> Result<()> {
    let camera = Arc::new(CameraStream::idle());
    let monitor = Arc::new(build_monitor(&config, camera.clone())?);
    let state = web::Data::new(ServerState {
        monitor,
        camera,
        camera_uri: config.camera_uri.clone(),
        capture_size: (config.width, config.height),
        preview: FrameSampler::new(config.jpeg_quality),
    });
    let bind = config.bind.clone();

    actix_web::rt::System::new().block_on(async move {
        let server = HttpServer::new(move || App::new().app_data(state.clone()).configure(routes))
            .bind(bind.as_str())
            .with_context(|| format!("failed to bind control surface to {bind}"))?
            .run();
        info!("control surface listening on http://{bind}");
        server.await.context("HTTP server error")
    })
}

pub(crate) fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index_route))
        .route("/camera/start", web::post().to(start_camera_handler))
        .route("/detect", web::post().to(detect_handler))
        .route("/mode/next", web::post().to(next_mode_handler))
        .route("/status", web::get().to(status_handler))
        .route("/overlay.jpg", web::get().to(overlay_handler))
        .route("/stream.mjpg", web::get().to(stream_handler))
        .route("/metrics", web::get().to(metrics_handler));
}

fn status_of(state: &ServerState) -> StatusResponse {
    StatusResponse {
        snapshot: state.monitor.snapshot(),
        camera_running: state.camera.is_running(),
    }
}

fn error_status(err: &CycleError) -> StatusCode {
    match err {
        CycleError::InFlight => StatusCode::CONFLICT,
        CycleError::SourceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        CycleError::Inference(InferenceError::TimedOut(_)) => StatusCode::GATEWAY_TIMEOUT,
        CycleError::Inference(_) => StatusCode::BAD_GATEWAY,
        CycleError::Capture(_) | CycleError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Serve the HUD page.
async fn index_route() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(crate::html::hud::HUD_INDEX_HTML)
}

/// Start the camera reader; repeated calls leave the running stream alone.
async fn start_camera_handler(state: web::Data<ServerState>) -> HttpResponse {
    match state.camera.start(&state.camera_uri, state.capture_size) {
        Ok(started) => {
            if started {
                info!("camera {} started", state.camera_uri);
            }
            HttpResponse::Ok().json(CameraResponse {
                started,
                running: state.camera.is_running(),
            })
        }
        Err(err) => {
            error!("failed to start camera {}: {err:?}", state.camera_uri);
            HttpResponse::ServiceUnavailable().json(ErrorResponse {
                error: "camera",
                message: format!("{err:#}"),
            })
        }
    }
}

/// Run one detection cycle for the current mode.
async fn detect_handler(state: web::Data<ServerState>) -> HttpResponse {
    match state.monitor.run_cycle().await {
        Ok(outcome) => {
            let snapshot = state.monitor.snapshot();
            HttpResponse::Ok().json(serde_json::json!({
                "mode": outcome.mode,
                "positive": outcome.is_positive(),
                "predictions": outcome.predictions,
                "status": snapshot.status,
            }))
        }
        Err(err) => HttpResponse::build(error_status(&err)).json(ErrorResponse {
            error: err.kind(),
            message: err.to_string(),
        }),
    }
}

async fn next_mode_handler(state: web::Data<ServerState>) -> HttpResponse {
    state.monitor.advance_mode();
    HttpResponse::Ok().json(status_of(&state))
}

async fn status_handler(state: web::Data<ServerState>) -> HttpResponse {
    HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .json(status_of(&state))
}

/// Latest rendered overlay, or 204 before the first successful cycle.
async fn overlay_handler(state: web::Data<ServerState>) -> HttpResponse {
    match state.monitor.overlay_jpeg() {
        Some(Ok(jpeg)) => HttpResponse::Ok()
            .insert_header((header::CACHE_CONTROL, "no-cache"))
            .content_type("image/jpeg")
            .body(jpeg),
        Some(Err(err)) => {
            error!("failed to encode overlay: {err}");
            HttpResponse::InternalServerError().finish()
        }
        None => HttpResponse::NoContent().finish(),
    }
}

/// Stream the live camera feed over a multipart response.
async fn stream_handler(state: web::Data<ServerState>) -> HttpResponse {
    let state = state.clone();
    let stream = stream! {
        let mut interval = actix_web::rt::time::interval(PREVIEW_INTERVAL);
        let mut last_timestamp = None;
        loop {
            interval.tick().await;
            let Ok(sampled) = state.preview.capture(state.camera.as_ref()) else {
                continue;
            };
            if last_timestamp == Some(sampled.frame.timestamp_ms) {
                continue;
            }
            last_timestamp = Some(sampled.frame.timestamp_ms);
            let jpeg = sampled.image.bytes;
            let mut payload = Vec::with_capacity(jpeg.len() + 64);
            payload.extend_from_slice(b"--frame\r\n");
            payload.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
            payload.extend_from_slice(&jpeg);
            payload.extend_from_slice(b"\r\n");
            yield Ok::<Bytes, actix_web::Error>(Bytes::from(payload));
        }
    };

    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_METHODS, "GET"))
        .append_header(("Cache-Control", "no-cache"))
        .append_header(("Content-Type", "multipart/x-mixed-replace; boundary=frame"))
        .streaming(stream)
}

/// Prometheus text exposition of the cycle metrics.
async fn metrics_handler() -> HttpResponse {
    match vision::prometheus_handle() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().body("metrics recorder not installed"),
    }
}

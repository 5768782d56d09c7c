use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};
use video_ingest::{CameraStream, VideoSource};
use vision::{HazardCliArgs, HazardConfig, build_monitor, init_metrics_recorder, init_tracing};

use crate::server;

/// Camera hazard monitor backed by a remote object detector.
#[derive(Debug, Parser)]
#[command(name = "hazard-watch", version, about, args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[command(flatten)]
    args: HazardCliArgs,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP control surface and HUD (default).
    Serve(HazardCliArgs),
    /// Run a single detection cycle and print the outcome as JSON.
    Detect(DetectArgs),
}

#[derive(Debug, Args)]
struct DetectArgs {
    #[command(flatten)]
    hazard: HazardCliArgs,
    /// Seconds to wait for the camera to deliver its first frame.
    #[arg(long = "frame-wait", value_name = "SECS", default_value_t = 10)]
    frame_wait_secs: u64,
}

impl Cli {
    pub fn dispatch(self) -> Result<()> {
        match self.command {
            Some(Command::Serve(args)) => serve(args),
            Some(Command::Detect(args)) => detect(args),
            None => serve(self.args),
        }
    }
}

fn serve(args: HazardCliArgs) -> Result<()> {
    let config = HazardConfig::try_from(args)?;
    let _telemetry = init_tracing(&config.telemetry)?;
    init_metrics_recorder()?;
    server::run(config)
}

fn detect(args: DetectArgs) -> Result<()> {
    let config = HazardConfig::try_from(args.hazard)?;
    let _telemetry = init_tracing(&config.telemetry)?;
    let frame_wait = Duration::from_secs(args.frame_wait_secs);

    actix_web::rt::System::new().block_on(async move {
        let camera = Arc::new(CameraStream::idle());
        camera
            .start(&config.camera_uri, (config.width, config.height))
            .with_context(|| format!("failed to start camera {}", config.camera_uri))?;
        wait_for_first_frame(&camera, frame_wait).await?;

        let monitor = build_monitor(&config, camera.clone())?;
        let outcome = monitor
            .run_cycle()
            .await
            .context("detection cycle failed")?;

        let snapshot = monitor.snapshot();
        let report = json!({
            "mode": outcome.mode,
            "positive": outcome.is_positive(),
            "predictions": outcome.predictions,
            "status": snapshot.status,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);

        if let Some(handle) = outcome.persistence {
            match handle.await {
                Ok(Ok(())) => info!("detection event persisted"),
                Ok(Err(err)) => warn!("detection event was not persisted: {err}"),
                Err(err) => warn!("persistence task aborted: {err}"),
            }
        }
        Ok(())
    })
}

async fn wait_for_first_frame(camera: &CameraStream, limit: Duration) -> Result<()> {
    let started = tokio::time::Instant::now();
    let mut interval = tokio::time::interval(Duration::from_millis(50));
    loop {
        interval.tick().await;
        if camera.current_frame().is_some() {
            return Ok(());
        }
        if !camera.is_running() {
            bail!("camera stopped before delivering a frame");
        }
        if started.elapsed() >= limit {
            bail!("no frame from camera within {limit:?}");
        }
    }
}

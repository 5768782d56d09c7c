//! Configuration parsing for the hazard monitor.
//!
//! This module owns translation of CLI arguments (and their environment
//! fallbacks) into a validated `HazardConfig`. Remote-call settings are
//! grouped so they can be handed straight to the client constructors.

use std::{path::PathBuf, time::Duration};

use anyhow::{Result, anyhow, bail};
use clap::Args;
use ml_core::{DEFAULT_BASE_URL, DetectionMode, InferenceConfig, ModelTable};

use crate::pipeline::{cycle::DEFAULT_LOCATION, persistence::ObjectStoreConfig};

#[derive(Clone, Debug)]
/// Canonical configuration shared by every part of the monitor.
pub struct HazardConfig {
    /// Camera URI or device index.
    pub camera_uri: String,
    /// Capture width requested from the camera.
    pub width: i32,
    /// Capture height requested from the camera.
    pub height: i32,
    /// JPEG quality used for uploaded stills.
    pub jpeg_quality: u8,
    /// Frames older than this are treated as a stalled stream.
    pub max_frame_age: Option<Duration>,
    /// Remote detector settings.
    pub inference: InferenceConfig,
    /// Object store settings; `None` disables persistence.
    pub object_store: Option<ObjectStoreConfig>,
    /// Location recorded in detection events.
    pub location: String,
    /// Mode active at startup.
    pub initial_mode: DetectionMode,
    /// Address the control surface listens on.
    pub bind: String,
    pub telemetry: TelemetryOptions,
}

#[derive(Clone, Debug, Default)]
/// Optional telemetry knobs.
pub struct TelemetryOptions {
    /// Write a Chrome trace JSON file capturing cycle spans.
    pub chrome_trace_path: Option<PathBuf>,
}

/// CLI arguments shared by the `serve` and `detect` subcommands.
#[derive(Debug, Args)]
pub struct HazardCliArgs {
    /// API key sent as bearer token and `api_key` query parameter.
    #[arg(long = "api-key", env = "HAZARD_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
    /// Base URL of the inference service.
    #[arg(long = "base-url", env = "HAZARD_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,
    /// Override the model id used in fire mode.
    #[arg(long = "fire-model", value_name = "ID")]
    pub fire_model: Option<String>,
    /// Override the model id used in earthquake mode.
    #[arg(long = "earthquake-model", value_name = "ID")]
    pub earthquake_model: Option<String>,
    /// Override the model id used in people mode.
    #[arg(long = "people-model", value_name = "ID")]
    pub people_model: Option<String>,
    /// Inference request timeout in seconds.
    #[arg(long = "inference-timeout", value_name = "SECS", default_value_t = 15)]
    pub inference_timeout_secs: u64,

    /// Camera URI or device index.
    #[arg(long = "camera", value_name = "URI", default_value = "0")]
    pub camera: String,
    /// Capture width in pixels.
    #[arg(long = "width", value_name = "PX", default_value_t = 640)]
    pub width: i32,
    /// Capture height in pixels.
    #[arg(long = "height", value_name = "PX", default_value_t = 480)]
    pub height: i32,
    /// JPEG quality for uploaded stills (1-100).
    #[arg(long = "jpeg-quality", value_name = "QUALITY", default_value_t = 85)]
    pub jpeg_quality: u8,
    /// Reject frames older than this many milliseconds.
    #[arg(long = "max-frame-age", value_name = "MS")]
    pub max_frame_age_ms: Option<u64>,

    /// Bucket receiving detection events; persistence is off without it.
    #[arg(long = "bucket", env = "HAZARD_BUCKET")]
    pub bucket: Option<String>,
    /// Region of the bucket.
    #[arg(long = "region", env = "HAZARD_REGION", default_value = "us-east-1")]
    pub region: String,
    /// Path-style endpoint of an S3-compatible store.
    #[arg(long = "object-store-url", env = "HAZARD_OBJECT_STORE_URL")]
    pub object_store_url: Option<String>,
    /// Static bearer credential for the object store.
    #[arg(
        long = "object-store-token",
        env = "HAZARD_OBJECT_STORE_TOKEN",
        hide_env_values = true
    )]
    pub object_store_token: Option<String>,
    /// Object store request timeout in seconds.
    #[arg(long = "persistence-timeout", value_name = "SECS", default_value_t = 10)]
    pub persistence_timeout_secs: u64,
    /// Location recorded in detection events.
    #[arg(long = "location", env = "HAZARD_LOCATION", default_value = DEFAULT_LOCATION)]
    pub location: String,

    /// Initial detection mode (fire, earthquake, people).
    #[arg(long = "mode", value_name = "MODE", default_value = "fire")]
    pub mode: String,
    /// Listen address for the control surface.
    #[arg(long = "bind", value_name = "ADDR", default_value = "127.0.0.1:8080")]
    pub bind: String,
    /// Emit Chrome trace JSON for post-mortem analysis.
    #[arg(long = "chrome-trace", value_name = "PATH")]
    pub chrome_trace: Option<PathBuf>,
}

impl TryFrom<HazardCliArgs> for HazardConfig {
    type Error = anyhow::Error;

    fn try_from(args: HazardCliArgs) -> Result<Self> {
        let api_key = args
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("Missing API key. Provide --api-key or HAZARD_API_KEY."))?;

        if !(args.base_url.starts_with("http://") || args.base_url.starts_with("https://")) {
            bail!("--base-url must be an http(s) URL");
        }
        if args.width <= 0 || args.height <= 0 {
            bail!("Capture width and height must be positive integers");
        }
        if !(1..=100).contains(&args.jpeg_quality) {
            bail!("--jpeg-quality must be an integer between 1 and 100");
        }
        if args.inference_timeout_secs == 0 {
            bail!("--inference-timeout must be at least 1 second");
        }
        if args.persistence_timeout_secs == 0 {
            bail!("--persistence-timeout must be at least 1 second");
        }

        let initial_mode = DetectionMode::from_slug(&args.mode).ok_or_else(|| {
            anyhow!(
                "Unknown mode {:?}; expected fire, earthquake, or people",
                args.mode
            )
        })?;

        let defaults = ModelTable::default();
        let models = ModelTable {
            fire: args.fire_model.unwrap_or(defaults.fire),
            earthquake: args.earthquake_model.unwrap_or(defaults.earthquake),
            people: args.people_model.unwrap_or(defaults.people),
        };
        if DetectionMode::ALL
            .iter()
            .any(|mode| models.model_id(*mode).trim().is_empty())
        {
            bail!("Model ids must not be empty");
        }

        let object_store = match args.bucket {
            Some(bucket) if bucket.trim().is_empty() => bail!("--bucket must not be empty"),
            Some(bucket) => Some(ObjectStoreConfig {
                bucket,
                region: args.region,
                endpoint: args.object_store_url,
                token: args.object_store_token,
                timeout: Duration::from_secs(args.persistence_timeout_secs),
            }),
            None => None,
        };

        Ok(Self {
            camera_uri: args.camera,
            width: args.width,
            height: args.height,
            jpeg_quality: args.jpeg_quality,
            max_frame_age: args.max_frame_age_ms.map(Duration::from_millis),
            inference: InferenceConfig {
                api_key,
                base_url: args.base_url,
                models,
                timeout: Duration::from_secs(args.inference_timeout_secs),
            },
            object_store,
            location: args.location,
            initial_mode,
            bind: args.bind,
            telemetry: TelemetryOptions {
                chrome_trace_path: args.chrome_trace,
            },
        })
    }
}

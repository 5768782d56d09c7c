//! Detection events and the sinks that store them.
//!
//! The monitor hands each positive cycle's event to a [`PersistenceSink`] on
//! a detached task; the sink owns delivery and the monitor only logs failures.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use ml_core::{BoxError, DetectionMode, Prediction};
use reqwest::{Client, header::CONTENT_TYPE};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_PERSISTENCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Durable record of a cycle that found at least one object.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionEvent {
    pub timestamp: String,
    pub location: String,
    pub mode: DetectionMode,
    pub predictions: Vec<Prediction>,
    #[serde(skip)]
    epoch_millis: i64,
}

impl DetectionEvent {
    pub fn new(
        at: DateTime<Utc>,
        location: impl Into<String>,
        mode: DetectionMode,
        predictions: Vec<Prediction>,
    ) -> Self {
        Self {
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            location: location.into(),
            mode,
            predictions,
            epoch_millis: at.timestamp_millis(),
        }
    }

    pub fn epoch_millis(&self) -> i64 {
        self.epoch_millis
    }

    /// Object key: `detections/{epoch_millis}_{mode}.json`.
    pub fn object_key(&self) -> String {
        format!(
            "detections/{}_{}.json",
            self.epoch_millis,
            self.mode.slug()
        )
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("object store unreachable: {0}")]
    Network(#[source] BoxError),
    #[error("object store rejected {key} with HTTP {status}")]
    Rejected { key: String, status: u16 },
    #[error("failed to serialize detection event: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("object store request timed out after {0:?}")]
    TimedOut(Duration),
}

#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn store(&self, event: &DetectionEvent) -> Result<(), PersistenceError>;
}

/// Sink used when no bucket is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledSink;

#[async_trait]
impl PersistenceSink for DisabledSink {
    async fn store(&self, event: &DetectionEvent) -> Result<(), PersistenceError> {
        debug!(
            "persistence disabled; dropping {} ({} prediction(s))",
            event.object_key(),
            event.predictions.len()
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct ObjectStoreConfig {
    pub bucket: String,
    pub region: String,
    /// Path-style endpoint (`{endpoint}/{bucket}/{key}`) for S3-compatible
    /// stores. Without it the AWS virtual-hosted URL is used.
    pub endpoint: Option<String>,
    /// Static bearer credential sent with every upload.
    pub token: Option<String>,
    pub timeout: Duration,
}

impl fmt::Debug for ObjectStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ObjectStoreConfig {
    pub fn object_url(&self, key: &str) -> String {
        match &self.endpoint {
            Some(endpoint) => format!(
                "{}/{}/{}",
                endpoint.trim_end_matches('/'),
                self.bucket,
                key
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            ),
        }
    }
}

/// Uploads events as JSON objects with a single `PUT` each.
#[derive(Debug)]
pub struct ObjectStoreSink {
    http: Client,
    config: ObjectStoreConfig,
}

impl ObjectStoreSink {
    pub fn new(config: ObjectStoreConfig) -> Result<Self, PersistenceError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| PersistenceError::Network(Box::new(err)))?;
        Ok(Self { http, config })
    }

    fn transport_error(&self, err: reqwest::Error) -> PersistenceError {
        if err.is_timeout() {
            PersistenceError::TimedOut(self.config.timeout)
        } else {
            PersistenceError::Network(Box::new(err))
        }
    }
}

#[async_trait]
impl PersistenceSink for ObjectStoreSink {
    async fn store(&self, event: &DetectionEvent) -> Result<(), PersistenceError> {
        let key = event.object_key();
        let body = serde_json::to_vec(event)?;
        let url = self.config.object_url(&key);

        let mut request = self
            .http
            .put(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PersistenceError::Rejected {
                key,
                status: status.as_u16(),
            });
        }
        debug!("stored detection event at {url}");
        Ok(())
    }
}

//! Remote object-detection client.
//!
//! One multipart upload per call to `{base_url}/{model_id}`; the model is
//! picked from the [`ModelTable`] by the mode argument alone.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, multipart};
use tracing::{debug, warn};
use video_ingest::EncodedImage;

use crate::{
    error::InferenceError,
    mode::{DetectionMode, ModelTable},
    prediction::{Prediction, parse_predictions},
};

pub const DEFAULT_BASE_URL: &str = "https://detect.roboflow.com";
pub const DEFAULT_INFERENCE_TIMEOUT: Duration = Duration::from_secs(15);

/// Anything able to turn an encoded still into predictions for a mode.
#[async_trait]
pub trait RemoteDetector: Send + Sync {
    async fn infer(
        &self,
        mode: DetectionMode,
        image: &EncodedImage,
    ) -> Result<Vec<Prediction>, InferenceError>;
}

#[derive(Clone)]
pub struct InferenceConfig {
    pub api_key: String,
    pub base_url: String,
    pub models: ModelTable,
    pub timeout: Duration,
}

impl InferenceConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            models: ModelTable::default(),
            timeout: DEFAULT_INFERENCE_TIMEOUT,
        }
    }
}

impl fmt::Debug for InferenceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("models", &self.models)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug)]
pub struct InferenceClient {
    http: Client,
    config: InferenceConfig,
}

impl InferenceClient {
    pub fn new(config: InferenceConfig) -> Result<Self, InferenceError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| InferenceError::Network(Box::new(err)))?;
        Ok(Self { http, config })
    }

    /// Full URL queried for `mode`, without the credential.
    pub fn endpoint(&self, mode: DetectionMode) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.models.model_id(mode)
        )
    }

    fn transport_error(&self, err: reqwest::Error) -> InferenceError {
        if err.is_timeout() {
            InferenceError::TimedOut(self.config.timeout)
        } else {
            InferenceError::Network(Box::new(err))
        }
    }
}

#[async_trait]
impl RemoteDetector for InferenceClient {
    async fn infer(
        &self,
        mode: DetectionMode,
        image: &EncodedImage,
    ) -> Result<Vec<Prediction>, InferenceError> {
        let url = self.endpoint(mode);
        debug!(
            "uploading {} byte still to {url} (mode {mode})",
            image.bytes.len()
        );

        let part = multipart::Part::bytes(image.bytes.clone())
            .file_name("frame.jpg")
            .mime_str(image.mime)
            .map_err(|err| InferenceError::Network(Box::new(err)))?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(&url)
            .query(&[("api_key", self.config.api_key.as_str())])
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| self.transport_error(err))?;

        if !status.is_success() {
            let snippet: String = String::from_utf8_lossy(&body).chars().take(200).collect();
            warn!("detector returned HTTP {status} for mode {mode}: {snippet}");
            return Err(InferenceError::invalid(format!(
                "detector returned HTTP {status}"
            )));
        }

        let predictions = parse_predictions(&body)?;
        debug!("mode {mode}: {} prediction(s)", predictions.len());
        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_and_model() {
        let mut config = InferenceConfig::new("key");
        config.base_url = "http://localhost:9001/".to_string();
        let client = InferenceClient::new(config).unwrap();
        assert_eq!(
            client.endpoint(DetectionMode::Earthquake),
            "http://localhost:9001/earthquake-dataset-oxnyc/1"
        );
    }

    #[test]
    fn debug_output_hides_the_key() {
        let config = InferenceConfig::new("super-secret");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}

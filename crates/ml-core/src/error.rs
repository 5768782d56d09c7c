use std::time::Duration;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference endpoint unreachable: {0}")]
    Network(#[source] BoxError),
    #[error("invalid inference response: {reason}")]
    InvalidResponse { reason: String },
    #[error("inference request timed out after {0:?}")]
    TimedOut(Duration),
}

impl InferenceError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        InferenceError::InvalidResponse {
            reason: reason.into(),
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            InferenceError::Network(_) => "network",
            InferenceError::InvalidResponse { .. } => "invalid_response",
            InferenceError::TimedOut(_) => "timed_out",
        }
    }
}

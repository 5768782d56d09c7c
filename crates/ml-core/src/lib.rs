//! Model-facing types: detection modes, predictions, and the remote detector
//! client.

pub mod error;
pub mod inference;
pub mod mode;
pub mod prediction;

pub use error::{BoxError, InferenceError};
pub use inference::{
    DEFAULT_BASE_URL, DEFAULT_INFERENCE_TIMEOUT, InferenceClient, InferenceConfig, RemoteDetector,
};
pub use mode::{DetectionMode, ModeStyle, ModelTable};
pub use prediction::{Prediction, parse_predictions};

use std::time::Duration;

use anyhow::Error;
use thiserror::Error;

/// Raw frame captured from a video source.
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

impl Frame {
    /// Number of bytes a well-formed frame of this size and format carries.
    pub fn expected_len(&self) -> Option<usize> {
        if self.width <= 0 || self.height <= 0 {
            return None;
        }
        Some(self.width as usize * self.height as usize * self.format.bytes_per_pixel())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
}

impl FrameFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            FrameFormat::Bgr8 => 3,
        }
    }
}

/// Compressed still produced by the [`FrameSampler`](crate::FrameSampler).
#[derive(Clone, Debug)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("video source unavailable: {reason}")]
    SourceUnavailable { reason: String },
    #[error("video stream stalled: newest frame is {age:?} old")]
    Stale { age: Duration },
    #[error(transparent)]
    Other(#[from] Error),
}

impl CaptureError {
    pub(crate) fn unavailable(reason: impl Into<String>) -> Self {
        CaptureError::SourceUnavailable {
            reason: reason.into(),
        }
    }

    /// Whether the error means there is no usable frame to sample.
    pub fn is_source_unavailable(&self) -> bool {
        matches!(
            self,
            CaptureError::SourceUnavailable { .. } | CaptureError::Stale { .. }
        )
    }
}

/// Anything the sampler can read the newest frame from.
///
/// Implementations hand out a copy; sampling never mutates the source.
pub trait VideoSource: Send + Sync {
    fn current_frame(&self) -> Option<Frame>;
}

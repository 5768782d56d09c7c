//! Still-frame sampling: read the live source once and JPEG-encode it.

use std::time::Duration;

use chrono::Utc;
use image::{ImageBuffer, Rgb, codecs::jpeg::JpegEncoder};
use tracing::debug;

use crate::types::{CaptureError, EncodedImage, Frame, FrameFormat, VideoSource};

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// A frame read from the source together with its upload encoding.
#[derive(Clone, Debug)]
pub struct SampledFrame {
    pub frame: Frame,
    pub image: EncodedImage,
}

#[derive(Clone, Debug)]
pub struct FrameSampler {
    jpeg_quality: u8,
    max_frame_age: Option<Duration>,
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameSampler {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
            max_frame_age: None,
        }
    }

    /// Treat frames older than `age` as a stalled stream.
    pub fn with_max_frame_age(mut self, age: Duration) -> Self {
        self.max_frame_age = Some(age);
        self
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    /// Copy the current frame out of `source` at its native resolution and
    /// encode it as JPEG.
    pub fn capture(&self, source: &dyn VideoSource) -> Result<SampledFrame, CaptureError> {
        let frame = source
            .current_frame()
            .ok_or_else(|| CaptureError::unavailable("no active stream"))?;

        let expected = frame.expected_len().ok_or_else(|| {
            CaptureError::unavailable(format!(
                "frame has no dimensions ({}x{})",
                frame.width, frame.height
            ))
        })?;
        if frame.data.len() != expected {
            return Err(CaptureError::unavailable(format!(
                "frame buffer holds {} bytes, expected {expected}",
                frame.data.len()
            )));
        }

        if let Some(max_age) = self.max_frame_age {
            let age_ms = Utc::now().timestamp_millis().saturating_sub(frame.timestamp_ms);
            let age = Duration::from_millis(age_ms.max(0) as u64);
            if age > max_age {
                return Err(CaptureError::Stale { age });
            }
        }

        let image = encode_jpeg(&frame, self.jpeg_quality)?;
        debug!(
            "sampled {}x{} frame ({} bytes jpeg)",
            image.width,
            image.height,
            image.bytes.len()
        );
        Ok(SampledFrame { frame, image })
    }
}

/// Convert a BGR8 frame into an RGB image buffer.
pub fn frame_to_rgb(frame: &Frame) -> Option<ImageBuffer<Rgb<u8>, Vec<u8>>> {
    let rgb = match frame.format {
        FrameFormat::Bgr8 => bgr_to_rgb(&frame.data),
    };
    ImageBuffer::from_raw(frame.width as u32, frame.height as u32, rgb)
}

fn encode_jpeg(frame: &Frame, quality: u8) -> Result<EncodedImage, CaptureError> {
    let rgb = frame_to_rgb(frame)
        .ok_or_else(|| CaptureError::unavailable("failed to convert frame into image buffer"))?;
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(&rgb)
        .map_err(|err| CaptureError::Other(err.into()))?;

    Ok(EncodedImage {
        bytes: buffer,
        mime: "image/jpeg",
        width: rgb.width(),
        height: rgb.height(),
    })
}

fn bgr_to_rgb(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len());
    for chunk in input.chunks_exact(3) {
        output.push(chunk[2]);
        output.push(chunk[1]);
        output.push(chunk[0]);
    }
    output
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct FixedSource(Mutex<Option<Frame>>);

    impl VideoSource for FixedSource {
        fn current_frame(&self) -> Option<Frame> {
            self.0.lock().unwrap().clone()
        }
    }

    fn solid_frame(width: i32, height: i32, bgr: [u8; 3]) -> Frame {
        let data = bgr
            .iter()
            .copied()
            .cycle()
            .take(width.max(0) as usize * height.max(0) as usize * 3)
            .collect();
        Frame {
            data,
            width,
            height,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: FrameFormat::Bgr8,
        }
    }

    #[test]
    fn missing_stream_is_source_unavailable() {
        let source = FixedSource(Mutex::new(None));
        let err = FrameSampler::default().capture(&source).unwrap_err();
        assert!(err.is_source_unavailable(), "{err}");
    }

    #[test]
    fn zero_dimensions_are_source_unavailable() {
        let source = FixedSource(Mutex::new(Some(solid_frame(0, 0, [0, 0, 0]))));
        let err = FrameSampler::default().capture(&source).unwrap_err();
        assert!(matches!(err, CaptureError::SourceUnavailable { .. }));
    }

    #[test]
    fn truncated_buffer_is_source_unavailable() {
        let mut frame = solid_frame(4, 4, [0, 0, 0]);
        frame.data.truncate(10);
        let source = FixedSource(Mutex::new(Some(frame)));
        let err = FrameSampler::default().capture(&source).unwrap_err();
        assert!(matches!(err, CaptureError::SourceUnavailable { .. }));
    }

    #[test]
    fn stale_frame_is_rejected_when_age_limit_set() {
        let mut frame = solid_frame(4, 4, [0, 0, 0]);
        frame.timestamp_ms -= 10_000;
        let source = FixedSource(Mutex::new(Some(frame)));
        let sampler = FrameSampler::default().with_max_frame_age(Duration::from_secs(2));
        let err = sampler.capture(&source).unwrap_err();
        assert!(matches!(err, CaptureError::Stale { .. }));
        assert!(err.is_source_unavailable());
    }

    #[test]
    fn encodes_native_resolution_jpeg_without_touching_source() {
        let frame = solid_frame(32, 16, [0, 0, 255]);
        let original = frame.data.clone();
        let source = FixedSource(Mutex::new(Some(frame)));

        let sampled = FrameSampler::new(90).capture(&source).unwrap();
        assert_eq!(sampled.image.mime, "image/jpeg");
        assert_eq!((sampled.image.width, sampled.image.height), (32, 16));

        let decoded = image::load_from_memory(&sampled.image.bytes)
            .unwrap()
            .to_rgb8();
        assert_eq!(decoded.dimensions(), (32, 16));
        let px = decoded.get_pixel(16, 8);
        assert!(px[0] > 200 && px[1] < 60 && px[2] < 60, "{px:?}");

        assert_eq!(source.current_frame().unwrap().data, original);
    }

    #[test]
    fn quality_is_clamped() {
        assert_eq!(FrameSampler::new(0).jpeg_quality(), 1);
        assert_eq!(FrameSampler::new(250).jpeg_quality(), 100);
    }
}

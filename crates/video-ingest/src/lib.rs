//! Camera ingest: frame acquisition, the shared live stream, and still-frame
//! sampling for upload.

pub mod camera;
pub mod ffmpeg;
pub mod sampler;
pub mod stream;
pub mod types;

pub use camera::spawn_camera_reader;
pub use sampler::{DEFAULT_JPEG_QUALITY, FrameSampler, SampledFrame, frame_to_rgb};
pub use stream::CameraStream;
pub use types::{CaptureError, EncodedImage, Frame, FrameFormat, VideoSource};

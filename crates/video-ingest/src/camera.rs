//! Camera capture front-end.
//!
//! Device readers default to the ffmpeg subprocess backend. Building with the
//! `opencv` feature switches to an OpenCV `VideoCapture` loop instead.

use anyhow::Result;
use crossbeam_channel::Receiver;

use crate::types::{CaptureError, Frame};

/// Spawns a background reader that continually captures frames from `uri`.
///
/// Frames are scaled to `target_size` (width, height) and delivered as BGR8
/// over the returned [`Receiver`]. The channel is small so the capture loop is
/// backpressured when the consumer falls behind.
pub fn spawn_camera_reader(
    uri: &str,
    target_size: (i32, i32),
) -> Result<Receiver<Result<Frame, CaptureError>>> {
    #[cfg(feature = "opencv")]
    {
        opencv_reader::spawn(uri, target_size)
    }
    #[cfg(not(feature = "opencv"))]
    {
        crate::ffmpeg::spawn_ffmpeg_camera_reader(uri, target_size)
    }
}

/// Parse a `/dev/videoX` style URI and return the zero-based index if present.
pub(crate) fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return Some(index);
    }
    if let Some(stripped) = uri.strip_prefix("/dev/video") {
        if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(index) = stripped.parse::<i32>() {
                return Some(index);
            }
        }
    }
    None
}

#[cfg(feature = "opencv")]
mod opencv_reader {
    use std::thread;

    use anyhow::Result;
    use chrono::Utc;
    use crossbeam_channel::{Receiver, Sender, bounded};
    use opencv::{
        core::{self, MatTraitConstManual},
        prelude::*,
        videoio::{self, VideoCapture, VideoCaptureTrait},
    };
    use tracing::warn;

    use super::parse_device_index;
    use crate::types::{CaptureError, Frame, FrameFormat};

    pub(super) fn spawn(
        uri: &str,
        target_size: (i32, i32),
    ) -> Result<Receiver<Result<Frame, CaptureError>>> {
        let (tx, rx) = bounded(2);
        let uri = uri.to_string();

        thread::Builder::new()
            .name("opencv-capture".into())
            .spawn(move || {
                if let Err(err) = capture_loop(&uri, target_size, tx.clone()) {
                    let _ = tx.send(Err(err));
                }
            })
            .map_err(|err| CaptureError::Other(err.into()))?;

        Ok(rx)
    }

    fn capture_loop(
        uri: &str,
        target_size: (i32, i32),
        tx: Sender<Result<Frame, CaptureError>>,
    ) -> Result<(), CaptureError> {
        let mut cap = open_video_capture(uri)?;
        configure_camera(&mut cap, target_size, 30.0);

        let mut frame = Mat::default();
        let mut scratch = Mat::default();
        let (target_w, target_h) = target_size;

        loop {
            cap.read(&mut frame)
                .map_err(|e| CaptureError::Other(e.into()))?;

            let size = frame.size().map_err(|e| CaptureError::Other(e.into()))?;
            if size.width <= 0 {
                continue;
            }

            let working = if size.width != target_w || size.height != target_h {
                opencv::imgproc::resize(
                    &frame,
                    &mut scratch,
                    core::Size {
                        width: target_w,
                        height: target_h,
                    },
                    0.0,
                    0.0,
                    opencv::imgproc::INTER_LINEAR,
                )
                .map_err(|e| CaptureError::Other(e.into()))?;
                &scratch
            } else {
                &frame
            };

            let data = working
                .data_bytes()
                .map_err(|e| CaptureError::Other(e.into()))?
                .to_vec();

            if tx
                .send(Ok(Frame {
                    data,
                    width: target_w,
                    height: target_h,
                    timestamp_ms: Utc::now().timestamp_millis(),
                    format: FrameFormat::Bgr8,
                }))
                .is_err()
            {
                break;
            }
        }

        Ok(())
    }

    fn open_video_capture(uri: &str) -> Result<VideoCapture, CaptureError> {
        if let Some(index) = parse_device_index(uri) {
            for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
                match VideoCapture::new(index, backend) {
                    Ok(cap) => {
                        if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                            return Ok(cap);
                        }
                    }
                    Err(err) => {
                        warn!("failed to open device #{index} with backend {backend}: {err}");
                    }
                }
            }
        }

        for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
            match VideoCapture::from_file(uri, backend) {
                Ok(cap) => {
                    if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                        return Ok(cap);
                    }
                }
                Err(err) => {
                    warn!("failed to open {uri} with backend {backend}: {err}");
                }
            }
        }

        Err(CaptureError::Open {
            uri: uri.to_string(),
        })
    }

    fn configure_camera(cap: &mut VideoCapture, target_size: (i32, i32), fps: f64) {
        if let Ok(mjpg) = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G') {
            let _ = cap.set(videoio::CAP_PROP_FOURCC, mjpg as f64);
        }
        let _ = cap.set(videoio::CAP_PROP_FRAME_WIDTH, target_size.0 as f64);
        let _ = cap.set(videoio::CAP_PROP_FRAME_HEIGHT, target_size.1 as f64);
        let _ = cap.set(videoio::CAP_PROP_FPS, fps);
    }
}

#[cfg(test)]
mod tests {
    use super::parse_device_index;

    #[test]
    fn parses_numeric_and_dev_paths() {
        assert_eq!(parse_device_index("0"), Some(0));
        assert_eq!(parse_device_index("/dev/video2"), Some(2));
    }

    #[test]
    fn rejects_other_uris() {
        assert_eq!(parse_device_index("/dev/video"), None);
        assert_eq!(parse_device_index("/dev/videox"), None);
        assert_eq!(parse_device_index("rtsp://cam/stream"), None);
    }
}

//! Long-lived camera handle shared by every detection cycle.
//!
//! The stream is acquired once; a pump thread drains the reader channel and
//! keeps only the newest frame so samplers always see the live picture.

use std::{
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use tracing::{debug, error, info};

use crate::{
    camera::spawn_camera_reader,
    types::{CaptureError, Frame, VideoSource},
};

type LatestFrame = Arc<Mutex<Option<Frame>>>;

#[derive(Default)]
pub struct CameraStream {
    latest: LatestFrame,
    running: Arc<AtomicBool>,
}

impl CameraStream {
    /// A stream with no camera attached yet.
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Acquire the camera at `uri`. Returns `false` when the stream is
    /// already running, in which case nothing changes.
    pub fn start(&self, uri: &str, target_size: (i32, i32)) -> Result<bool> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("camera stream already running; ignoring start request");
            return Ok(false);
        }

        let receiver = match spawn_camera_reader(uri, target_size) {
            Ok(rx) => rx,
            Err(err) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(err).with_context(|| format!("Failed to start capture from {uri}"));
            }
        };
        self.attach(receiver)?;
        info!(
            "camera stream started: {uri} at {}x{}",
            target_size.0, target_size.1
        );
        Ok(true)
    }

    /// Drive the stream from an existing frame receiver.
    pub fn attach(&self, receiver: Receiver<Result<Frame, CaptureError>>) -> Result<()> {
        self.attach_with(receiver, |name, pump| {
            thread::Builder::new().name(name.into()).spawn(pump).map(drop)
        })
    }

    /// `running` is cleared again when the pump thread cannot be spawned, so
    /// a later `start` can retry.
    fn attach_with<S>(
        &self,
        receiver: Receiver<Result<Frame, CaptureError>>,
        spawn: S,
    ) -> Result<()>
    where
        S: FnOnce(&str, Box<dyn FnOnce() + Send>) -> io::Result<()>,
    {
        self.running.store(true, Ordering::SeqCst);
        let latest = self.latest.clone();
        let running = self.running.clone();
        let pump = Box::new(move || pump_frames(receiver, latest, running));
        if let Err(err) = spawn("camera-pump", pump) {
            self.running.store(false, Ordering::SeqCst);
            return Err(err).context("Failed to spawn camera pump thread");
        }
        Ok(())
    }
}

impl VideoSource for CameraStream {
    fn current_frame(&self) -> Option<Frame> {
        if !self.is_running() {
            return None;
        }
        self.latest.lock().ok().and_then(|guard| guard.clone())
    }
}

fn pump_frames(
    receiver: Receiver<Result<Frame, CaptureError>>,
    latest: LatestFrame,
    running: Arc<AtomicBool>,
) {
    for message in receiver {
        match message {
            Ok(frame) => {
                if let Ok(mut guard) = latest.lock() {
                    *guard = Some(frame);
                }
            }
            Err(err) => {
                error!("Capture error: {err}");
                break;
            }
        }
    }
    running.store(false, Ordering::SeqCst);
    if let Ok(mut guard) = latest.lock() {
        *guard = None;
    }
    debug!("camera stream stopped");
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use anyhow::anyhow;
    use crossbeam_channel::bounded;

    use super::*;
    use crate::types::FrameFormat;

    fn frame(ts: i64) -> Frame {
        Frame {
            data: vec![0; 12],
            width: 2,
            height: 2,
            timestamp_ms: ts,
            format: FrameFormat::Bgr8,
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn idle_stream_has_no_frame() {
        let stream = CameraStream::idle();
        assert!(!stream.is_running());
        assert!(stream.current_frame().is_none());
    }

    #[test]
    fn keeps_only_the_newest_frame() {
        let stream = CameraStream::idle();
        let (tx, rx) = bounded(4);
        stream.attach(rx).unwrap();
        tx.send(Ok(frame(1))).unwrap();
        tx.send(Ok(frame(2))).unwrap();

        assert!(wait_until(|| stream
            .current_frame()
            .is_some_and(|f| f.timestamp_ms == 2)));
        assert!(stream.is_running());
    }

    #[test]
    fn reader_error_stops_the_stream() {
        let stream = CameraStream::idle();
        let (tx, rx) = bounded(4);
        stream.attach(rx).unwrap();
        tx.send(Ok(frame(1))).unwrap();
        tx.send(Err(CaptureError::Other(anyhow!("device unplugged"))))
            .unwrap();

        assert!(wait_until(|| !stream.is_running()));
        assert!(stream.current_frame().is_none());
    }

    #[test]
    fn failed_pump_spawn_leaves_the_stream_stopped() {
        let stream = CameraStream::idle();
        let (_tx, rx) = bounded(1);
        let err = stream
            .attach_with(rx, |_, _| Err(io::Error::other("thread limit reached")))
            .unwrap_err();
        assert!(format!("{err:#}").contains("thread limit reached"));
        assert!(!stream.is_running());

        let (tx, rx) = bounded(1);
        stream.attach(rx).unwrap();
        tx.send(Ok(frame(7))).unwrap();
        assert!(wait_until(|| stream.current_frame().is_some()));
    }
}

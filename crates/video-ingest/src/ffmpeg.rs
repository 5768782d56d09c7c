use std::{
    io::Read,
    process::{Child, Command, Stdio},
    thread,
};

use anyhow::{Result, anyhow};
use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, bounded};
use tracing::debug;

use crate::{
    camera::parse_device_index,
    types::{CaptureError, Frame, FrameFormat},
};

/// Spawns an ffmpeg process that reads `uri` (a V4L device index, a
/// `/dev/videoX` path, or any ffmpeg input) and yields BGR8 frames scaled to
/// `target_size` via a background thread.
pub fn spawn_ffmpeg_camera_reader(
    uri: &str,
    target_size: (i32, i32),
) -> Result<Receiver<Result<Frame, CaptureError>>> {
    let cmd = build_capture_command(uri, target_size);
    debug!("ffmpeg capture command: {:?}", cmd);
    spawn_ffmpeg_reader(cmd, target_size, 2)
}

fn build_capture_command(uri: &str, target_size: (i32, i32)) -> Command {
    let scale_arg = format!("scale={}:{}", target_size.0, target_size.1);
    let device = if let Some(index) = parse_device_index(uri) {
        Some(format!("/dev/video{index}"))
    } else if uri.starts_with("/dev/video") {
        Some(uri.to_string())
    } else {
        None
    };

    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-hide_banner").arg("-loglevel").arg("error");

    match device {
        Some(path) => {
            cmd.arg("-f")
                .arg("video4linux2")
                .arg("-video_size")
                .arg(format!("{}x{}", target_size.0, target_size.1))
                .arg("-i")
                .arg(path);
        }
        None => {
            if uri.starts_with("rtsp://") || uri.starts_with("rtsps://") {
                cmd.arg("-rtsp_transport").arg("tcp");
            }
            cmd.arg("-fflags")
                .arg("nobuffer")
                .arg("-flags")
                .arg("low_delay")
                .arg("-i")
                .arg(uri);
        }
    }

    cmd.arg("-an")
        .arg("-vf")
        .arg(&scale_arg)
        .arg("-pix_fmt")
        .arg("bgr24")
        .arg("-f")
        .arg("rawvideo")
        .arg("-");
    cmd
}

fn spawn_ffmpeg_reader(
    mut cmd: Command,
    target_size: (i32, i32),
    queue_size: usize,
) -> Result<Receiver<Result<Frame, CaptureError>>> {
    let (tx, rx) = bounded(queue_size);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    let mut child = cmd.spawn().map_err(|err| CaptureError::Other(err.into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| CaptureError::Other(anyhow!("failed to capture ffmpeg stdout")))?;

    thread::Builder::new()
        .name("ffmpeg-capture".into())
        .spawn(move || {
            if let Err(err) = ffmpeg_loop(stdout, child, target_size, tx.clone()) {
                let _ = tx.send(Err(err));
            }
        })
        .map_err(|err| CaptureError::Other(err.into()))?;

    Ok(rx)
}

fn ffmpeg_loop(
    mut stdout: impl Read,
    mut child: Child,
    target_size: (i32, i32),
    tx: Sender<Result<Frame, CaptureError>>,
) -> Result<(), CaptureError> {
    let frame_bytes = (target_size.0 as usize) * (target_size.1 as usize) * 3;
    let mut buffer = vec![0u8; frame_bytes];
    let mut result = Ok(());

    loop {
        match stdout.read_exact(&mut buffer) {
            Ok(()) => {
                let timestamp_ms = Utc::now().timestamp_millis();
                if tx
                    .send(Ok(Frame {
                        data: buffer.clone(),
                        width: target_size.0,
                        height: target_size.1,
                        timestamp_ms,
                        format: FrameFormat::Bgr8,
                    }))
                    .is_err()
                {
                    break;
                }
            }
            Err(err) => {
                result = Err(CaptureError::Other(err.into()));
                break;
            }
        }
    }

    let _ = child.kill();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn device_index_uses_v4l_input() {
        let cmd = build_capture_command("0", (640, 480));
        let args = args(&cmd);
        assert!(args.windows(2).any(|w| w == ["-f", "video4linux2"]));
        assert!(args.windows(2).any(|w| w == ["-i", "/dev/video0"]));
        assert!(args.windows(2).any(|w| w == ["-video_size", "640x480"]));
        assert!(args.windows(2).any(|w| w == ["-pix_fmt", "bgr24"]));
    }

    #[test]
    fn rtsp_source_forces_tcp_transport() {
        let cmd = build_capture_command("rtsp://cam.local/stream", (320, 240));
        let args = args(&cmd);
        assert!(args.windows(2).any(|w| w == ["-rtsp_transport", "tcp"]));
        assert!(args.windows(2).any(|w| w == ["-i", "rtsp://cam.local/stream"]));
        assert!(!args.iter().any(|a| a == "video4linux2"));
    }

    #[test]
    fn loop_emits_frames_until_eof() {
        let (tx, rx) = bounded(4);
        let payload = vec![7u8; 2 * 2 * 3 * 2];
        let child = Command::new("true").spawn().expect("spawn true");
        let result = ffmpeg_loop(payload.as_slice(), child, (2, 2), tx);

        let frames: Vec<_> = rx.try_iter().collect();
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.as_ref().is_ok_and(|f| f.data.len() == 12)));
        assert!(matches!(result, Err(CaptureError::Other(_))));
    }
}

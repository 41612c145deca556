//! Video sinks. The default sink pipes raw RGB frames into an ffmpeg child.

use std::ffi::OsString;
use std::fs::File;
use std::io::{Read, Write};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::{self, JoinHandle};

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::error::{RecorderError, Result};

const VIDEO_CODEC: &str = "libx264";

pub trait FrameSink: Send {
    fn write(&mut self, frame: &RgbImage) -> Result<()>;

    /// Flushes and closes the output.
    fn finish(self: Box<Self>) -> Result<()>;
}

pub trait EncoderBackend: Send + Sync {
    fn open(&self, path: &Path, width: u32, height: u32, fps: u32) -> Result<Box<dyn FrameSink>>;
}

#[derive(Clone, Debug)]
pub struct FfmpegEncoder {
    pub program: PathBuf,
    /// x264 CRF, lower is better quality.
    pub crf: u32,
    pub preset: String,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            crf: 23,
            preset: "fast".into(),
        }
    }
}

impl FfmpegEncoder {
    pub fn args(&self, path: &Path, width: u32, height: u32, fps: u32) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-nostats",
            "-y",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        args.push("-s".into());
        args.push(format!("{width}x{height}").into());
        args.push("-r".into());
        args.push(fps.to_string().into());
        args.push("-i".into());
        args.push("-".into());
        args.push("-an".into());
        args.push("-c:v".into());
        args.push(VIDEO_CODEC.into());
        args.push("-preset".into());
        args.push(self.preset.clone().into());
        args.push("-crf".into());
        args.push(self.crf.to_string().into());
        // yuv420p needs even dimensions
        args.push("-vf".into());
        args.push("pad=ceil(iw/2)*2:ceil(ih/2)*2".into());
        args.push("-pix_fmt".into());
        args.push("yuv420p".into());
        args.push("-movflags".into());
        args.push("+faststart".into());
        args.push(path.as_os_str().to_owned());
        args
    }

    fn ensure_codec(&self) -> Result<()> {
        let output = Command::new(&self.program)
            .args(["-hide_banner", "-encoders"])
            .output()
            .map_err(|e| {
                RecorderError::Encoder(format!(
                    "cannot run {}: {e}; make sure ffmpeg is installed and in PATH",
                    self.program.display()
                ))
            })?;

        let listing = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() || !listing.contains(VIDEO_CODEC) {
            return Err(RecorderError::Encoder(format!(
                "{} does not provide the {VIDEO_CODEC} encoder",
                self.program.display()
            )));
        }
        Ok(())
    }

    fn spawn(&self, path: &Path, width: u32, height: u32, fps: u32) -> Result<FfmpegSink> {
        self.ensure_codec()?;

        // ffmpeg only opens the output after the first frame; check writability now.
        File::create(path).map_err(|e| {
            RecorderError::Encoder(format!("cannot create {}: {e}", path.display()))
        })?;

        let mut command = Command::new(&self.program);
        command
            .args(self.args(path, width, height, fps))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            // Own process group: a terminal Ctrl+C must reach only the recorder,
            // which then closes stdin so ffmpeg can write the trailer.
            .process_group(0);
        debug!("spawning encoder: {command:?}");

        let mut child = command.spawn().map_err(|e| {
            RecorderError::Encoder(format!("failed to start {}: {e}", self.program.display()))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RecorderError::Encoder("failed to open ffmpeg stdin".into()))?;
        let stderr = match child.stderr.take().map(drain_stderr).transpose() {
            Ok(stderr) => stderr,
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(err.into());
            }
        };

        info!("encoding {width}x{height}@{fps} to {}", path.display());
        Ok(FfmpegSink {
            child: Some(child),
            stdin: Some(stdin),
            stderr,
            frame_len: width as usize * height as usize * 3,
            frames: 0,
        })
    }
}

impl EncoderBackend for FfmpegEncoder {
    fn open(&self, path: &Path, width: u32, height: u32, fps: u32) -> Result<Box<dyn FrameSink>> {
        Ok(Box::new(self.spawn(path, width, height, fps)?))
    }
}

/// Reads ffmpeg's stderr on a helper thread so a chatty encoder never blocks on a full pipe.
fn drain_stderr<R: Read + Send + 'static>(mut pipe: R) -> std::io::Result<JoinHandle<String>> {
    thread::Builder::new()
        .name("zoomcap-ffmpeg-stderr".into())
        .spawn(move || {
            let mut bytes = Vec::new();
            let _ = pipe.read_to_end(&mut bytes);
            String::from_utf8_lossy(&bytes).into_owned()
        })
}

struct FfmpegSink {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    frame_len: usize,
    frames: u64,
}

impl FrameSink for FfmpegSink {
    fn write(&mut self, frame: &RgbImage) -> Result<()> {
        let data = frame.as_raw();
        if data.len() != self.frame_len {
            return Err(RecorderError::Encoder(format!(
                "frame of {} bytes does not match the stream size of {} bytes",
                data.len(),
                self.frame_len
            )));
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| RecorderError::Encoder("encoder already closed".into()))?;
        stdin
            .write_all(data)
            .map_err(|e| RecorderError::Encoder(format!("ffmpeg pipe closed: {e}")))?;

        self.frames += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        // EOF on stdin lets ffmpeg write the trailer.
        self.stdin.take();

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait()?;
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if !status.success() {
            return Err(RecorderError::Encoder(format!(
                "ffmpeg exited with {status}: {}",
                stderr.trim().chars().take(500).collect::<String>()
            )));
        }

        debug!("encoder finished after {} frames", self.frames);
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        self.stdin.take();
        if let Some(mut child) = self.child.take()
            && let Err(e) = child.wait()
        {
            warn!("failed to reap ffmpeg: {e}");
        }
    }
}

//! Synthetic backends for loop and session tests.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use image::{Rgba, RgbaImage, RgbImage};
use parking_lot::Mutex;

use crate::capture::Backends;
use crate::capture::command_utils::GifConverter;
use crate::capture::encoder::{EncoderBackend, FrameSink};
use crate::capture::input::{PointerBackend, PointerSample, PointerSource};
use crate::capture::source::{CaptureBackend, FrameSource};
use crate::config::CaptureRect;
use crate::error::{RecorderError, Result};

/// Serves the same gradient frame on every grab.
#[derive(Clone)]
pub(crate) struct FakeCapture {
    frame: RgbaImage,
    grabs: Arc<AtomicUsize>,
    fail_after: Option<usize>,
    fail_open: bool,
    grab_delay: Duration,
}

impl FakeCapture {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        let frame = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
        });
        Self {
            frame,
            grabs: Arc::new(AtomicUsize::new(0)),
            fail_after: None,
            fail_open: false,
            grab_delay: Duration::ZERO,
        }
    }

    /// Every grab blocks for `delay` before returning.
    pub(crate) fn with_grab_delay(mut self, delay: Duration) -> Self {
        self.grab_delay = delay;
        self
    }

    /// The first `grabs` grabs succeed, every later one fails.
    pub(crate) fn fail_after(mut self, grabs: usize) -> Self {
        self.fail_after = Some(grabs);
        self
    }

    pub(crate) fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub(crate) fn frame(&self) -> &RgbaImage {
        &self.frame
    }

    pub(crate) fn grabs(&self) -> usize {
        self.grabs.load(Ordering::SeqCst)
    }

    pub(crate) fn source(&self) -> Box<dyn FrameSource> {
        Box::new(FakeSource {
            frame: self.frame.clone(),
            grabs: Arc::clone(&self.grabs),
            fail_after: self.fail_after,
            delay: self.grab_delay,
        })
    }
}

impl CaptureBackend for FakeCapture {
    fn primary_bounds(&self) -> Result<CaptureRect> {
        let (width, height) = self.frame.dimensions();
        Ok(CaptureRect::new(0, 0, width as i32, height as i32))
    }

    fn open(&self, _rect: CaptureRect) -> Result<Box<dyn FrameSource>> {
        if self.fail_open {
            return Err(RecorderError::Capture("display not available".into()));
        }
        Ok(self.source())
    }
}

struct FakeSource {
    frame: RgbaImage,
    grabs: Arc<AtomicUsize>,
    fail_after: Option<usize>,
    delay: Duration,
}

impl FrameSource for FakeSource {
    fn grab(&mut self) -> Result<RgbaImage> {
        let previous = self.grabs.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if self.fail_after.is_some_and(|limit| previous >= limit) {
            return Err(RecorderError::Capture("capture source went away".into()));
        }
        Ok(self.frame.clone())
    }
}

/// Replays samples in order and then keeps repeating the last one.
pub(crate) struct ScriptedPointer {
    samples: Vec<PointerSample>,
    fail_open: bool,
}

impl ScriptedPointer {
    pub(crate) fn new(samples: Vec<PointerSample>) -> Self {
        Self {
            samples,
            fail_open: false,
        }
    }

    pub(crate) fn idle() -> Self {
        Self::new(Vec::new())
    }

    pub(crate) fn failing() -> Self {
        Self {
            samples: Vec::new(),
            fail_open: true,
        }
    }
}

impl PointerBackend for ScriptedPointer {
    fn open(&self) -> Result<Box<dyn PointerSource>> {
        if self.fail_open {
            return Err(RecorderError::Input("no pointer device".into()));
        }
        Ok(Box::new(ScriptedSource {
            samples: self.samples.clone(),
            next: 0,
        }))
    }
}

struct ScriptedSource {
    samples: Vec<PointerSample>,
    next: usize,
}

impl PointerSource for ScriptedSource {
    fn sample(&mut self) -> PointerSample {
        let index = self.next.min(self.samples.len().saturating_sub(1));
        self.next += 1;
        self.samples.get(index).copied().unwrap_or_default()
    }
}

type OpenedStream = (PathBuf, u32, u32, u32);

/// Keeps every written frame in memory.
#[derive(Clone, Default)]
pub(crate) struct MemoryEncoder {
    frames: Arc<Mutex<Vec<RgbImage>>>,
    finished: Arc<AtomicBool>,
    opened: Arc<Mutex<Option<OpenedStream>>>,
    fail_open: bool,
}

impl MemoryEncoder {
    pub(crate) fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    pub(crate) fn sink(&self) -> Box<dyn FrameSink> {
        Box::new(MemorySink {
            frames: Arc::clone(&self.frames),
            finished: Arc::clone(&self.finished),
        })
    }

    pub(crate) fn frames(&self) -> Vec<RgbImage> {
        self.frames.lock().clone()
    }

    pub(crate) fn frame_count(&self) -> usize {
        self.frames.lock().len()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub(crate) fn opened(&self) -> Option<OpenedStream> {
        self.opened.lock().clone()
    }
}

impl EncoderBackend for MemoryEncoder {
    fn open(&self, path: &Path, width: u32, height: u32, fps: u32) -> Result<Box<dyn FrameSink>> {
        if self.fail_open {
            return Err(RecorderError::Encoder("codec not available".into()));
        }
        File::create(path)?;
        *self.opened.lock() = Some((path.to_path_buf(), width, height, fps));
        Ok(self.sink())
    }
}

struct MemorySink {
    frames: Arc<Mutex<Vec<RgbImage>>>,
    finished: Arc<AtomicBool>,
}

impl FrameSink for MemorySink {
    fn write(&mut self, frame: &RgbImage) -> Result<()> {
        self.frames.lock().push(frame.clone());
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub(crate) struct RecordingGif {
    calls: Arc<Mutex<Vec<(PathBuf, PathBuf)>>>,
    fail: bool,
}

impl RecordingGif {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<(PathBuf, PathBuf)> {
        self.calls.lock().clone()
    }
}

impl GifConverter for RecordingGif {
    fn convert(&self, video: &Path, gif: &Path) -> Result<bool> {
        self.calls
            .lock()
            .push((video.to_path_buf(), gif.to_path_buf()));
        if self.fail {
            return Err(RecorderError::PostProcess("converter exited with status 1".into()));
        }
        Ok(true)
    }
}

pub(crate) fn fake_backends(
    capture: &FakeCapture,
    encoder: &MemoryEncoder,
    gif: &RecordingGif,
    pointer: ScriptedPointer,
) -> Backends {
    Backends {
        capture: Arc::new(capture.clone()),
        pointer: Arc::new(pointer),
        encoder: Arc::new(encoder.clone()),
        gif: Arc::new(gif.clone()),
    }
}

/// A per-test directory under the system temp dir.
pub(crate) fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("zoomcap-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

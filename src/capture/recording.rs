//! Recording lifecycle: the capture/encode loop and the single-use [`Recorder`]
//! that owns it.
//!
//! Two threads are active while a session runs. The input listener writes
//! cursor state into a [`CursorTracker`]; the capture thread grabs frames at
//! the configured cadence, applies zoom and overlays, and writes them to the
//! encoder sink. Pause and stop are plain atomic flags checked once per loop
//! iteration.

use std::fs;
use std::io::ErrorKind;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::capture::Backends;
use crate::capture::effects::OverlayRenderer;
use crate::capture::encoder::FrameSink;
use crate::capture::input::{CursorTracker, InputListener, POINTER_POLL_INTERVAL};
use crate::capture::output::{OutputPaths, build_output_paths};
use crate::capture::source::{FrameSource, to_encoder_layout};
use crate::capture::zoom::{FrameTransform, ZoomDecider, crop_rect, zoom_frame};
use crate::config::{CaptureRect, RecorderConfig};
use crate::error::{RecorderError, Result};

const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(5);
const MAX_IDLE_SLEEP: Duration = Duration::from_millis(1);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Paused,
    Stopped,
}

/// Why the capture loop exited.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Termination {
    Stopped,
    CaptureFailed(String),
    EncoderFailed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordingOutput {
    pub video_path: PathBuf,
    /// Set only when a GIF was requested and actually produced.
    pub gif_path: Option<PathBuf>,
    pub frames_written: u64,
    pub termination: Termination,
}

#[derive(Debug)]
pub(crate) struct LoopFlags {
    running: AtomicBool,
    paused: AtomicBool,
}

impl LoopFlags {
    pub(crate) fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            paused: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub(crate) fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Returns the new paused value.
    pub(crate) fn toggle_pause(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::AcqRel)
    }
}

/// Fixed-cadence frame scheduler.
///
/// A loop that falls more than one interval behind drops the missed frames
/// instead of bursting to catch up.
#[derive(Clone, Copy, Debug)]
pub struct FramePacer {
    interval: Duration,
    next_due: Instant,
}

impl FramePacer {
    pub fn new(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            next_due: start + interval,
        }
    }

    /// Returns true when a frame is due at `now` and schedules the next one.
    pub fn poll(&mut self, now: Instant) -> bool {
        if now < self.next_due {
            return false;
        }

        self.next_due += self.interval;
        if self.next_due <= now {
            self.next_due = now + self.interval;
        }
        true
    }

    pub fn until_due(&self, now: Instant) -> Duration {
        self.next_due.saturating_duration_since(now)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Tick {
    /// Not due yet.
    Idle,
    Paused,
    Wrote,
}

pub(crate) struct LoopOutcome {
    pub(crate) sink: Box<dyn FrameSink>,
    pub(crate) frames_written: u64,
    pub(crate) termination: Termination,
}

pub(crate) struct CaptureLoop {
    source: Box<dyn FrameSource>,
    sink: Box<dyn FrameSink>,
    tracker: CursorTracker,
    decider: ZoomDecider,
    renderer: OverlayRenderer,
    pacer: FramePacer,
    rect: CaptureRect,
    zoom: f64,
    ripple_decay: Duration,
    flags: Arc<LoopFlags>,
    frames_written: u64,
}

impl CaptureLoop {
    pub(crate) fn new(
        config: &RecorderConfig,
        rect: CaptureRect,
        source: Box<dyn FrameSource>,
        sink: Box<dyn FrameSink>,
        tracker: CursorTracker,
        flags: Arc<LoopFlags>,
        start: Instant,
    ) -> Self {
        Self {
            source,
            sink,
            tracker,
            decider: ZoomDecider::new(config.mode, &config.tuning),
            renderer: OverlayRenderer::new(config.tuning.clone(), config.highlight),
            pacer: FramePacer::new(config.frame_interval(), start),
            rect,
            zoom: config.zoom,
            ripple_decay: config.tuning.ripple_decay,
            flags,
            frames_written: 0,
        }
    }

    /// One pass of the loop body at `now`.
    pub(crate) fn tick(&mut self, now: Instant) -> Result<Tick, Termination> {
        if self.flags.is_paused() {
            return Ok(Tick::Paused);
        }

        if !self.pacer.poll(now) {
            return Ok(Tick::Idle);
        }

        let raw = self
            .source
            .grab()
            .map_err(|err| Termination::CaptureFailed(err.to_string()))?;
        let (width, height) = self.rect.size();
        let mut frame = to_encoder_layout(raw, width, height);

        let cursor = self.tracker.snapshot();
        let focus = (
            f64::from(cursor.x - self.rect.left),
            f64::from(cursor.y - self.rect.top),
        );

        // The decider is stateful in smart mode, so it runs every frame.
        let transform = if self.decider.should_zoom(cursor, now) && self.zoom > 1.0 {
            let crop = crop_rect(width, height, focus, self.zoom);
            frame = zoom_frame(&frame, crop);
            FrameTransform::from_crop(crop, width, height)
        } else {
            FrameTransform::identity(width, height)
        };

        let ripples = self.tracker.live_ripples(now, self.ripple_decay);
        self.renderer.render(
            &mut frame,
            &transform,
            (self.rect.left, self.rect.top),
            (cursor.x, cursor.y),
            &ripples,
            now,
        );

        self.sink
            .write(&frame)
            .map_err(|err| Termination::EncoderFailed(err.to_string()))?;
        self.frames_written += 1;
        Ok(Tick::Wrote)
    }

    pub(crate) fn run(mut self) -> LoopOutcome {
        let termination = loop {
            if !self.flags.is_running() {
                break Termination::Stopped;
            }

            match self.tick(Instant::now()) {
                Ok(Tick::Wrote) => {}
                Ok(Tick::Paused) => thread::sleep(PAUSE_POLL_INTERVAL),
                Ok(Tick::Idle) => {
                    thread::sleep(self.pacer.until_due(Instant::now()).min(MAX_IDLE_SLEEP));
                }
                Err(termination) => {
                    error!("capture loop stopped: {termination:?}");
                    self.flags.request_stop();
                    break termination;
                }
            }
        };

        debug!("capture loop exited after {} frames", self.frames_written);
        LoopOutcome {
            sink: self.sink,
            frames_written: self.frames_written,
            termination,
        }
    }
}

struct ActiveSession {
    flags: Arc<LoopFlags>,
    listener: InputListener,
    handle: JoinHandle<LoopOutcome>,
    paths: OutputPaths,
    rect: CaptureRect,
}

enum Phase {
    Idle,
    Active(ActiveSession),
    Stopped,
}

/// One recording session. Single-use: once stopped, build a new recorder.
pub struct Recorder {
    config: RecorderConfig,
    backends: Backends,
    stop_timeout: Duration,
    phase: Phase,
}

impl Recorder {
    pub fn new(config: RecorderConfig, backends: Backends) -> Self {
        Self {
            config,
            backends,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            phase: Phase::Idle,
        }
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        match &self.phase {
            Phase::Idle => SessionState::Idle,
            Phase::Stopped => SessionState::Stopped,
            Phase::Active(session) if session.handle.is_finished() => SessionState::Stopped,
            Phase::Active(session) if session.flags.is_paused() => SessionState::Paused,
            Phase::Active(_) => SessionState::Running,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.state() == SessionState::Paused
    }

    /// The rectangle being recorded, once started.
    pub fn capture_rect(&self) -> Option<CaptureRect> {
        match &self.phase {
            Phase::Active(session) => Some(session.rect),
            _ => None,
        }
    }

    pub fn output_paths(&self) -> Option<&OutputPaths> {
        match &self.phase {
            Phase::Active(session) => Some(&session.paths),
            _ => None,
        }
    }

    /// Starts input tracking and the capture loop.
    ///
    /// Configuration and encoder errors are returned before anything runs;
    /// the recorder then stays idle. Calling this on a running recorder is a
    /// no-op.
    pub fn start(&mut self) -> Result<()> {
        match self.phase {
            Phase::Idle => {}
            Phase::Active(_) => {
                debug!("recorder already running");
                return Ok(());
            }
            Phase::Stopped => return Err(RecorderError::AlreadyFinished),
        }

        self.config.validate()?;
        let rect = match self.config.capture_rect {
            Some(rect) => rect,
            None => self.backends.capture.primary_bounds()?,
        };
        rect.validate()?;

        let paths = build_output_paths(&self.config.resolved_output_dir()?)?;
        let (width, height) = rect.size();
        let sink = self
            .backends
            .encoder
            .open(&paths.video, width, height, self.config.fps)?;

        let tracker = CursorTracker::with_ripple_decay(self.config.tuning.ripple_decay);
        let mut listener = match InputListener::spawn(
            Arc::clone(&self.backends.pointer),
            tracker.clone(),
            POINTER_POLL_INTERVAL,
        ) {
            Ok(listener) => listener,
            Err(err) => {
                drop(sink);
                remove_partial_output(&paths.video);
                return Err(err);
            }
        };

        let flags = Arc::new(LoopFlags::new());
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<()>>(1);
        let capture = Arc::clone(&self.backends.capture);
        let loop_flags = Arc::clone(&flags);
        let config = self.config.clone();

        let spawned = thread::Builder::new()
            .name("zoomcap-capture".into())
            .spawn(move || {
                let source = match capture.open(rect) {
                    Ok(source) => {
                        let _ = ready_tx.send(Ok(()));
                        source
                    }
                    Err(err) => {
                        let message = err.to_string();
                        let _ = ready_tx.send(Err(err));
                        return LoopOutcome {
                            sink,
                            frames_written: 0,
                            termination: Termination::CaptureFailed(message),
                        };
                    }
                };

                CaptureLoop::new(&config, rect, source, sink, tracker, loop_flags, Instant::now())
                    .run()
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                listener.stop();
                remove_partial_output(&paths.video);
                return Err(err.into());
            }
        };

        let ready = ready_rx.recv().unwrap_or_else(|_| {
            Err(RecorderError::Capture(
                "capture thread exited before it was ready".into(),
            ))
        });
        if let Err(err) = ready {
            listener.stop();
            match handle.join() {
                Ok(outcome) => drop(outcome.sink),
                Err(_) => warn!("capture thread panicked during startup"),
            }
            remove_partial_output(&paths.video);
            return Err(err);
        }

        info!(
            "recording {rect} at {} fps ({} mode, zoom {:.1}) to {}",
            self.config.fps,
            self.config.mode,
            self.config.zoom,
            paths.video.display()
        );

        self.phase = Phase::Active(ActiveSession {
            flags,
            listener,
            handle,
            paths,
            rect,
        });
        Ok(())
    }

    /// Flips between running and paused. Returns the new paused value.
    pub fn toggle_pause(&mut self) -> bool {
        let Phase::Active(session) = &self.phase else {
            debug!("pause ignored, recorder is not running");
            return false;
        };
        if session.handle.is_finished() {
            return false;
        }

        let paused = session.flags.toggle_pause();
        info!("recording {}", if paused { "paused" } else { "resumed" });
        paused
    }

    /// Stops the session and finalizes its output.
    ///
    /// Returns `Ok(None)` when there was nothing to stop. A capture failure
    /// during the session is reported through [`RecordingOutput::termination`]
    /// with every frame written so far kept in the video.
    pub fn stop(&mut self) -> Result<Option<RecordingOutput>> {
        let Phase::Active(mut session) = mem::replace(&mut self.phase, Phase::Stopped) else {
            return Ok(None);
        };

        session.flags.request_stop();
        session.listener.stop();

        let deadline = Instant::now() + self.stop_timeout;
        while !session.handle.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    "capture loop still running after {:?}, abandoning it",
                    self.stop_timeout
                );
                return Err(RecorderError::StopTimeout);
            }
            thread::sleep(STOP_POLL_INTERVAL);
        }

        let outcome = session
            .handle
            .join()
            .map_err(|_| RecorderError::Capture("capture thread panicked".into()))?;

        match (outcome.sink.finish(), &outcome.termination) {
            (Ok(()), _) => {}
            (Err(err), Termination::EncoderFailed(_)) => {
                warn!("encoder did not close cleanly: {err}");
            }
            (Err(err), _) => return Err(err),
        }

        let gif_path = if self.config.output_gif && outcome.frames_written > 0 {
            self.export_gif(&session.paths)
        } else {
            None
        };

        info!(
            "recording saved to {} ({} frames)",
            session.paths.video.display(),
            outcome.frames_written
        );

        Ok(Some(RecordingOutput {
            video_path: session.paths.video,
            gif_path,
            frames_written: outcome.frames_written,
            termination: outcome.termination,
        }))
    }

    fn export_gif(&self, paths: &OutputPaths) -> Option<PathBuf> {
        match self.backends.gif.convert(&paths.video, &paths.gif) {
            Ok(true) => Some(paths.gif.clone()),
            Ok(false) => None,
            Err(err) => {
                warn!("GIF export failed, keeping the video only: {err}");
                None
            }
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Phase::Active(session) = &self.phase {
            session.flags.request_stop();
        }
    }
}

fn remove_partial_output(path: &Path) {
    if let Err(err) = fs::remove_file(path)
        && err.kind() != ErrorKind::NotFound
    {
        warn!("failed to remove {}: {err}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::input::InputEvent;
    use crate::capture::testing::{
        FakeCapture, MemoryEncoder, RecordingGif, ScriptedPointer, fake_backends, scratch_dir,
    };
    use crate::config::{EffectTuning, ZoomMode};
    use crate::error::ConfigError;

    fn run_synthetic(capture_loop: &mut CaptureLoop, start: Instant, millis: u64) -> Vec<Tick> {
        (1..=millis)
            .map(|ms| capture_loop.tick(start + Duration::from_millis(ms)).unwrap())
            .collect()
    }

    fn wait_for_state(recorder: &Recorder, state: SessionState) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while recorder.state() != state && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn pacer_spaces_frames_at_interval() {
        let start = Instant::now();
        let mut pacer = FramePacer::new(Duration::from_secs_f64(1.0 / 30.0), start);

        let due = (1..=1000)
            .filter(|ms| pacer.poll(start + Duration::from_millis(*ms)))
            .count();
        assert_eq!(due, 30);
    }

    #[test]
    fn pacer_drops_missed_frames_instead_of_bursting() {
        let start = Instant::now();
        let mut pacer = FramePacer::new(Duration::from_millis(10), start);

        assert!(pacer.poll(start + Duration::from_millis(100)));
        assert!(!pacer.poll(start + Duration::from_millis(101)));
        assert_eq!(
            pacer.until_due(start + Duration::from_millis(101)),
            Duration::from_millis(9)
        );
    }

    #[test]
    fn paused_loop_grabs_and_writes_nothing() {
        let capture = FakeCapture::new(64, 48);
        let encoder = MemoryEncoder::default();
        let tracker = CursorTracker::new();
        let flags = Arc::new(LoopFlags::new());
        let config = RecorderConfig::new(ZoomMode::Always);
        let start = Instant::now();
        let mut capture_loop = CaptureLoop::new(
            &config,
            CaptureRect::new(0, 0, 64, 48),
            capture.source(),
            encoder.sink(),
            tracker.clone(),
            Arc::clone(&flags),
            start,
        );

        assert!(flags.toggle_pause());
        tracker.apply(InputEvent::Press { x: 7, y: 9 }, start);

        let ticks = run_synthetic(&mut capture_loop, start, 500);
        assert!(ticks.iter().all(|tick| *tick == Tick::Paused));
        assert_eq!(capture.grabs(), 0);
        assert_eq!(encoder.frame_count(), 0);

        // tracking keeps going while paused
        let cursor = tracker.snapshot();
        assert_eq!((cursor.x, cursor.y, cursor.button_down), (7, 9, true));
        assert_eq!(tracker.pending_ripples(), 1);

        assert!(!flags.toggle_pause());
        capture_loop
            .tick(start + Duration::from_millis(600))
            .unwrap();
        assert_eq!(encoder.frame_count(), 1);
    }

    #[test]
    fn always_mode_writes_thirty_frames_per_second() {
        let capture = FakeCapture::new(640, 480);
        let encoder = MemoryEncoder::default();
        let tracker = CursorTracker::new();
        let config = RecorderConfig::new(ZoomMode::Always).with_fps(30);
        let start = Instant::now();
        tracker.apply(InputEvent::Move { x: 320, y: 240 }, start);

        let mut capture_loop = CaptureLoop::new(
            &config,
            CaptureRect::new(0, 0, 640, 480),
            capture.source(),
            encoder.sink(),
            tracker,
            Arc::new(LoopFlags::new()),
            start,
        );

        let written = run_synthetic(&mut capture_loop, start, 1000)
            .into_iter()
            .filter(|tick| *tick == Tick::Wrote)
            .count();
        assert_eq!(written, 30);
        assert_eq!(capture.grabs(), 30);
        assert!(
            encoder
                .frames()
                .iter()
                .all(|frame| frame.dimensions() == (640, 480))
        );
    }

    #[test]
    fn click_drag_without_button_never_zooms() {
        let capture = FakeCapture::new(120, 80);
        let encoder = MemoryEncoder::default();
        let tracker = CursorTracker::new();
        let config = RecorderConfig::new(ZoomMode::ClickDrag)
            .with_zoom(3.0)
            .with_highlight(false);
        let start = Instant::now();
        tracker.apply(InputEvent::Move { x: 30, y: 20 }, start);

        let mut capture_loop = CaptureLoop::new(
            &config,
            CaptureRect::new(0, 0, 120, 80),
            capture.source(),
            encoder.sink(),
            tracker,
            Arc::new(LoopFlags::new()),
            start,
        );
        run_synthetic(&mut capture_loop, start, 200);

        let raw = to_encoder_layout(capture.frame().clone(), 120, 80);
        let frames = encoder.frames();
        assert!(!frames.is_empty());
        assert!(frames.iter().all(|frame| *frame == raw));
    }

    #[test]
    fn ripple_decay_comes_from_tuning() {
        let capture = FakeCapture::new(32, 32);
        let encoder = MemoryEncoder::default();
        let tracker = CursorTracker::new();
        let tuning = EffectTuning {
            ripple_decay: Duration::from_millis(150),
            ..EffectTuning::default()
        };
        let config = RecorderConfig::new(ZoomMode::Always)
            .with_fps(10)
            .with_tuning(tuning);
        assert_eq!(config.tuning.ripple_decay, Duration::from_millis(150));

        let start = Instant::now();
        tracker.apply(InputEvent::Press { x: 4, y: 4 }, start);
        let mut capture_loop = CaptureLoop::new(
            &config,
            CaptureRect::new(0, 0, 32, 32),
            capture.source(),
            encoder.sink(),
            tracker.clone(),
            Arc::new(LoopFlags::new()),
            start,
        );

        capture_loop.tick(start + Duration::from_millis(100)).unwrap();
        assert_eq!(tracker.pending_ripples(), 1);
        // the default 600 ms window would still hold it here
        capture_loop.tick(start + Duration::from_millis(200)).unwrap();
        assert_eq!(tracker.pending_ripples(), 0);
    }

    #[test]
    fn grab_failure_ends_the_loop() {
        let capture = FakeCapture::new(32, 32).fail_after(2);
        let encoder = MemoryEncoder::default();
        let config = RecorderConfig::new(ZoomMode::Always).with_fps(10);
        let start = Instant::now();
        let mut capture_loop = CaptureLoop::new(
            &config,
            CaptureRect::new(0, 0, 32, 32),
            capture.source(),
            encoder.sink(),
            CursorTracker::new(),
            Arc::new(LoopFlags::new()),
            start,
        );

        for step in 1..=2 {
            let tick = capture_loop.tick(start + Duration::from_millis(100 * step));
            assert_eq!(tick, Ok(Tick::Wrote));
        }
        let tick = capture_loop.tick(start + Duration::from_millis(300));
        assert!(matches!(tick, Err(Termination::CaptureFailed(_))));
        assert_eq!(encoder.frame_count(), 2);
    }

    // Wall-clock run: scheduler jitter makes the count loose. The exact
    // cadence is covered by always_mode_writes_thirty_frames_per_second.
    #[test]
    fn recorder_runs_end_to_end_on_real_threads() {
        let dir = scratch_dir("end-to-end");
        let capture = FakeCapture::new(160, 120);
        let encoder = MemoryEncoder::default();
        let config = RecorderConfig::new(ZoomMode::Always)
            .with_fps(30)
            .with_output_dir(&dir)
            .with_capture_rect(Some(CaptureRect::new(0, 0, 160, 120)));

        let pointer = ScriptedPointer::new(vec![Default::default()]);
        let backends = fake_backends(&capture, &encoder, &RecordingGif::default(), pointer);
        let mut recorder = Recorder::new(config, backends);

        recorder.start().unwrap();
        assert_eq!(recorder.state(), SessionState::Running);
        assert_eq!(recorder.capture_rect(), Some(CaptureRect::new(0, 0, 160, 120)));

        thread::sleep(Duration::from_secs(1));
        let output = recorder.stop().unwrap().unwrap();

        assert_eq!(recorder.state(), SessionState::Stopped);
        assert_eq!(output.termination, Termination::Stopped);
        assert!((20..=31).contains(&output.frames_written));
        assert_eq!(output.frames_written, encoder.frame_count() as u64);
        assert!(encoder.is_finished());
        assert!(!output.video_path.as_os_str().is_empty());
        assert!(output.video_path.starts_with(&dir));
        assert_eq!(output.gif_path, None);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn second_stop_is_a_noop() {
        let dir = scratch_dir("double-stop");
        let capture = FakeCapture::new(32, 32);
        let encoder = MemoryEncoder::default();
        let config = RecorderConfig::new(ZoomMode::Smart).with_output_dir(&dir);
        let backends =
            fake_backends(&capture, &encoder, &RecordingGif::default(), ScriptedPointer::idle());
        let mut recorder = Recorder::new(config, backends);

        recorder.start().unwrap();
        // fullscreen falls back to the primary display bounds
        assert_eq!(recorder.capture_rect(), Some(CaptureRect::new(0, 0, 32, 32)));

        assert!(recorder.stop().unwrap().is_some());
        assert!(recorder.stop().unwrap().is_none());
        assert!(matches!(recorder.start(), Err(RecorderError::AlreadyFinished)));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn stop_gives_up_on_a_blocked_capture_loop() {
        let dir = scratch_dir("stop-timeout");
        let capture = FakeCapture::new(32, 32).with_grab_delay(Duration::from_secs(3));
        let encoder = MemoryEncoder::default();
        let config = RecorderConfig::new(ZoomMode::Always)
            .with_fps(60)
            .with_output_dir(&dir);
        let backends =
            fake_backends(&capture, &encoder, &RecordingGif::default(), ScriptedPointer::idle());
        let mut recorder =
            Recorder::new(config, backends).with_stop_timeout(Duration::from_millis(200));

        recorder.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while capture.grabs() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(capture.grabs(), 1);

        let asked = Instant::now();
        let result = recorder.stop();
        let waited = asked.elapsed();

        assert!(matches!(result, Err(RecorderError::StopTimeout)));
        assert!(waited >= Duration::from_millis(200));
        assert!(waited < Duration::from_secs(1));
        assert_eq!(recorder.state(), SessionState::Stopped);
        assert!(recorder.stop().unwrap().is_none());
        assert!(!encoder.is_finished());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn stop_before_start_returns_nothing() {
        let capture = FakeCapture::new(32, 32);
        let encoder = MemoryEncoder::default();
        let backends =
            fake_backends(&capture, &encoder, &RecordingGif::default(), ScriptedPointer::idle());
        let mut recorder = Recorder::new(RecorderConfig::new(ZoomMode::Always), backends);

        assert!(recorder.stop().unwrap().is_none());
        assert_eq!(recorder.state(), SessionState::Stopped);
    }

    #[test]
    fn pause_toggles_while_running() {
        let dir = scratch_dir("pause");
        let capture = FakeCapture::new(32, 32);
        let encoder = MemoryEncoder::default();
        let config = RecorderConfig::new(ZoomMode::Always).with_output_dir(&dir);
        let backends =
            fake_backends(&capture, &encoder, &RecordingGif::default(), ScriptedPointer::idle());
        let mut recorder = Recorder::new(config, backends);

        assert!(!recorder.toggle_pause());
        recorder.start().unwrap();

        assert!(recorder.toggle_pause());
        assert!(recorder.is_paused());
        assert_eq!(recorder.state(), SessionState::Paused);

        assert!(!recorder.toggle_pause());
        assert_eq!(recorder.state(), SessionState::Running);

        // stopping while paused still finalizes the output
        recorder.toggle_pause();
        let output = recorder.stop().unwrap().unwrap();
        assert_eq!(output.termination, Termination::Stopped);
        assert!(encoder.is_finished());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn invalid_config_is_rejected_before_start() {
        let capture = FakeCapture::new(32, 32);
        let encoder = MemoryEncoder::default();
        let backends =
            fake_backends(&capture, &encoder, &RecordingGif::default(), ScriptedPointer::idle());
        let config = RecorderConfig::new(ZoomMode::Always).with_zoom(0.5);
        let mut recorder = Recorder::new(config, backends);

        let result = recorder.start();
        assert!(matches!(
            result,
            Err(RecorderError::Config(ConfigError::ZoomOutOfRange(_)))
        ));
        assert_eq!(recorder.state(), SessionState::Idle);
        assert!(encoder.opened().is_none());
    }

    #[test]
    fn encoder_open_failure_is_reported_synchronously() {
        let dir = scratch_dir("encoder-failure");
        let capture = FakeCapture::new(32, 32);
        let encoder = MemoryEncoder::failing();
        let config = RecorderConfig::new(ZoomMode::Always).with_output_dir(&dir);
        let backends =
            fake_backends(&capture, &encoder, &RecordingGif::default(), ScriptedPointer::idle());
        let mut recorder = Recorder::new(config, backends);

        assert!(matches!(recorder.start(), Err(RecorderError::Encoder(_))));
        assert_eq!(recorder.state(), SessionState::Idle);
        assert_eq!(capture.grabs(), 0);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn capture_open_failure_cleans_up_the_output_file() {
        let dir = scratch_dir("capture-open-failure");
        let capture = FakeCapture::new(32, 32).failing_open();
        let encoder = MemoryEncoder::default();
        let config = RecorderConfig::new(ZoomMode::Always).with_output_dir(&dir);
        let backends =
            fake_backends(&capture, &encoder, &RecordingGif::default(), ScriptedPointer::idle());
        let mut recorder = Recorder::new(config, backends);

        assert!(matches!(recorder.start(), Err(RecorderError::Capture(_))));
        assert_eq!(recorder.state(), SessionState::Idle);

        let (video, ..) = encoder.opened().unwrap();
        assert!(!video.exists());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn capture_failure_keeps_earlier_frames() {
        let dir = scratch_dir("capture-failure");
        let capture = FakeCapture::new(32, 32).fail_after(3);
        let encoder = MemoryEncoder::default();
        let config = RecorderConfig::new(ZoomMode::Always)
            .with_fps(60)
            .with_output_dir(&dir);
        let backends =
            fake_backends(&capture, &encoder, &RecordingGif::default(), ScriptedPointer::idle());
        let mut recorder = Recorder::new(config, backends);

        recorder.start().unwrap();
        wait_for_state(&recorder, SessionState::Stopped);
        assert_eq!(recorder.state(), SessionState::Stopped);
        assert!(!recorder.toggle_pause());

        let output = recorder.stop().unwrap().unwrap();
        assert!(matches!(output.termination, Termination::CaptureFailed(_)));
        assert_eq!(output.frames_written, 3);
        assert!(encoder.is_finished());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn gif_export_uses_sibling_path() {
        let dir = scratch_dir("gif");
        let capture = FakeCapture::new(32, 32);
        let encoder = MemoryEncoder::default();
        let gif = RecordingGif::default();
        let config = RecorderConfig::new(ZoomMode::Always)
            .with_fps(60)
            .with_gif(true)
            .with_output_dir(&dir);
        let backends = fake_backends(&capture, &encoder, &gif, ScriptedPointer::idle());
        let mut recorder = Recorder::new(config, backends);

        recorder.start().unwrap();
        thread::sleep(Duration::from_millis(200));
        let output = recorder.stop().unwrap().unwrap();

        let calls = gif.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, output.video_path);
        assert_eq!(calls[0].1, output.video_path.with_extension("gif"));
        assert_eq!(output.gif_path, Some(calls[0].1.clone()));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn gif_failure_does_not_fail_the_recording() {
        let dir = scratch_dir("gif-failure");
        let capture = FakeCapture::new(32, 32);
        let encoder = MemoryEncoder::default();
        let gif = RecordingGif::failing();
        let config = RecorderConfig::new(ZoomMode::Always)
            .with_fps(60)
            .with_gif(true)
            .with_output_dir(&dir);
        let backends = fake_backends(&capture, &encoder, &gif, ScriptedPointer::idle());
        let mut recorder = Recorder::new(config, backends);

        recorder.start().unwrap();
        thread::sleep(Duration::from_millis(200));
        let output = recorder.stop().unwrap().unwrap();

        assert_eq!(gif.calls().len(), 1);
        assert_eq!(output.gif_path, None);
        assert_eq!(output.termination, Termination::Stopped);

        let _ = fs::remove_dir_all(dir);
    }
}

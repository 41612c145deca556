//! Input tracking.
//!
//! A listener thread polls the pointer, turns changes into [`InputEvent`]s and
//! applies them to a [`CursorTracker`]. The capture loop reads the tracker
//! once per frame; the lock is only held for the copy.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{RecorderError, Result};

pub const POINTER_POLL_INTERVAL: Duration = Duration::from_millis(8);
const DEFAULT_RIPPLE_DECAY: Duration = Duration::from_millis(600);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEvent {
    Move { x: i32, y: i32 },
    Press { x: i32, y: i32 },
    Release { x: i32, y: i32 },
}

/// A click marker that fades out after the ripple decay window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RippleEvent {
    pub x: i32,
    pub y: i32,
    pub created_at: Instant,
}

impl RippleEvent {
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CursorSnapshot {
    pub x: i32,
    pub y: i32,
    pub button_down: bool,
}

#[derive(Default)]
struct TrackerState {
    cursor: CursorSnapshot,
    ripples: Vec<RippleEvent>,
}

/// Shared cursor position, button state and pending ripples.
///
/// Each press drops ripples older than the decay window, so the list stays
/// bounded even when nothing reads it (for example while paused).
#[derive(Clone)]
pub struct CursorTracker {
    state: Arc<Mutex<TrackerState>>,
    ripple_decay: Duration,
}

impl Default for CursorTracker {
    fn default() -> Self {
        Self::with_ripple_decay(DEFAULT_RIPPLE_DECAY)
    }
}

impl CursorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ripple_decay(ripple_decay: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(TrackerState::default())),
            ripple_decay,
        }
    }

    pub fn apply(&self, event: InputEvent, at: Instant) {
        let mut state = self.state.lock();
        match event {
            InputEvent::Move { x, y } => {
                state.cursor.x = x;
                state.cursor.y = y;
            }
            InputEvent::Press { x, y } => {
                state.cursor.x = x;
                state.cursor.y = y;
                state.cursor.button_down = true;
                let decay = self.ripple_decay;
                state.ripples.retain(|ripple| ripple.age(at) <= decay);
                state.ripples.push(RippleEvent {
                    x,
                    y,
                    created_at: at,
                });
            }
            InputEvent::Release { x, y } => {
                state.cursor.x = x;
                state.cursor.y = y;
                state.cursor.button_down = false;
            }
        }
    }

    pub fn snapshot(&self) -> CursorSnapshot {
        self.state.lock().cursor
    }

    /// Drops ripples older than `decay` and returns the survivors in append order.
    pub fn live_ripples(&self, now: Instant, decay: Duration) -> Vec<RippleEvent> {
        let mut state = self.state.lock();
        state.ripples.retain(|ripple| ripple.age(now) <= decay);
        state.ripples.clone()
    }

    pub fn pending_ripples(&self) -> usize {
        self.state.lock().ripples.len()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PointerSample {
    pub x: i32,
    pub y: i32,
    pub button_down: bool,
}

pub trait PointerSource {
    fn sample(&mut self) -> PointerSample;
}

/// Opens a pointer source on the listener thread.
pub trait PointerBackend: Send + Sync {
    fn open(&self) -> Result<Box<dyn PointerSource>>;
}

/// Turns two consecutive pointer samples into input events.
pub fn diff_samples(previous: Option<PointerSample>, next: PointerSample) -> Vec<InputEvent> {
    let mut events = Vec::with_capacity(2);
    let (x, y) = (next.x, next.y);

    let moved = previous.is_none_or(|prev| prev.x != x || prev.y != y);
    if moved {
        events.push(InputEvent::Move { x, y });
    }

    let was_down = previous.is_some_and(|prev| prev.button_down);
    match (was_down, next.button_down) {
        (false, true) => events.push(InputEvent::Press { x, y }),
        (true, false) => events.push(InputEvent::Release { x, y }),
        _ => {}
    }

    events
}

pub struct InputListener {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl InputListener {
    /// Starts the listener thread and waits until its pointer source is open.
    pub fn spawn(
        backend: Arc<dyn PointerBackend>,
        tracker: CursorTracker,
        poll_interval: Duration,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<()>>(1);

        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("zoomcap-input".into())
            .spawn(move || {
                let mut source = match backend.open() {
                    Ok(source) => {
                        let _ = ready_tx.send(Ok(()));
                        source
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                let mut previous = None;
                while !thread_stop.load(Ordering::Acquire) {
                    let sample = source.sample();
                    let now = Instant::now();
                    for event in diff_samples(previous, sample) {
                        tracker.apply(event, now);
                    }
                    previous = Some(sample);
                    thread::sleep(poll_interval);
                }
                debug!("input listener exited");
            })?;

        let mut listener = Self {
            stop,
            handle: Some(handle),
        };

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(listener),
            Ok(Err(err)) => {
                listener.stop();
                Err(err)
            }
            Err(_) => {
                listener.stop();
                Err(RecorderError::Input(
                    "input listener exited before it was ready".into(),
                ))
            }
        }
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("input listener panicked");
        }
    }
}

impl Drop for InputListener {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(feature = "desktop")]
pub use desktop::DeviceQueryPointer;

#[cfg(feature = "desktop")]
mod desktop {
    use device_query::{DeviceQuery, DeviceState};

    use super::{PointerBackend, PointerSample, PointerSource};
    use crate::error::{RecorderError, Result};

    /// Polls the system pointer through device_query.
    pub struct DeviceQueryPointer;

    struct DeviceQuerySource {
        state: DeviceState,
    }

    impl PointerBackend for DeviceQueryPointer {
        fn open(&self) -> Result<Box<dyn PointerSource>> {
            let state = DeviceState::checked_new().ok_or_else(|| {
                RecorderError::Input("cannot access pointer state on this display".into())
            })?;
            Ok(Box::new(DeviceQuerySource { state }))
        }
    }

    impl PointerSource for DeviceQuerySource {
        fn sample(&mut self) -> PointerSample {
            let mouse = self.state.get_mouse();
            // Index 0 is unused; 1.. are the physical buttons.
            let button_down = mouse.button_pressed.iter().skip(1).any(|pressed| *pressed);
            PointerSample {
                x: mouse.coords.0,
                y: mouse.coords.1,
                button_down,
            }
        }
    }
}

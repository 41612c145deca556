mod command_utils;
mod effects;
mod encoder;
mod input;
mod output;
mod recording;
mod session;
mod source;
mod state;
mod zoom;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

pub use command_utils::{FfmpegGifConverter, GifConverter, find_in_path, pick_region_geometry};
pub use effects::{OverlayRenderer, draw_ring, ripple_style};
pub use encoder::{EncoderBackend, FfmpegEncoder, FrameSink};
pub use input::{
    CursorSnapshot, CursorTracker, InputEvent, InputListener, PointerBackend, PointerSample,
    PointerSource, RippleEvent,
};
pub use output::{OutputPaths, build_output_paths};
pub use recording::{FramePacer, Recorder, RecordingOutput, SessionState, Termination};
pub use session::SessionController;
pub use source::{CaptureBackend, FrameSource, to_encoder_layout};
pub use state::{
    CliRecordingState, clear_cli_recording_state, read_cli_recording_state,
    write_cli_recording_state,
};
pub use zoom::{CropRect, FrameTransform, ZoomDecider, crop_rect, zoom_frame};

#[cfg(feature = "desktop")]
pub use input::DeviceQueryPointer;
#[cfg(feature = "desktop")]
pub use source::XcapCapture;

use crate::config::CaptureRect;

/// What the external target provider selected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureTarget {
    Fullscreen,
    /// Window bounds as reported by the window system.
    Window {
        left: i32,
        top: i32,
        right: i32,
        bottom: i32,
    },
    Region(CaptureRect),
}

impl CaptureTarget {
    pub fn slug(self) -> &'static str {
        match self {
            CaptureTarget::Fullscreen => "fullscreen",
            CaptureTarget::Window { .. } => "window",
            CaptureTarget::Region(_) => "region",
        }
    }

    /// `None` means the primary display.
    pub fn to_rect(self) -> Option<CaptureRect> {
        match self {
            CaptureTarget::Fullscreen => None,
            CaptureTarget::Window {
                left,
                top,
                right,
                bottom,
            } => Some(CaptureRect::from_bounds(left, top, right, bottom)),
            CaptureTarget::Region(rect) => Some(rect),
        }
    }
}

/// The OS-facing collaborators a recorder needs.
#[derive(Clone)]
pub struct Backends {
    pub capture: Arc<dyn CaptureBackend>,
    pub pointer: Arc<dyn PointerBackend>,
    pub encoder: Arc<dyn EncoderBackend>,
    pub gif: Arc<dyn GifConverter>,
}

impl Backends {
    #[cfg(feature = "desktop")]
    pub fn desktop() -> Self {
        Self {
            capture: Arc::new(XcapCapture),
            pointer: Arc::new(DeviceQueryPointer),
            encoder: Arc::new(FfmpegEncoder::default()),
            gif: Arc::new(FfmpegGifConverter::default()),
        }
    }
}

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use image::Rgb;

use crate::error::ConfigError;

pub const MIN_ZOOM: f64 = 1.0;
pub const MAX_ZOOM: f64 = 4.0;
pub const MIN_FPS: u32 = 10;
pub const MAX_FPS: u32 = 60;

const OUTPUT_FOLDER: &str = "ZoomedRecordings";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZoomMode {
    Always,
    ClickDrag,
    Smart,
}

impl ZoomMode {
    pub fn slug(self) -> &'static str {
        match self {
            ZoomMode::Always => "always",
            ZoomMode::ClickDrag => "click-drag",
            ZoomMode::Smart => "smart",
        }
    }
}

impl fmt::Display for ZoomMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for ZoomMode {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "always" => Ok(ZoomMode::Always),
            "click" | "click-drag" => Ok(ZoomMode::ClickDrag),
            "smart" => Ok(ZoomMode::Smart),
            _ => Err(format!("unknown zoom mode: {input} (expected always, click-drag or smart)")),
        }
    }
}

/// Screen-space rectangle, origin at the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureRect {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl CaptureRect {
    pub fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Builds a rectangle from window bounds (left, top, right, bottom).
    pub fn from_bounds(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self::new(left, top, right - left, bottom - top)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width <= 0 || self.height <= 0 {
            return Err(ConfigError::EmptyCaptureRect {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    /// Frame dimensions; only meaningful after `validate`.
    pub fn size(&self) -> (u32, u32) {
        (self.width.max(0) as u32, self.height.max(0) as u32)
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && y >= self.top && x < self.left + self.width && y < self.top + self.height
    }
}

impl fmt::Display for CaptureRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{} {}x{}", self.left, self.top, self.width, self.height)
    }
}

/// Parses the `X,Y WxH` geometry format printed by region pickers such as slurp.
impl FromStr for CaptureRect {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let malformed = || format!("malformed geometry `{input}`, expected `X,Y WxH`");

        let (origin, size) = input.trim().split_once(' ').ok_or_else(malformed)?;
        let (x, y) = origin.split_once(',').ok_or_else(malformed)?;
        let (w, h) = size.trim().split_once('x').ok_or_else(malformed)?;

        let parse = |value: &str| value.trim().parse::<i32>().map_err(|_| malformed());
        Ok(Self::new(parse(x)?, parse(y)?, parse(w)?, parse(h)?))
    }
}

/// Constants that were tuned by eye rather than derived.
#[derive(Clone, Debug, PartialEq)]
pub struct EffectTuning {
    /// Smart mode zooms while the cursor moves slower than this (px/s).
    pub smart_speed_threshold: f64,
    /// Lower bound on the elapsed time used for speed computation.
    pub min_elapsed: Duration,
    pub ripple_decay: Duration,
    pub ripple_start_radius: f64,
    pub ripple_end_radius: f64,
    pub highlight_radius: f64,
    pub ring_thickness: f64,
    pub highlight_color: Rgb<u8>,
    pub ripple_color: Rgb<u8>,
}

impl Default for EffectTuning {
    fn default() -> Self {
        Self {
            smart_speed_threshold: 250.0,
            min_elapsed: Duration::from_millis(1),
            ripple_decay: Duration::from_millis(600),
            ripple_start_radius: 20.0,
            ripple_end_radius: 100.0,
            highlight_radius: 12.0,
            ring_thickness: 2.0,
            highlight_color: Rgb([255, 180, 0]),
            ripple_color: Rgb([255, 255, 255]),
        }
    }
}

/// Per-session recorder settings. Read-only once a session starts.
#[derive(Clone, Debug)]
pub struct RecorderConfig {
    pub mode: ZoomMode,
    pub zoom: f64,
    pub fps: u32,
    /// `None` selects the per-user default folder.
    pub output_dir: Option<PathBuf>,
    pub output_gif: bool,
    pub highlight: bool,
    /// `None` captures the primary display.
    pub capture_rect: Option<CaptureRect>,
    pub tuning: EffectTuning,
}

impl RecorderConfig {
    pub fn new(mode: ZoomMode) -> Self {
        Self {
            mode,
            zoom: 2.0,
            fps: 30,
            output_dir: None,
            output_gif: false,
            highlight: true,
            capture_rect: None,
            tuning: EffectTuning::default(),
        }
    }

    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = zoom;
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_gif(mut self, output_gif: bool) -> Self {
        self.output_gif = output_gif;
        self
    }

    pub fn with_highlight(mut self, highlight: bool) -> Self {
        self.highlight = highlight;
        self
    }

    pub fn with_capture_rect(mut self, rect: Option<CaptureRect>) -> Self {
        self.capture_rect = rect;
        self
    }

    pub fn with_tuning(mut self, tuning: EffectTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_ZOOM..=MAX_ZOOM).contains(&self.zoom) {
            return Err(ConfigError::ZoomOutOfRange(self.zoom));
        }

        if !(MIN_FPS..=MAX_FPS).contains(&self.fps) {
            return Err(ConfigError::FpsOutOfRange(self.fps));
        }

        if let Some(rect) = &self.capture_rect {
            rect.validate()?;
        }

        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }

    pub fn resolved_output_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.output_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_output_dir(),
        }
    }
}

pub fn default_output_dir() -> Result<PathBuf, ConfigError> {
    if let Some(videos_dir) = dirs::video_dir() {
        return Ok(videos_dir.join(OUTPUT_FOLDER));
    }

    if let Some(home_dir) = dirs::home_dir() {
        return Ok(home_dir.join("Videos").join(OUTPUT_FOLDER));
    }

    Err(ConfigError::MissingOutputDir)
}

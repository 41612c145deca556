//! Per-frame zoom decision and the crop/rescale transform.

use std::time::{Duration, Instant};

use image::RgbImage;
use image::imageops::{self, FilterType};

use crate::capture::input::CursorSnapshot;
use crate::config::{EffectTuning, ZoomMode};

/// Decides once per frame whether the zoom transform applies.
///
/// Smart mode is stateful: each call records the sampled position and time
/// used for the next speed estimate, so call it at most once per frame.
pub struct ZoomDecider {
    mode: ZoomMode,
    speed_threshold: f64,
    min_elapsed: Duration,
    last_sample: Option<(i32, i32, Instant)>,
}

impl ZoomDecider {
    pub fn new(mode: ZoomMode, tuning: &EffectTuning) -> Self {
        Self {
            mode,
            speed_threshold: tuning.smart_speed_threshold,
            min_elapsed: tuning.min_elapsed,
            last_sample: None,
        }
    }

    pub fn mode(&self) -> ZoomMode {
        self.mode
    }

    pub fn should_zoom(&mut self, cursor: CursorSnapshot, now: Instant) -> bool {
        match self.mode {
            ZoomMode::Always => true,
            ZoomMode::ClickDrag => cursor.button_down,
            ZoomMode::Smart => self.cursor_speed(cursor.x, cursor.y, now) < self.speed_threshold,
        }
    }

    /// Speed in px/s since the previous sample. The first sample counts as stationary.
    fn cursor_speed(&mut self, x: i32, y: i32, now: Instant) -> f64 {
        let speed = match self.last_sample {
            None => 0.0,
            Some((last_x, last_y, last_at)) => {
                let dx = f64::from(x - last_x);
                let dy = f64::from(y - last_y);
                let elapsed = now
                    .saturating_duration_since(last_at)
                    .max(self.min_elapsed)
                    .as_secs_f64();
                dx.hypot(dy) / elapsed
            }
        };

        self.last_sample = Some((x, y, now));
        speed
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    pub fn is_full(&self, width: u32, height: u32) -> bool {
        *self == Self::full(width, height)
    }
}

/// Window of `W/zoom x H/zoom` centred on `focus`, shifted to stay inside the frame.
pub fn crop_rect(frame_width: u32, frame_height: u32, focus: (f64, f64), zoom: f64) -> CropRect {
    let zoom = zoom.max(1.0);
    let width = ((f64::from(frame_width) / zoom) as u32).max(1).min(frame_width);
    let height = ((f64::from(frame_height) / zoom) as u32).max(1).min(frame_height);

    let max_x = f64::from(frame_width - width);
    let max_y = f64::from(frame_height - height);
    let x = (focus.0 - f64::from(width) / 2.0).floor().clamp(0.0, max_x) as u32;
    let y = (focus.1 - f64::from(height) / 2.0).floor().clamp(0.0, max_y) as u32;

    CropRect {
        x,
        y,
        width,
        height,
    }
}

/// Crops `frame` to `crop` and scales it back up with a bilinear filter.
pub fn zoom_frame(frame: &RgbImage, crop: CropRect) -> RgbImage {
    let (width, height) = frame.dimensions();
    if crop.is_full(width, height) {
        return frame.clone();
    }

    let cropped = imageops::crop_imm(frame, crop.x, crop.y, crop.width, crop.height).to_image();
    imageops::resize(&cropped, width, height, FilterType::Triangle)
}

/// Maps frame coordinates into the (possibly zoomed) output frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTransform {
    crop: CropRect,
    scale_x: f64,
    scale_y: f64,
}

impl FrameTransform {
    pub fn identity(width: u32, height: u32) -> Self {
        Self::from_crop(CropRect::full(width, height), width, height)
    }

    pub fn from_crop(crop: CropRect, out_width: u32, out_height: u32) -> Self {
        Self {
            crop,
            scale_x: f64::from(out_width) / f64::from(crop.width.max(1)),
            scale_y: f64::from(out_height) / f64::from(crop.height.max(1)),
        }
    }

    pub fn crop(&self) -> CropRect {
        self.crop
    }

    pub fn map_point(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - f64::from(self.crop.x)) * self.scale_x,
            (y - f64::from(self.crop.y)) * self.scale_y,
        )
    }
}

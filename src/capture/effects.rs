//! Cursor highlight and click ripple overlays.

use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};

use crate::capture::input::RippleEvent;
use crate::capture::zoom::FrameTransform;
use crate::config::EffectTuning;

pub struct OverlayRenderer {
    tuning: EffectTuning,
    highlight: bool,
}

impl OverlayRenderer {
    pub fn new(tuning: EffectTuning, highlight: bool) -> Self {
        Self { tuning, highlight }
    }

    /// Draws the highlight ring and every live ripple onto `frame`.
    ///
    /// `cursor` and ripple positions are in screen coordinates; `origin` is the
    /// top-left corner of the captured area.
    pub fn render(
        &self,
        frame: &mut RgbImage,
        transform: &FrameTransform,
        origin: (i32, i32),
        cursor: (i32, i32),
        ripples: &[RippleEvent],
        now: Instant,
    ) {
        let to_frame = |x: i32, y: i32| {
            transform.map_point(f64::from(x - origin.0), f64::from(y - origin.1))
        };

        if self.highlight {
            let center = to_frame(cursor.0, cursor.1);
            if is_inside(frame, center) {
                draw_ring(
                    frame,
                    center,
                    self.tuning.highlight_radius,
                    self.tuning.ring_thickness,
                    self.tuning.highlight_color,
                    1.0,
                );
            }
        }

        for ripple in ripples {
            let Some((radius, opacity)) = ripple_style(ripple.age(now), &self.tuning) else {
                continue;
            };
            draw_ring(
                frame,
                to_frame(ripple.x, ripple.y),
                radius,
                self.tuning.ring_thickness,
                self.tuning.ripple_color,
                opacity,
            );
        }
    }
}

/// Radius and opacity of a ripple at `age`, or `None` once it has decayed.
pub fn ripple_style(age: Duration, tuning: &EffectTuning) -> Option<(f64, f32)> {
    if age > tuning.ripple_decay {
        return None;
    }

    let progress = if tuning.ripple_decay.is_zero() {
        1.0
    } else {
        age.as_secs_f64() / tuning.ripple_decay.as_secs_f64()
    };
    let radius = tuning.ripple_start_radius
        + (tuning.ripple_end_radius - tuning.ripple_start_radius) * progress;
    let opacity = (1.0 - progress).clamp(0.0, 1.0) as f32;
    Some((radius, opacity))
}

fn is_inside(frame: &RgbImage, (x, y): (f64, f64)) -> bool {
    x >= 0.0 && y >= 0.0 && x < f64::from(frame.width()) && y < f64::from(frame.height())
}

/// Alpha-blends a ring of the given thickness. Pixels outside the frame are skipped.
pub fn draw_ring(
    frame: &mut RgbImage,
    center: (f64, f64),
    radius: f64,
    thickness: f64,
    color: Rgb<u8>,
    opacity: f32,
) {
    if opacity <= 0.0 || frame.width() == 0 || frame.height() == 0 {
        return;
    }

    let half = thickness / 2.0;
    let reach = radius + half;
    let max_x = f64::from(frame.width() - 1);
    let max_y = f64::from(frame.height() - 1);

    let x0 = (center.0 - reach).floor().clamp(0.0, max_x) as u32;
    let x1 = (center.0 + reach).ceil().clamp(0.0, max_x) as u32;
    let y0 = (center.1 - reach).floor().clamp(0.0, max_y) as u32;
    let y1 = (center.1 + reach).ceil().clamp(0.0, max_y) as u32;

    let alpha = opacity.min(1.0);
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = f64::from(x) - center.0;
            let dy = f64::from(y) - center.1;
            if (dx.hypot(dy) - radius).abs() > half {
                continue;
            }

            let pixel = frame.get_pixel_mut(x, y);
            for channel in 0..3 {
                pixel[channel] = blend(pixel[channel], color[channel], alpha);
            }
        }
    }
}

#[inline]
fn blend(bg: u8, fg: u8, alpha: f32) -> u8 {
    (f32::from(bg) * (1.0 - alpha) + f32::from(fg) * alpha)
        .round()
        .clamp(0.0, 255.0) as u8
}

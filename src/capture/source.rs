use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage, RgbaImage};

use crate::config::CaptureRect;
use crate::error::Result;

/// Produces one screen frame per call. Lives on the capture loop thread.
pub trait FrameSource {
    fn grab(&mut self) -> Result<RgbaImage>;
}

pub trait CaptureBackend: Send + Sync {
    /// Bounds of the primary display, used when no rectangle is configured.
    fn primary_bounds(&self) -> Result<CaptureRect>;

    fn open(&self, rect: CaptureRect) -> Result<Box<dyn FrameSource>>;
}

/// Converts a grabbed RGBA frame to the encoder's RGB layout at the expected size.
pub fn to_encoder_layout(frame: RgbaImage, width: u32, height: u32) -> RgbImage {
    let rgb = DynamicImage::ImageRgba8(frame).into_rgb8();
    if rgb.dimensions() == (width, height) {
        return rgb;
    }
    imageops::resize(&rgb, width, height, FilterType::Triangle)
}

#[cfg(feature = "desktop")]
pub use desktop::XcapCapture;

#[cfg(feature = "desktop")]
mod desktop {
    use image::RgbaImage;
    use image::imageops;
    use tracing::debug;
    use xcap::Monitor;

    use super::{CaptureBackend, FrameSource};
    use crate::config::CaptureRect;
    use crate::error::{RecorderError, Result};

    /// Screen capture through xcap. Grabs the monitor holding the rectangle's
    /// top-left corner and crops to the rectangle.
    pub struct XcapCapture;

    struct XcapSource {
        monitor: Monitor,
        rect: CaptureRect,
        monitor_origin: (i32, i32),
    }

    impl CaptureBackend for XcapCapture {
        fn primary_bounds(&self) -> Result<CaptureRect> {
            let monitors = Monitor::all()
                .map_err(|e| RecorderError::Capture(format!("failed to list monitors: {e}")))?;

            let monitor = monitors
                .iter()
                .find(|m| m.is_primary().unwrap_or(false))
                .or_else(|| monitors.first())
                .ok_or_else(|| RecorderError::Capture("no monitors found".into()))?;

            monitor_rect(monitor)
        }

        fn open(&self, rect: CaptureRect) -> Result<Box<dyn FrameSource>> {
            let monitor = Monitor::from_point(rect.left, rect.top).map_err(|e| {
                RecorderError::Capture(format!("no monitor at {},{}: {e}", rect.left, rect.top))
            })?;
            let bounds = monitor_rect(&monitor)?;
            debug!("capturing {rect} from monitor at {bounds}");

            Ok(Box::new(XcapSource {
                monitor,
                rect,
                monitor_origin: (bounds.left, bounds.top),
            }))
        }
    }

    impl FrameSource for XcapSource {
        fn grab(&mut self) -> Result<RgbaImage> {
            let image = self
                .monitor
                .capture_image()
                .map_err(|e| RecorderError::Capture(format!("failed to grab frame: {e}")))?;

            let (image_width, image_height) = image.dimensions();
            let x = (self.rect.left - self.monitor_origin.0).max(0) as u32;
            let y = (self.rect.top - self.monitor_origin.1).max(0) as u32;
            if x >= image_width || y >= image_height {
                return Err(RecorderError::Capture(
                    "capture rectangle lies outside the monitor".into(),
                ));
            }

            let (width, height) = self.rect.size();
            let width = width.min(image_width - x);
            let height = height.min(image_height - y);
            if (x, y, width, height) == (0, 0, image_width, image_height) {
                return Ok(image);
            }
            Ok(imageops::crop_imm(&image, x, y, width, height).to_image())
        }
    }

    fn monitor_rect(monitor: &Monitor) -> Result<CaptureRect> {
        let read = |e: xcap::XCapError| RecorderError::Capture(format!("monitor query failed: {e}"));
        Ok(CaptureRect::new(
            monitor.x().map_err(read)?,
            monitor.y().map_err(read)?,
            monitor.width().map_err(read)? as i32,
            monitor.height().map_err(read)? as i32,
        ))
    }
}

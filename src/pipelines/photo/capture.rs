// SPDX-License-Identifier: MPL-2.0

//! Frame rendering for still capture
//!
//! Turns a raw camera frame into an RGB pixel surface sized to the stream's
//! native resolution, ready for encoding.

use crate::backends::camera::format_converters::{
    gray8_to_rgb, rgb24_to_rgb, rgba_to_rgb, uyvy_to_rgb, yuyv_to_rgb,
};
use crate::backends::camera::types::{CameraFrame, PixelFormat, Resolution};
use crate::errors::PhotoError;
use image::imageops::FilterType;
use image::{ImageFormat, RgbImage};
use tracing::debug;

/// Render `frame` onto an RGB surface of exactly `native` size
///
/// Frames normally already match the stream resolution; a frame that does not
/// (some drivers round odd sizes) is scaled to fit.
pub fn render_to_surface(frame: &CameraFrame, native: Resolution) -> Result<RgbImage, PhotoError> {
    if frame.width == 0 || frame.height == 0 || native.width == 0 || native.height == 0 {
        return Err(PhotoError::NoRenderableSurface(format!(
            "zero-sized frame {}x{} for {}",
            frame.width, frame.height, native
        )));
    }

    let image = match frame.format {
        PixelFormat::MJPEG => image::load_from_memory_with_format(&frame.data, ImageFormat::Jpeg)
            .map_err(|e| PhotoError::NoRenderableSurface(format!("MJPEG decode failed: {}", e)))?
            .to_rgb8(),
        PixelFormat::RGBA => packed_surface(frame, rgba_to_rgb)?,
        PixelFormat::RGB24 => packed_surface(frame, rgb24_to_rgb)?,
        PixelFormat::Gray8 => packed_surface(frame, gray8_to_rgb)?,
        PixelFormat::YUYV => packed_surface(frame, yuyv_to_rgb)?,
        PixelFormat::UYVY => packed_surface(frame, uyvy_to_rgb)?,
    };

    if image.width() == native.width && image.height() == native.height {
        return Ok(image);
    }

    debug!(
        frame_width = image.width(),
        frame_height = image.height(),
        native = %native,
        "Scaling frame to stream resolution"
    );
    Ok(image::imageops::resize(
        &image,
        native.width,
        native.height,
        FilterType::Triangle,
    ))
}

type Converter = fn(&[u8], u32, u32, u32) -> Option<Vec<u8>>;

/// Convert an uncompressed frame with `convert` and wrap it in an image
fn packed_surface(frame: &CameraFrame, convert: Converter) -> Result<RgbImage, PhotoError> {
    let rgb = convert(&frame.data, frame.width, frame.height, frame.stride).ok_or_else(|| {
        PhotoError::NoRenderableSurface(format!(
            "{:?} frame too short for {}x{} (got {} bytes)",
            frame.format,
            frame.width,
            frame.height,
            frame.data.len()
        ))
    })?;
    RgbImage::from_raw(frame.width, frame.height, rgb)
        .ok_or_else(|| PhotoError::NoRenderableSurface("pixel buffer size mismatch".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_rgba_frame_renders_at_native_size() {
        let frame = CameraFrame::packed(4, 2, PixelFormat::RGBA, Arc::from(vec![200u8; 4 * 2 * 4]));
        let surface = render_to_surface(&frame, Resolution::new(4, 2)).unwrap();
        assert_eq!(surface.dimensions(), (4, 2));
        assert_eq!(surface.get_pixel(0, 0).0, [200, 200, 200]);
    }

    #[test]
    fn test_mismatched_frame_is_scaled() {
        let frame = CameraFrame::packed(8, 4, PixelFormat::Gray8, Arc::from(vec![50u8; 8 * 4]));
        let surface = render_to_surface(&frame, Resolution::new(4, 2)).unwrap();
        assert_eq!(surface.dimensions(), (4, 2));
    }

    #[test]
    fn test_truncated_frame_has_no_surface() {
        let frame = CameraFrame::packed(4, 4, PixelFormat::YUYV, Arc::from(vec![0u8; 6]));
        assert!(matches!(
            render_to_surface(&frame, Resolution::new(4, 4)),
            Err(PhotoError::NoRenderableSurface(_))
        ));
    }

    #[test]
    fn test_corrupt_mjpeg_has_no_surface() {
        let frame = CameraFrame::packed(4, 4, PixelFormat::MJPEG, Arc::from(vec![0xFFu8, 0xD8, 0x00]));
        assert!(matches!(
            render_to_surface(&frame, Resolution::new(4, 4)),
            Err(PhotoError::NoRenderableSurface(_))
        ));
    }
}

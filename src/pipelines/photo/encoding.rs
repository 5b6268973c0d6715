// SPDX-License-Identifier: GPL-3.0-only

//! Still photo encoding
//!
//! Encodes a rendered RGB surface to a compressed photo format at a fixed
//! quality factor.

use crate::constants::{PHOTO_QUALITY, jpeg_quality};
use crate::errors::PhotoError;
use chrono::{DateTime, Local};
use image::RgbImage;
use std::sync::Arc;
use tracing::debug;

/// Supported encoding formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingFormat {
    /// JPEG format (lossy compression)
    Jpeg,
}

impl EncodingFormat {
    /// Get file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            EncodingFormat::Jpeg => "jpg",
        }
    }

    /// MIME type of the encoded bytes
    pub fn mime_type(&self) -> &'static str {
        match self {
            EncodingFormat::Jpeg => "image/jpeg",
        }
    }
}

/// One captured still image
///
/// Handed to the caller and not retained; `image_data` is shared so the caller
/// can pass it on without copying.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureResult {
    pub image_data: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    pub format: EncodingFormat,
    /// Quality factor the image was encoded at (0.0 - 1.0)
    pub quality: f32,
    pub captured_at: DateTime<Local>,
}

impl CaptureResult {
    /// Suggested file name, e.g. `IMG_20260101_120000.jpg`
    pub fn file_name(&self) -> String {
        format!(
            "IMG_{}.{}",
            self.captured_at.format("%Y%m%d_%H%M%S"),
            self.format.extension()
        )
    }
}

/// Photo encoder
#[derive(Debug, Clone, Copy)]
pub struct PhotoEncoder {
    format: EncodingFormat,
    quality: f32,
}

impl PhotoEncoder {
    /// JPEG at the fixed photo quality
    pub fn new() -> Self {
        Self {
            format: EncodingFormat::Jpeg,
            quality: PHOTO_QUALITY,
        }
    }

    pub fn format(&self) -> EncodingFormat {
        self.format
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    /// Encode a rendered surface
    ///
    /// CPU-bound; callers run it on a blocking thread.
    pub fn encode(&self, image: &RgbImage) -> Result<CaptureResult, PhotoError> {
        let data = match self.format {
            EncodingFormat::Jpeg => encode_jpeg(image, jpeg_quality(self.quality))?,
        };

        if data.is_empty() {
            return Err(PhotoError::EmptyEncoding);
        }

        debug!(size = data.len(), format = ?self.format, "Encoding complete");

        Ok(CaptureResult {
            image_data: Arc::from(data),
            width: image.width(),
            height: image.height(),
            format: self.format,
            quality: self.quality,
            captured_at: Local::now(),
        })
    }
}

impl Default for PhotoEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode image as JPEG
fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, PhotoError> {
    let mut buffer = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);

    encoder
        .encode(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| PhotoError::EncodingFailed(format!("JPEG encoding failed: {}", e)))?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_reports_dimensions_and_quality() {
        let image = RgbImage::from_pixel(64, 48, image::Rgb([10, 120, 200]));
        let result = PhotoEncoder::new().encode(&image).unwrap();

        assert_eq!((result.width, result.height), (64, 48));
        assert_eq!(result.quality, 0.8);
        assert_eq!(result.format.mime_type(), "image/jpeg");
        // JPEG SOI marker
        assert_eq!(&result.image_data[..2], &[0xFF, 0xD8]);
        assert!(result.file_name().ends_with(".jpg"));
    }
}

// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use capture_surface::constants::{
    FIRST_FRAME_TIMEOUT, FRAME_POLL_INTERVAL, IDEAL_HEIGHT, IDEAL_WIDTH, PHOTO_QUALITY,
    jpeg_quality,
};

#[test]
fn test_ideal_resolution_is_720p() {
    assert_eq!((IDEAL_WIDTH, IDEAL_HEIGHT), (1280, 720));
}

#[test]
fn test_photo_quality_is_fixed() {
    assert_eq!(PHOTO_QUALITY, 0.8);
    assert_eq!(jpeg_quality(PHOTO_QUALITY), 80);
}

#[test]
fn test_jpeg_quality_scale() {
    // Quality scale is monotonic across the valid range
    let mut prev = 0u8;
    for step in 1..=10 {
        let quality = jpeg_quality(step as f32 / 10.0);
        assert!(quality >= prev, "Quality should grow with the factor");
        prev = quality;
    }
    assert_eq!(prev, 100);
}

#[test]
fn test_frame_polling_fits_timeout() {
    assert!(FRAME_POLL_INTERVAL < FIRST_FRAME_TIMEOUT);
}

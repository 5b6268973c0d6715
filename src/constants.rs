// SPDX-License-Identifier: GPL-3.0-only

//! Capture-wide constants

use std::time::Duration;

/// Ideal stream width requested from the camera
pub const IDEAL_WIDTH: u32 = 1280;

/// Ideal stream height requested from the camera
pub const IDEAL_HEIGHT: u32 = 720;

/// Compression quality factor for still photos (0.0 - 1.0)
pub const PHOTO_QUALITY: f32 = 0.8;

/// Number of mmap buffers queued on a V4L2 stream
pub const STREAM_BUFFER_COUNT: u32 = 4;

/// How long a freshly opened stream may take to deliver its first frame
pub const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(2);

/// Poll interval while waiting for the first frame
pub const FRAME_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Pause before retrying after a failed V4L2 dequeue
pub const DEQUEUE_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Default sysfs directory scanned for flash LEDs
pub const LEDS_DIR: &str = "/sys/class/leds";

/// Default directory scanned for V4L2 device nodes
pub const DEVICE_DIR: &str = "/dev";

/// Marker file present inside a Flatpak sandbox
pub const FLATPAK_INFO_PATH: &str = "/.flatpak-info";

/// Name used for config and photo directories
pub const APP_DIR_NAME: &str = "capture-surface";

/// Convert a 0.0 - 1.0 quality factor to the 1 - 100 JPEG scale
pub fn jpeg_quality(factor: f32) -> u8 {
    (factor.clamp(0.01, 1.0) * 100.0).round() as u8
}

// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::OwnedSemaphorePermit;
use tracing::warn;
use uuid::Uuid;

/// Camera backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CameraBackendType {
    /// Video4Linux2 device nodes
    #[default]
    V4l2,
    /// Synthetic test-pattern cameras
    Virtual,
}

impl std::fmt::Display for CameraBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraBackendType::V4l2 => write!(f, "V4L2"),
            CameraBackendType::Virtual => write!(f, "virtual"),
        }
    }
}

/// Which way the camera points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Rear camera, pointing away from the user
    #[default]
    Environment,
    /// Front camera, pointing at the user
    User,
}

impl FacingMode {
    /// The opposite facing mode
    pub fn toggled(self) -> Self {
        match self {
            FacingMode::Environment => FacingMode::User,
            FacingMode::User => FacingMode::Environment,
        }
    }
}

impl std::fmt::Display for FacingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FacingMode::Environment => write!(f, "environment"),
            FacingMode::User => write!(f, "user"),
        }
    }
}

impl std::str::FromStr for FacingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "environment" | "back" | "rear" => Ok(FacingMode::Environment),
            "user" | "front" | "selfie" => Ok(FacingMode::User),
            other => Err(format!("unknown facing mode: {}", other)),
        }
    }
}

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(crate::constants::IDEAL_WIDTH, crate::constants::IDEAL_HEIGHT)
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Represents a camera device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    pub name: String,
    pub path: String,           // Device node or virtual identifier
    pub facing: FacingMode,     // From config override or card name heuristics
    pub driver: Option<String>, // V4L2 driver name, if known
}

/// Pixel layout of a camera frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// RGBA - 32-bit with alpha (4 bytes per pixel)
    RGBA,
    /// RGB24 - 24-bit RGB (3 bytes per pixel, no alpha)
    RGB24,
    /// Gray8 - 8-bit grayscale (single channel)
    Gray8,
    /// YUYV - Packed 4:2:2 (Y0 U Y1 V interleaved)
    YUYV,
    /// UYVY - Packed 4:2:2 (U Y0 V Y1 interleaved)
    UYVY,
    /// Motion JPEG - each frame is a complete JPEG
    MJPEG,
}

impl PixelFormat {
    /// Bytes per pixel for packed formats, None for compressed ones
    pub fn bytes_per_pixel(&self) -> Option<u32> {
        match self {
            Self::RGBA => Some(4),
            Self::RGB24 => Some(3),
            Self::Gray8 => Some(1),
            Self::YUYV | Self::UYVY => Some(2),
            Self::MJPEG => None,
        }
    }

    /// Map a V4L2 FourCC code to a pixel format
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"YUYV" => Some(Self::YUYV),
            b"UYVY" => Some(Self::UYVY),
            b"MJPG" | b"JPEG" => Some(Self::MJPEG),
            b"GREY" => Some(Self::Gray8),
            b"RGB3" => Some(Self::RGB24),
            b"AB24" => Some(Self::RGBA),
            _ => None,
        }
    }
}

/// A single frame from the camera
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    /// Pixel data in `format` layout
    pub data: Arc<[u8]>,
    /// Pixel format of the data
    pub format: PixelFormat,
    /// Row stride for the data (bytes per row, may include padding)
    pub stride: u32,
    /// Timestamp when frame was captured
    pub captured_at: Instant,
}

impl CameraFrame {
    /// Build a tightly packed frame (stride derived from the format)
    pub fn packed(width: u32, height: u32, format: PixelFormat, data: Arc<[u8]>) -> Self {
        let stride = format.bytes_per_pixel().map(|bpp| width * bpp).unwrap_or(0);
        Self {
            width,
            height,
            data,
            format,
            stride,
            captured_at: Instant::now(),
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// Live binding to camera hardware
///
/// Owned exclusively by whoever currently drives the stream; it is not `Clone`.
/// The liveness flag is shared with the backend worker feeding frames, so
/// dropping a live handle stops that worker even when `release` was skipped.
pub struct StreamHandle {
    id: Uuid,
    device: CameraDevice,
    facing: FacingMode,
    resolution: Resolution,
    live: Arc<AtomicBool>,
    slot: Option<OwnedSemaphorePermit>,
}

impl StreamHandle {
    /// Create a live handle for a freshly opened stream
    pub fn new(device: CameraDevice, facing: FacingMode, resolution: Resolution) -> Self {
        Self::with_liveness(device, facing, resolution, Arc::new(AtomicBool::new(true)))
    }

    /// Create a handle around a liveness flag the backend worker already watches
    pub fn with_liveness(
        device: CameraDevice,
        facing: FacingMode,
        resolution: Resolution,
        live: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            device,
            facing,
            resolution,
            live,
            slot: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn device(&self) -> &CameraDevice {
        &self.device
    }

    pub fn facing_mode(&self) -> FacingMode {
        self.facing
    }

    /// Native resolution negotiated with the hardware
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Flag shared with the backend worker; cleared when the stream stops
    pub fn liveness(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.live)
    }

    /// Mark stopped. Returns whether the handle was still live.
    pub(crate) fn stop(&self) -> bool {
        self.live.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn attach_slot(&mut self, permit: OwnedSemaphorePermit) {
        self.slot = Some(permit);
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        if self.live.swap(false, Ordering::SeqCst) {
            warn!(stream = %self.id, device = %self.device.path, "Stream handle dropped while live");
        }
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("id", &self.id)
            .field("device", &self.device.path)
            .field("facing", &self.facing)
            .field("resolution", &self.resolution)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// OS refused access to the device node
    PermissionDenied(String),
    /// Camera device not found
    DeviceNotFound(String),
    /// Device held by another process
    DeviceBusy(String),
    /// Stream has no frame to hand out
    FrameUnavailable(String),
    /// Other errors
    Unknown(String),
}

impl BackendError {
    /// Classify an I/O error raised while opening or configuring a device
    pub fn from_io(context: &str, err: &std::io::Error) -> Self {
        let msg = format!("{}: {}", context, err);
        match err.raw_os_error() {
            Some(libc::EBUSY) => BackendError::DeviceBusy(msg),
            Some(libc::EACCES) | Some(libc::EPERM) => BackendError::PermissionDenied(msg),
            Some(libc::ENOENT) | Some(libc::ENODEV) | Some(libc::ENXIO) => {
                BackendError::DeviceNotFound(msg)
            }
            _ => match err.kind() {
                std::io::ErrorKind::PermissionDenied => BackendError::PermissionDenied(msg),
                std::io::ErrorKind::NotFound => BackendError::DeviceNotFound(msg),
                _ => BackendError::Unknown(msg),
            },
        }
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::DeviceBusy(msg) => write!(f, "Device busy: {}", msg),
            BackendError::FrameUnavailable(msg) => write!(f, "Frame unavailable: {}", msg),
            BackendError::Unknown(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

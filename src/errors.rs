// SPDX-License-Identifier: MPL-2.0

//! Error types for the capture surface
//!
//! Backend layers report [`BackendError`](crate::backends::camera::BackendError) and
//! [`PermissionError`](crate::backends::permission::PermissionError); both fold into
//! [`SurfaceError`], which is what the UI collaborator sees.

use crate::backends::camera::BackendError;
use crate::backends::permission::PermissionError;
use std::fmt;

/// Result type alias using SurfaceError
pub type SurfaceResult<T> = Result<T, SurfaceError>;

/// Error surfaced by the capture surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    /// User declined camera access; a later open may ask again
    PermissionDenied,
    /// Platform will not prompt again until the user changes settings
    PermissionBlocked,
    /// Platform could not show a consent prompt
    PermissionRequest(String),
    /// No camera hardware available
    DeviceNotFound(String),
    /// Camera is held by another consumer
    DeviceBusy(String),
    /// Unclassified device failure
    Device(String),
    /// Still capture failed
    Capture(PhotoError),
    /// Optional capability (torch) is absent
    CapabilityUnsupported,
    /// Configuration errors
    Config(String),
}

/// Photo capture errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoError {
    /// A capture is already in flight
    Busy,
    /// Stream delivered no frame
    NoFrameAvailable(String),
    /// Frame could not be rendered onto a pixel surface
    NoRenderableSurface(String),
    /// Encoding failed
    EncodingFailed(String),
    /// Encoder produced no bytes
    EmptyEncoding,
}

/// Coarse category used for picking UI treatment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    PermissionDenied,
    PermissionBlocked,
    DeviceNotFound,
    DeviceBusy,
    CaptureFailure,
    CapabilityUnsupported,
    Other,
}

impl SurfaceError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            SurfaceError::PermissionDenied => ErrorKind::PermissionDenied,
            SurfaceError::PermissionBlocked => ErrorKind::PermissionBlocked,
            SurfaceError::DeviceNotFound(_) => ErrorKind::DeviceNotFound,
            SurfaceError::DeviceBusy(_) => ErrorKind::DeviceBusy,
            SurfaceError::Capture(_) => ErrorKind::CaptureFailure,
            SurfaceError::CapabilityUnsupported => ErrorKind::CapabilityUnsupported,
            SurfaceError::PermissionRequest(_)
            | SurfaceError::Device(_)
            | SurfaceError::Config(_) => ErrorKind::Other,
        }
    }

    /// User-facing instruction for getting out of this error
    pub fn remediation(&self) -> &'static str {
        match self {
            SurfaceError::PermissionDenied => {
                "Camera access was declined. Open the camera again to be asked once more."
            }
            SurfaceError::PermissionBlocked => {
                "Camera access is blocked. Allow camera access in your system privacy \
                 settings, then reload the application."
            }
            SurfaceError::PermissionRequest(_) => {
                "The system could not show a camera permission prompt. \
                 Check that the desktop portal service is running."
            }
            SurfaceError::DeviceNotFound(_) => "No camera was found on this device.",
            SurfaceError::DeviceBusy(_) => {
                "The camera is in use by another application. Close it and try again."
            }
            SurfaceError::Device(_) => "The camera failed to start. Try again.",
            SurfaceError::Capture(_) => "The photo could not be taken. Try again.",
            SurfaceError::CapabilityUnsupported => "This camera has no flash.",
            SurfaceError::Config(_) => "The configuration file could not be used.",
        }
    }

    /// Whether offering a retry affordance makes sense
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SurfaceError::PermissionDenied
                | SurfaceError::DeviceBusy(_)
                | SurfaceError::Device(_)
                | SurfaceError::Capture(_)
        )
    }
}

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceError::PermissionDenied => write!(f, "Camera permission denied"),
            SurfaceError::PermissionBlocked => write!(f, "Camera permission blocked"),
            SurfaceError::PermissionRequest(msg) => {
                write!(f, "Permission request failed: {}", msg)
            }
            SurfaceError::DeviceNotFound(msg) => write!(f, "Camera not found: {}", msg),
            SurfaceError::DeviceBusy(msg) => write!(f, "Camera is busy: {}", msg),
            SurfaceError::Device(msg) => write!(f, "Camera error: {}", msg),
            SurfaceError::Capture(e) => write!(f, "Capture failed: {}", e),
            SurfaceError::CapabilityUnsupported => write!(f, "Capability not supported"),
            SurfaceError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl fmt::Display for PhotoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhotoError::Busy => write!(f, "Capture already in progress"),
            PhotoError::NoFrameAvailable(msg) => write!(f, "No frame available: {}", msg),
            PhotoError::NoRenderableSurface(msg) => {
                write!(f, "No renderable surface: {}", msg)
            }
            PhotoError::EncodingFailed(msg) => write!(f, "Encoding failed: {}", msg),
            PhotoError::EmptyEncoding => write!(f, "Encoder produced no data"),
        }
    }
}

impl std::error::Error for SurfaceError {}
impl std::error::Error for PhotoError {}

impl From<PhotoError> for SurfaceError {
    fn from(err: PhotoError) -> Self {
        SurfaceError::Capture(err)
    }
}

impl From<BackendError> for SurfaceError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::PermissionDenied(_) => SurfaceError::PermissionDenied,
            BackendError::DeviceNotFound(msg) => SurfaceError::DeviceNotFound(msg),
            BackendError::DeviceBusy(msg) => SurfaceError::DeviceBusy(msg),
            BackendError::FrameUnavailable(msg) => {
                SurfaceError::Capture(PhotoError::NoFrameAvailable(msg))
            }
            BackendError::Unknown(msg) => SurfaceError::Device(msg),
        }
    }
}

impl From<PermissionError> for SurfaceError {
    fn from(err: PermissionError) -> Self {
        match err {
            PermissionError::RequestError(msg) => SurfaceError::PermissionRequest(msg),
        }
    }
}

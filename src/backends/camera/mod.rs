// SPDX-License-Identifier: MPL-2.0

//! Camera backend abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │ CaptureSurfaceController │
//! └────────────┬─────────────┘
//!              │
//!              ▼
//! ┌──────────────────────────┐
//! │      StreamManager       │  ← Single stream slot, acquire/release
//! └────────────┬─────────────┘
//!              │
//!              ▼
//! ┌──────────────────────────┐
//! │   CameraSource trait     │  ← Common interface
//! └────────────┬─────────────┘
//!              │
//!         ┌────┴─────┐
//!         ▼          ▼
//!     ┌──────┐  ┌─────────┐
//!     │ V4L2 │  │ Virtual │
//!     └──────┘  └─────────┘
//! ```

pub mod format_converters;
pub mod manager;
pub mod types;
pub mod v4l2;
pub mod virtual_source;

pub use manager::{SlotReservation, StreamManager};
pub use types::*;

use crate::config::Config;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Source of camera streams
///
/// Implementations open hardware (or synthetic) streams, hand out the most
/// recent frame of an open stream, and stop streams again. Stopping must be
/// idempotent: closing a stream that is already gone is a no-op.
pub trait CameraSource: Send + Sync {
    /// Get the backend type identifier
    fn backend_type(&self) -> CameraBackendType;

    /// Enumerate available cameras on this backend
    fn enumerate_cameras(&self) -> Vec<CameraDevice>;

    /// Open a stream for the camera facing `facing`, asking for `resolution`
    ///
    /// The returned handle reports the resolution the device actually agreed to.
    fn open_stream(
        &self,
        facing: FacingMode,
        resolution: Resolution,
    ) -> BoxFuture<'_, BackendResult<StreamHandle>>;

    /// Most recent frame of an open stream
    fn read_frame<'a>(&'a self, handle: &'a StreamHandle)
    -> BoxFuture<'a, BackendResult<CameraFrame>>;

    /// Stop the stream and release the device
    fn close_stream<'a>(&'a self, handle: &'a StreamHandle) -> BoxFuture<'a, ()>;
}

/// Pick the camera for a facing mode
///
/// Facing is a preference, not a hard constraint: when no camera matches, the
/// first camera is used so single-camera machines still work.
pub fn select_device(cameras: &[CameraDevice], facing: FacingMode) -> Option<&CameraDevice> {
    cameras
        .iter()
        .find(|camera| camera.facing == facing)
        .or_else(|| cameras.first())
}

/// Build the camera source selected in the configuration
pub fn source_for(config: &Config) -> Arc<dyn CameraSource> {
    match config.backend {
        CameraBackendType::V4l2 => Arc::new(v4l2::V4l2Source::new(
            config.device_dir.clone(),
            config.facing_overrides.clone(),
        )),
        CameraBackendType::Virtual => Arc::new(virtual_source::VirtualSource::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(path: &str, facing: FacingMode) -> CameraDevice {
        CameraDevice {
            name: path.to_string(),
            path: path.to_string(),
            facing,
            driver: None,
        }
    }

    #[test]
    fn test_select_device_prefers_matching_facing() {
        let cameras = vec![
            camera("/dev/video0", FacingMode::User),
            camera("/dev/video2", FacingMode::Environment),
        ];
        let selected = select_device(&cameras, FacingMode::Environment).unwrap();
        assert_eq!(selected.path, "/dev/video2");
    }

    #[test]
    fn test_select_device_falls_back_to_first() {
        let cameras = vec![camera("/dev/video0", FacingMode::User)];
        let selected = select_device(&cameras, FacingMode::Environment).unwrap();
        assert_eq!(selected.path, "/dev/video0");
        assert!(select_device(&[], FacingMode::User).is_none());
    }
}

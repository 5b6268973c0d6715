// SPDX-License-Identifier: MPL-2.0

//! Single-shot still capture
//!
//! ```text
//! StreamHandle → read frame → render surface → encode → CaptureResult
//! ```
//!
//! The engine allows one capture at a time. A second request while one is in
//! flight is rejected with [`PhotoError::Busy`]; it is never queued and never
//! cancels the running one. The engine is back to idle when `capture` returns,
//! whatever the outcome, and also when the capture future is dropped midway.

pub mod capture;
pub mod encoding;

pub use capture::render_to_surface;
pub use encoding::{CaptureResult, EncodingFormat, PhotoEncoder};

use crate::backends::camera::{StreamHandle, StreamManager};
use crate::errors::PhotoError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Capture engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Capturing,
}

/// Still capture engine
#[derive(Debug, Default)]
pub struct CaptureEngine {
    encoder: PhotoEncoder,
    busy: AtomicBool,
    encodes: AtomicU64,
}

/// Holds the engine in `Capturing` until dropped
struct CaptureGuard<'a> {
    busy: &'a AtomicBool,
}

impl Drop for CaptureGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

impl CaptureEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> EngineState {
        if self.busy.load(Ordering::SeqCst) {
            EngineState::Capturing
        } else {
            EngineState::Idle
        }
    }

    /// Number of encodes started so far
    pub fn encode_count(&self) -> u64 {
        self.encodes.load(Ordering::SeqCst)
    }

    pub fn encoder(&self) -> PhotoEncoder {
        self.encoder
    }

    fn begin(&self) -> Result<CaptureGuard<'_>, PhotoError> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| PhotoError::Busy)?;
        Ok(CaptureGuard { busy: &self.busy })
    }

    /// Capture one still image from `handle`
    ///
    /// Reads the current frame, renders it at the handle's native resolution
    /// and encodes it at the fixed photo quality.
    pub async fn capture(
        &self,
        streams: &StreamManager,
        handle: &StreamHandle,
    ) -> Result<CaptureResult, PhotoError> {
        let _guard = self.begin()?;
        let native = handle.resolution();

        info!(stream = %handle.id(), resolution = %native, "Capturing still image");

        let frame = streams
            .read_frame(handle)
            .await
            .map_err(|e| PhotoError::NoFrameAvailable(e.to_string()))?;

        debug!(
            width = frame.width,
            height = frame.height,
            format = ?frame.format,
            "Frame read for capture"
        );

        self.encodes.fetch_add(1, Ordering::SeqCst);
        let encoder = self.encoder;
        let result = tokio::task::spawn_blocking(move || {
            let surface = render_to_surface(&frame, native)?;
            encoder.encode(&surface)
        })
        .await
        .map_err(|e| PhotoError::EncodingFailed(format!("encoding task failed: {}", e)))?;

        match &result {
            Ok(captured) => info!(
                width = captured.width,
                height = captured.height,
                size = captured.image_data.len(),
                "Still image captured"
            ),
            Err(e) => warn!(error = %e, "Still capture failed"),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::virtual_source::VirtualSource;
    use crate::backends::camera::{FacingMode, Resolution};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_capture_at_native_resolution() {
        let manager = StreamManager::new(Arc::new(VirtualSource::new()), Resolution::new(320, 240));
        let engine = CaptureEngine::new();

        let handle = manager.acquire(FacingMode::Environment).await.unwrap();
        let result = engine.capture(&manager, &handle).await.unwrap();
        assert_eq!((result.width, result.height), (320, 240));
        assert_eq!(result.quality, 0.8);
        assert_eq!(engine.state(), EngineState::Idle);
        assert_eq!(engine.encode_count(), 1);

        manager.release(handle).await;
    }

    #[tokio::test]
    async fn test_failed_capture_returns_to_idle() {
        let manager = StreamManager::new(Arc::new(VirtualSource::new()), Resolution::new(64, 48));
        let engine = CaptureEngine::new();

        let handle = manager.acquire(FacingMode::User).await.unwrap();
        handle.stop();
        assert!(matches!(
            engine.capture(&manager, &handle).await,
            Err(PhotoError::NoFrameAvailable(_))
        ));
        assert_eq!(engine.state(), EngineState::Idle);

        manager.release(handle).await;
    }

    #[test]
    fn test_second_begin_is_rejected() {
        let engine = CaptureEngine::new();
        let guard = engine.begin().unwrap();
        assert_eq!(engine.state(), EngineState::Capturing);
        assert!(matches!(engine.begin(), Err(PhotoError::Busy)));
        drop(guard);
        assert_eq!(engine.state(), EngineState::Idle);
    }
}

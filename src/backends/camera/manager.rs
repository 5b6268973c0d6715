// SPDX-License-Identifier: GPL-3.0-only

//! Camera stream lifecycle manager
//!
//! The manager provides:
//! - Acquisition of a stream for a facing mode at the ideal resolution
//! - Idempotent release
//! - A single stream slot, so a second stream can never be opened while
//!   another one is still open or being opened

use super::CameraSource;
use super::types::*;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

/// Claim on the single stream slot, taken before a stream is opened
#[derive(Debug)]
pub struct SlotReservation {
    permit: OwnedSemaphorePermit,
}

/// Camera stream manager
///
/// Owns the camera source and the single stream slot. Handles returned by
/// [`acquire`](Self::acquire) carry the slot permit, so the slot frees up when
/// the handle goes away after [`release`](Self::release).
pub struct StreamManager {
    source: Arc<dyn CameraSource>,
    resolution: Resolution,
    slot: Arc<Semaphore>,
}

impl StreamManager {
    /// Create a new stream manager
    ///
    /// # Arguments
    /// * `source` - Camera source to open streams on
    /// * `resolution` - Ideal resolution requested for every stream
    pub fn new(source: Arc<dyn CameraSource>, resolution: Resolution) -> Self {
        info!(backend = %source.backend_type(), %resolution, "Creating stream manager");

        Self {
            source,
            resolution,
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    /// Get the backend type
    pub fn backend_type(&self) -> CameraBackendType {
        self.source.backend_type()
    }

    /// Ideal resolution requested from the hardware
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Enumerate available cameras
    pub fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        self.source.enumerate_cameras()
    }

    /// Distinct facing modes offered by the available cameras
    pub fn available_facings(&self) -> Vec<FacingMode> {
        let mut facings: Vec<FacingMode> = Vec::new();
        for camera in self.source.enumerate_cameras() {
            if !facings.contains(&camera.facing) {
                facings.push(camera.facing);
            }
        }
        facings
    }

    /// Acquire a stream for `facing`
    ///
    /// Waits until no other stream is open or being opened, then opens one.
    /// On failure nothing stays allocated.
    pub async fn acquire(&self, facing: FacingMode) -> BackendResult<StreamHandle> {
        let slot = self.reserve().await?;
        self.open_reserved(slot, facing).await
    }

    /// Wait for the stream slot and hold it without opening anything
    ///
    /// Lets a caller decide whether to open at all once the previous stream is
    /// gone. Dropping the reservation frees the slot.
    pub async fn reserve(&self) -> BackendResult<SlotReservation> {
        Arc::clone(&self.slot)
            .acquire_owned()
            .await
            .map(|permit| SlotReservation { permit })
            .map_err(|_| BackendError::Unknown("stream slot closed".to_string()))
    }

    /// Open a stream for `facing` in a reserved slot
    pub async fn open_reserved(
        &self,
        slot: SlotReservation,
        facing: FacingMode,
    ) -> BackendResult<StreamHandle> {
        info!(facing = %facing, resolution = %self.resolution, "Acquiring camera stream");

        match self.source.open_stream(facing, self.resolution).await {
            Ok(mut handle) => {
                handle.attach_slot(slot.permit);
                info!(
                    stream = %handle.id(),
                    device = %handle.device().name,
                    resolution = %handle.resolution(),
                    "Camera stream acquired"
                );
                Ok(handle)
            }
            Err(e) => {
                warn!(facing = %facing, error = %e, "Camera stream acquisition failed");
                Err(e)
            }
        }
    }

    /// Release a stream
    ///
    /// Safe for handles whose stream already stopped on its own; the hardware
    /// side is then a no-op. The stream slot frees once this returns.
    pub async fn release(&self, handle: StreamHandle) {
        if handle.stop() {
            info!(stream = %handle.id(), "Releasing camera stream");
        } else {
            debug!(stream = %handle.id(), "Stream already stopped");
        }

        self.source.close_stream(&handle).await;
        drop(handle);
    }

    /// Most recent frame of an open stream
    pub async fn read_frame(&self, handle: &StreamHandle) -> BackendResult<CameraFrame> {
        if !handle.is_live() {
            return Err(BackendError::FrameUnavailable(
                "stream is no longer live".to_string(),
            ));
        }
        self.source.read_frame(handle).await
    }

    /// Resolve once no stream is open or pending
    pub async fn wait_idle(&self) {
        if let Ok(permit) = self.slot.acquire().await {
            drop(permit);
        }
    }

    /// Number of streams currently open or being opened (0 or 1)
    pub fn open_streams(&self) -> usize {
        1 - self.slot.available_permits().min(1)
    }
}

impl std::fmt::Debug for StreamManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamManager")
            .field("backend_type", &self.source.backend_type())
            .field("resolution", &self.resolution)
            .field("open_streams", &self.open_streams())
            .finish()
    }
}

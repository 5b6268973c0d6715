// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic camera source
//!
//! Offers an environment-facing and a user-facing camera that render a moving
//! test pattern at whatever resolution is requested. Useful on machines without
//! camera hardware and for exercising the capture surface end to end.

use super::CameraSource;
use super::types::*;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};
use uuid::Uuid;

struct VirtualStream {
    resolution: Resolution,
    facing: FacingMode,
    sequence: u64,
}

/// Synthetic camera source
pub struct VirtualSource {
    cameras: Vec<CameraDevice>,
    streams: Mutex<HashMap<Uuid, VirtualStream>>,
    acquisitions: AtomicUsize,
    releases: AtomicUsize,
}

impl VirtualSource {
    /// Source with one camera per facing mode
    pub fn new() -> Self {
        Self::with_cameras(vec![
            CameraDevice {
                name: "Virtual Rear Camera".to_string(),
                path: "virtual:environment".to_string(),
                facing: FacingMode::Environment,
                driver: Some("virtual".to_string()),
            },
            CameraDevice {
                name: "Virtual Front Camera".to_string(),
                path: "virtual:user".to_string(),
                facing: FacingMode::User,
                driver: Some("virtual".to_string()),
            },
        ])
    }

    /// Source with a custom camera list
    pub fn with_cameras(cameras: Vec<CameraDevice>) -> Self {
        Self {
            cameras,
            streams: Mutex::new(HashMap::new()),
            acquisitions: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        }
    }

    /// Streams opened so far
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Streams closed so far
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Streams currently open
    pub fn open_stream_count(&self) -> usize {
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for VirtualSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraSource for VirtualSource {
    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::Virtual
    }

    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        self.cameras.clone()
    }

    fn open_stream(
        &self,
        facing: FacingMode,
        resolution: Resolution,
    ) -> BoxFuture<'_, BackendResult<StreamHandle>> {
        async move {
            let device = super::select_device(&self.cameras, facing)
                .cloned()
                .ok_or_else(|| BackendError::DeviceNotFound("no virtual cameras".to_string()))?;

            let handle = StreamHandle::new(device, facing, resolution);
            self.streams
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(
                    handle.id(),
                    VirtualStream {
                        resolution,
                        facing,
                        sequence: 0,
                    },
                );
            self.acquisitions.fetch_add(1, Ordering::SeqCst);

            info!(stream = %handle.id(), %facing, %resolution, "Virtual stream opened");
            Ok(handle)
        }
        .boxed()
    }

    fn read_frame<'a>(
        &'a self,
        handle: &'a StreamHandle,
    ) -> BoxFuture<'a, BackendResult<CameraFrame>> {
        async move {
            let (resolution, facing, sequence) = {
                let mut streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
                let stream = streams.get_mut(&handle.id()).ok_or_else(|| {
                    BackendError::FrameUnavailable("virtual stream is closed".to_string())
                })?;
                stream.sequence += 1;
                (stream.resolution, stream.facing, stream.sequence)
            };

            let data = render_test_pattern(resolution, facing, sequence);
            Ok(CameraFrame::packed(
                resolution.width,
                resolution.height,
                PixelFormat::RGBA,
                Arc::from(data),
            ))
        }
        .boxed()
    }

    fn close_stream<'a>(&'a self, handle: &'a StreamHandle) -> BoxFuture<'a, ()> {
        async move {
            let removed = self
                .streams
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&handle.id());

            if removed.is_some() {
                self.releases.fetch_add(1, Ordering::SeqCst);
                info!(stream = %handle.id(), "Virtual stream closed");
            } else {
                debug!(stream = %handle.id(), "Virtual stream already closed");
            }
        }
        .boxed()
    }
}

/// Diagonal gradient that drifts with the frame sequence
///
/// The user-facing camera gets a blue tint so the two cameras are easy to tell apart.
fn render_test_pattern(resolution: Resolution, facing: FacingMode, sequence: u64) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(resolution.pixel_count() * 4);
    let shift = (sequence % 256) as u32;
    let blue = match facing {
        FacingMode::Environment => 64,
        FacingMode::User => 192,
    };

    for y in 0..resolution.height {
        for x in 0..resolution.width {
            rgba.push(((x + shift) % 256) as u8);
            rgba.push(((y + shift) % 256) as u8);
            rgba.push(blue);
            rgba.push(255);
        }
    }

    rgba
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_match_requested_resolution() {
        let source = VirtualSource::new();
        let handle = source
            .open_stream(FacingMode::User, Resolution::new(320, 240))
            .await
            .unwrap();

        let frame = source.read_frame(&handle).await.unwrap();
        assert_eq!(frame.width, 320);
        assert_eq!(frame.height, 240);
        assert_eq!(frame.data.len(), 320 * 240 * 4);
        assert_eq!(handle.device().facing, FacingMode::User);

        source.close_stream(&handle).await;
        source.close_stream(&handle).await;
        assert_eq!(source.releases(), 1);
    }

    #[tokio::test]
    async fn test_no_cameras_is_device_not_found() {
        let source = VirtualSource::with_cameras(Vec::new());
        let result = source
            .open_stream(FacingMode::Environment, Resolution::default())
            .await;
        assert!(matches!(result, Err(BackendError::DeviceNotFound(_))));
    }
}

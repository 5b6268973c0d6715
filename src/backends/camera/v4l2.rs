// SPDX-License-Identifier: GPL-3.0-only

//! Direct V4L2 camera capture
//!
//! Each open stream owns a capture thread that dequeues mmap buffers and keeps
//! only the most recent frame. The thread watches the handle's liveness flag
//! and exits once it is cleared, which releases the device node.

use super::CameraSource;
use super::types::*;
use crate::constants::{
    DEQUEUE_RETRY_DELAY, FIRST_FRAME_TIMEOUT, FRAME_POLL_INTERVAL, STREAM_BUFFER_COUNT,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

type LatestFrame = Arc<Mutex<Option<CameraFrame>>>;

/// Negotiated stream geometry reported by the capture thread once streaming
struct StreamReady {
    resolution: Resolution,
    format: PixelFormat,
}

struct V4l2Stream {
    latest: LatestFrame,
    running: Arc<AtomicBool>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

/// Camera source backed by `/dev/video*` nodes
pub struct V4l2Source {
    device_dir: PathBuf,
    facing_overrides: HashMap<String, FacingMode>,
    streams: Mutex<HashMap<Uuid, V4l2Stream>>,
}

impl V4l2Source {
    /// Create a source scanning `device_dir` for video nodes
    ///
    /// # Arguments
    /// * `device_dir` - Directory holding the device nodes (normally `/dev`)
    /// * `facing_overrides` - Facing mode per device path, taking precedence over name heuristics
    pub fn new(device_dir: PathBuf, facing_overrides: HashMap<String, FacingMode>) -> Self {
        Self {
            device_dir,
            facing_overrides,
            streams: Mutex::new(HashMap::new()),
        }
    }

    fn facing_for(&self, path: &str, card: &str) -> FacingMode {
        self.facing_overrides
            .get(path)
            .copied()
            .unwrap_or_else(|| guess_facing(card))
    }
}

impl CameraSource for V4l2Source {
    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::V4l2
    }

    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        let mut cameras = Vec::new();

        for path in video_nodes(&self.device_dir) {
            let path_str = path.to_string_lossy().to_string();
            let dev = match Device::with_path(&path) {
                Ok(dev) => dev,
                Err(e) => {
                    debug!(path = %path_str, error = %e, "Skipping unopenable video node");
                    continue;
                }
            };

            let caps = match dev.query_caps() {
                Ok(caps) => caps,
                Err(e) => {
                    debug!(path = %path_str, error = %e, "Skipping video node without caps");
                    continue;
                }
            };

            // uvcvideo exposes a metadata node next to each capture node
            if !caps
                .capabilities
                .contains(v4l::capability::Flags::VIDEO_CAPTURE)
            {
                continue;
            }

            let facing = self.facing_for(&path_str, &caps.card);
            debug!(path = %path_str, card = %caps.card, %facing, "Found capture device");

            cameras.push(CameraDevice {
                name: caps.card.clone(),
                path: path_str,
                facing,
                driver: Some(caps.driver.clone()),
            });
        }

        cameras
    }

    fn open_stream(
        &self,
        facing: FacingMode,
        resolution: Resolution,
    ) -> BoxFuture<'_, BackendResult<StreamHandle>> {
        async move {
            let cameras = self.enumerate_cameras();
            let device = super::select_device(&cameras, facing)
                .cloned()
                .ok_or_else(|| {
                    BackendError::DeviceNotFound(format!(
                        "no capture devices in {}",
                        self.device_dir.display()
                    ))
                })?;

            info!(
                device_path = %device.path,
                width = resolution.width,
                height = resolution.height,
                "Creating V4L2 capture stream"
            );

            let running = Arc::new(AtomicBool::new(true));
            let latest: LatestFrame = Arc::new(Mutex::new(None));
            let (ready_tx, ready_rx) = oneshot::channel();

            let device_path = device.path.clone();
            let running_clone = Arc::clone(&running);
            let latest_clone = Arc::clone(&latest);
            let thread_handle = std::thread::spawn(move || {
                capture_loop(
                    &device_path,
                    resolution,
                    running_clone,
                    latest_clone,
                    ready_tx,
                );
            });

            let ready = match ready_rx.await {
                Ok(Ok(ready)) => ready,
                Ok(Err(e)) => {
                    running.store(false, Ordering::SeqCst);
                    join_capture_thread(thread_handle).await;
                    return Err(e);
                }
                Err(_) => {
                    running.store(false, Ordering::SeqCst);
                    join_capture_thread(thread_handle).await;
                    return Err(BackendError::Unknown(
                        "capture thread exited before streaming".to_string(),
                    ));
                }
            };

            if ready.resolution != resolution {
                info!(
                    requested = %resolution,
                    negotiated = %ready.resolution,
                    "Device picked a different resolution"
                );
            }
            debug!(format = ?ready.format, "V4L2 stream format");

            let handle =
                StreamHandle::with_liveness(device, facing, ready.resolution, Arc::clone(&running));

            self.streams
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(
                    handle.id(),
                    V4l2Stream {
                        latest,
                        running,
                        thread_handle: Some(thread_handle),
                    },
                );

            Ok(handle)
        }
        .boxed()
    }

    fn read_frame<'a>(
        &'a self,
        handle: &'a StreamHandle,
    ) -> BoxFuture<'a, BackendResult<CameraFrame>> {
        async move {
            let latest = self
                .streams
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&handle.id())
                .map(|stream| Arc::clone(&stream.latest))
                .ok_or_else(|| BackendError::FrameUnavailable("stream is closed".to_string()))?;

            // Freshly opened streams need a moment before the first buffer lands
            let deadline = Instant::now() + FIRST_FRAME_TIMEOUT;
            loop {
                let current = latest.lock().unwrap_or_else(PoisonError::into_inner).clone();
                if let Some(frame) = current {
                    return Ok(frame);
                }
                if !handle.is_live() {
                    return Err(BackendError::FrameUnavailable(
                        "stream stopped before delivering a frame".to_string(),
                    ));
                }
                if Instant::now() >= deadline {
                    return Err(BackendError::FrameUnavailable(format!(
                        "no frame within {} ms",
                        FIRST_FRAME_TIMEOUT.as_millis()
                    )));
                }
                tokio::time::sleep(FRAME_POLL_INTERVAL).await;
            }
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

            let Some(mut stream) = removed else {
                debug!(stream = %handle.id(), "V4L2 stream already closed");
                return;
            };

            info!(stream = %handle.id(), "Stopping V4L2 stream");
            stream.running.store(false, Ordering::SeqCst);
            if let Some(thread_handle) = stream.thread_handle.take() {
                join_capture_thread(thread_handle).await;
            }
        }
        .boxed()
    }
}

impl Drop for V4l2Source {
    fn drop(&mut self) {
        let streams = self.streams.get_mut().unwrap_or_else(PoisonError::into_inner);
        for stream in streams.values() {
            stream.running.store(false, Ordering::SeqCst);
        }
    }
}

async fn join_capture_thread(thread_handle: std::thread::JoinHandle<()>) {
    match tokio::task::spawn_blocking(move || thread_handle.join()).await {
        Ok(Ok(())) => debug!("Capture thread stopped"),
        Ok(Err(_)) => warn!("Capture thread panicked"),
        Err(e) => warn!(error = %e, "Failed to join capture thread"),
    }
}

/// `videoN` nodes in `dir`, sorted by index
fn video_nodes(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        warn!(dir = %dir.display(), "Cannot read device directory");
        return Vec::new();
    };

    let mut nodes: Vec<(u32, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            let index = name.to_str()?.strip_prefix("video")?.parse::<u32>().ok()?;
            Some((index, entry.path()))
        })
        .collect();

    nodes.sort_by_key(|(index, _)| *index);
    nodes.into_iter().map(|(_, path)| path).collect()
}

/// Guess the facing mode from the V4L2 card name
///
/// Laptop and USB webcams point at the user; phone sensors usually say which
/// side they sit on. Anything else is assumed to look outward.
pub fn guess_facing(card: &str) -> FacingMode {
    let card = card.to_ascii_lowercase();
    const USER_HINTS: [&str; 6] = ["front", "user", "selfie", "integrated", "webcam", "facetime"];
    const ENVIRONMENT_HINTS: [&str; 3] = ["back", "rear", "world"];

    if ENVIRONMENT_HINTS.iter().any(|hint| card.contains(hint)) {
        FacingMode::Environment
    } else if USER_HINTS.iter().any(|hint| card.contains(hint)) {
        FacingMode::User
    } else {
        FacingMode::Environment
    }
}

/// Capture loop running in a separate thread
fn capture_loop(
    device_path: &str,
    resolution: Resolution,
    running: Arc<AtomicBool>,
    latest: LatestFrame,
    ready_tx: oneshot::Sender<BackendResult<StreamReady>>,
) {
    info!(device_path, %resolution, "Opening V4L2 device");

    let mut dev = match Device::with_path(device_path) {
        Ok(dev) => dev,
        Err(e) => {
            let _ = ready_tx.send(Err(BackendError::from_io("open device", &e)));
            return;
        }
    };

    let (width, height, stride, format) = match configure_format(&dev, resolution) {
        Ok(configured) => configured,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let mut stream = match MmapStream::with_buffers(&mut dev, Type::VideoCapture, STREAM_BUFFER_COUNT)
    {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(BackendError::from_io("start streaming", &e)));
            return;
        }
    };

    let ready = StreamReady {
        resolution: Resolution::new(width, height),
        format,
    };
    if ready_tx.send(Ok(ready)).is_err() {
        debug!(device_path, "Stream requester went away before streaming started");
        return;
    }

    info!(device_path, width, height, ?format, "V4L2 capture stream started");

    while running.load(Ordering::SeqCst) {
        match stream.next() {
            Ok((buf, meta)) => {
                let used = (meta.bytesused as usize).min(buf.len());
                let bytes = if used > 0 { &buf[..used] } else { buf };

                let frame = CameraFrame {
                    width,
                    height,
                    data: Arc::from(bytes),
                    format,
                    stride,
                    captured_at: Instant::now(),
                };
                *latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
            }
            Err(e) if e.raw_os_error() == Some(libc::ENODEV) => {
                error!(device_path, "Camera disconnected");
                running.store(false, Ordering::SeqCst);
                break;
            }
            Err(e) => {
                warn!(error = %e, "Failed to dequeue frame");
                std::thread::sleep(DEQUEUE_RETRY_DELAY);
            }
        }
    }

    info!(device_path, "V4L2 capture loop ended");
}

/// Ask for YUYV at the ideal size, falling back to MJPEG
///
/// Returns the negotiated width, height, stride and pixel format.
fn configure_format(
    dev: &Device,
    resolution: Resolution,
) -> BackendResult<(u32, u32, u32, PixelFormat)> {
    let mut last_fourcc = None;

    for fourcc in [FourCC::new(b"YUYV"), FourCC::new(b"MJPG")] {
        let mut format = dev
            .format()
            .map_err(|e| BackendError::from_io("query format", &e))?;
        format.width = resolution.width;
        format.height = resolution.height;
        format.fourcc = fourcc;

        let applied = dev
            .set_format(&format)
            .map_err(|e| BackendError::from_io("set format", &e))?;

        if let Some(pixel_format) = PixelFormat::from_fourcc(&applied.fourcc.repr) {
            return Ok((applied.width, applied.height, applied.stride, pixel_format));
        }

        warn!(requested = ?fourcc, got = ?applied.fourcc, "Device did not accept format");
        last_fourcc = Some(applied.fourcc);
    }

    Err(BackendError::Unknown(format!(
        "no supported pixel format (device offers {:?})",
        last_fourcc
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_facing_from_card_names() {
        assert_eq!(guess_facing("Integrated Camera: Integrated C"), FacingMode::User);
        assert_eq!(guess_facing("HD Pro Webcam C920"), FacingMode::User);
        assert_eq!(guess_facing("imx258 rear"), FacingMode::Environment);
        assert_eq!(guess_facing("ov8858"), FacingMode::Environment);
    }

    #[test]
    fn test_overrides_win_over_heuristics() {
        let mut overrides = HashMap::new();
        overrides.insert("/dev/video4".to_string(), FacingMode::Environment);
        let source = V4l2Source::new(PathBuf::from("/dev"), overrides);

        assert_eq!(
            source.facing_for("/dev/video4", "Integrated Camera"),
            FacingMode::Environment
        );
        assert_eq!(
            source.facing_for("/dev/video0", "Integrated Camera"),
            FacingMode::User
        );
    }

    #[tokio::test]
    async fn test_missing_device_dir_is_device_not_found() {
        let source = V4l2Source::new(
            PathBuf::from("/nonexistent/capture-surface-test"),
            HashMap::new(),
        );
        assert!(source.enumerate_cameras().is_empty());

        let result = source
            .open_stream(FacingMode::Environment, Resolution::default())
            .await;
        assert!(matches!(result, Err(BackendError::DeviceNotFound(_))));
    }
}

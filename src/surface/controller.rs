// SPDX-License-Identifier: GPL-3.0-only

//! Capture surface state machine
//!
//! ```text
//!            open                    ok
//!  Closed ─────────▶ Initializing ─────────▶ Ready ◀──────▶ Capturing
//!    ▲                 │      │                │  trigger / settle
//!    │  device error   │      │ permission     │ toggle facing:
//!    └─────────────────┘      ▼                │ release, then reacquire
//!                       Denied / Blocked       ▼
//!                                          Initializing
//! ```
//!
//! Signals that need hardware run as spawned tasks, so a caller that stops
//! waiting cannot strand a stream: the task always settles and releases what
//! it holds once the surface has moved on.

use super::capabilities::{CapabilityProbe, CapabilitySet, probe_for};
use super::state::{CaptureOutcome, CaptureSurfaceState, Inner, Stage, SurfacePhase};
use crate::backends::camera::{self, FacingMode, StreamHandle, StreamManager};
use crate::backends::permission::{PermissionNegotiator, PermissionState, negotiator_for};
use crate::config::Config;
use crate::errors::{SurfaceError, SurfaceResult};
use crate::pipelines::photo::CaptureEngine;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Orchestrates permission, stream, capabilities and capture
///
/// Cheap to clone; clones drive the same surface.
#[derive(Clone)]
pub struct CaptureSurfaceController {
    shared: Arc<Shared>,
}

struct Shared {
    permissions: Box<dyn PermissionNegotiator>,
    streams: StreamManager,
    probe: Box<dyn CapabilityProbe>,
    engine: CaptureEngine,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<CaptureSurfaceState>,
}

impl CaptureSurfaceController {
    /// Assemble a surface from its collaborators
    ///
    /// # Arguments
    /// * `permissions` - Negotiator consulted on every open
    /// * `streams` - Stream manager owning the camera source
    /// * `probe` - Capability probe run on every acquired stream
    /// * `facing` - Facing mode of the first stream
    pub fn new(
        permissions: Box<dyn PermissionNegotiator>,
        streams: StreamManager,
        probe: Box<dyn CapabilityProbe>,
        facing: FacingMode,
    ) -> Self {
        info!(
            negotiator = permissions.name(),
            backend = %streams.backend_type(),
            %facing,
            "Creating capture surface"
        );

        let inner = Inner::new(facing);
        let (state_tx, _) = watch::channel(inner.snapshot());

        Self {
            shared: Arc::new(Shared {
                permissions,
                streams,
                probe,
                engine: CaptureEngine::new(),
                inner: Mutex::new(inner),
                state_tx,
            }),
        }
    }

    /// Build a surface wired the way `config` asks
    pub fn from_config(config: &Config) -> SurfaceResult<Self> {
        config.validate()?;
        let streams = StreamManager::new(camera::source_for(config), config.resolution());
        Ok(Self::new(
            negotiator_for(config),
            streams,
            probe_for(config),
            config.default_facing,
        ))
    }

    /// Current state snapshot
    pub fn state(&self) -> CaptureSurfaceState {
        self.shared.state_tx.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<CaptureSurfaceState> {
        self.shared.state_tx.subscribe()
    }

    /// Stream manager behind this surface
    pub fn streams(&self) -> &StreamManager {
        &self.shared.streams
    }

    /// Capture engine behind this surface
    pub fn engine(&self) -> &CaptureEngine {
        &self.shared.engine
    }

    /// Open the surface: negotiate permission, acquire a stream, probe it
    ///
    /// Accepted from `Closed`, `Denied` and `Blocked`; while already open it
    /// returns the current phase without doing anything. Failures are also
    /// recorded in the state together with the phase they lead to. When the
    /// surface is closed before opening finishes, this returns `Closed`.
    pub async fn open(&self) -> SurfaceResult<SurfacePhase> {
        self.run(|shared| async move { shared.open().await }).await
    }

    /// Close the surface from any phase
    ///
    /// Resolves once no stream is open any more, including one still being
    /// acquired or lent to a running capture. Safe to call repeatedly.
    pub async fn close(&self) {
        if let Err(e) = self
            .run(|shared| async move {
                shared.close().await;
                Ok(())
            })
            .await
        {
            warn!(error = %e, "Close did not complete");
        }
    }

    /// Switch between the user- and environment-facing camera
    ///
    /// Only acts in `Ready`, returning `Ok(false)` otherwise. The current
    /// stream is fully released before the other camera is acquired.
    pub async fn toggle_facing_mode(&self) -> SurfaceResult<bool> {
        self.run(|shared| async move { shared.toggle_facing_mode().await })
            .await
    }

    /// Capture one still image
    ///
    /// Only acts in `Ready`; a trigger while a capture runs is ignored.
    pub async fn trigger_capture(&self) -> SurfaceResult<CaptureOutcome> {
        self.run(|shared| async move { shared.trigger_capture().await })
            .await
    }

    /// Flip the torch; returns whether anything changed
    ///
    /// The hardware write runs outside the state lock. While it runs the
    /// surface still reads as `Ready` but ignores other signals.
    pub fn toggle_torch(&self) -> bool {
        let Some((handle, epoch, current)) = self.shared.lend_for_torch() else {
            return false;
        };

        let updated = self
            .shared
            .probe
            .set_torch(&handle, current, !current.torch_enabled);

        match self.shared.return_from_torch(epoch, handle, updated) {
            Ok(()) => updated != current,
            Err(handle) => {
                debug!(stream = %handle.id(), "Surface closed during torch change");
                self.release_detached(handle);
                false
            }
        }
    }

    /// Close without waiting, for unmount paths that cannot await
    ///
    /// The stream is released on the runtime when there is one; otherwise
    /// dropping the handle stops the backend worker.
    pub fn teardown(&self) {
        let Some(handle) = self.shared.close_stage() else {
            return;
        };
        self.release_detached(handle);
    }

    /// Release from synchronous code: on the runtime when there is one,
    /// otherwise dropping the handle stops the backend worker
    fn release_detached(&self, handle: StreamHandle) {
        self.shared.probe.shutdown(&handle);

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let shared = Arc::clone(&self.shared);
                runtime.spawn(async move { shared.streams.release(handle).await });
            }
            Err(_) => {
                debug!(stream = %handle.id(), "No runtime for teardown, dropping stream");
                drop(handle);
            }
        }
    }

    async fn run<T, F, Fut>(&self, work: F) -> SurfaceResult<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Shared>) -> Fut,
        Fut: Future<Output = SurfaceResult<T>> + Send + 'static,
    {
        tokio::spawn(work(Arc::clone(&self.shared)))
            .await
            .map_err(|e| SurfaceError::Device(format!("surface task failed: {}", e)))?
    }
}

impl std::fmt::Debug for CaptureSurfaceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSurfaceController")
            .field("state", &self.state())
            .field("streams", &self.shared.streams)
            .finish()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &Inner) {
        self.state_tx.send_replace(inner.snapshot());
    }

    /// Apply `update` unless the surface moved past `epoch`
    fn settle(&self, epoch: u64, update: impl FnOnce(&mut Inner)) -> bool {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            return false;
        }
        update(&mut inner);
        self.publish(&inner);
        true
    }

    /// Give a stream back to the manager, torch off first
    async fn release(&self, handle: StreamHandle) {
        self.probe.shutdown(&handle);
        self.streams.release(handle).await;
    }

    /// Settle a failed open or reacquire
    fn fail(&self, epoch: u64, error: SurfaceError) -> SurfaceResult<SurfacePhase> {
        let phase = match error {
            SurfaceError::PermissionDenied => SurfacePhase::Denied,
            SurfaceError::PermissionBlocked => SurfacePhase::Blocked,
            _ => SurfacePhase::Closed,
        };

        let settled = self.settle(epoch, |inner| {
            inner.stage = match phase {
                SurfacePhase::Denied => Stage::Denied,
                SurfacePhase::Blocked => Stage::Blocked,
                _ => Stage::Closed,
            };
            if phase != SurfacePhase::Closed {
                inner.permission = match phase {
                    SurfacePhase::Blocked => PermissionState::Blocked,
                    _ => PermissionState::Denied,
                };
            }
            inner.capabilities = CapabilitySet::default();
            inner.error = Some(error.clone());
        });

        if !settled {
            debug!(error = %error, "Failure settled after close, ignoring");
            return Ok(SurfacePhase::Closed);
        }

        warn!(error = %error, phase = %phase, "Capture surface failed to open");
        Err(error)
    }

    async fn open(&self) -> SurfaceResult<SurfacePhase> {
        let (epoch, facing) = {
            let mut inner = self.lock();
            if !inner.stage.is_openable() {
                debug!(phase = %inner.stage.phase(), "Surface already open");
                return Ok(inner.stage.phase());
            }
            inner.stage = Stage::Initializing;
            inner.epoch += 1;
            inner.capabilities = CapabilitySet::default();
            inner.error = None;
            inner.notice = None;
            self.publish(&inner);
            (inner.epoch, inner.facing)
        };

        info!(epoch, %facing, "Opening capture surface");

        match self.negotiate(epoch).await {
            Ok(Some(PermissionState::Granted)) => {}
            Ok(Some(PermissionState::Blocked)) => {
                return self.fail(epoch, SurfaceError::PermissionBlocked);
            }
            Ok(Some(_)) => return self.fail(epoch, SurfaceError::PermissionDenied),
            Ok(None) => return Ok(SurfacePhase::Closed),
            Err(e) => return self.fail(epoch, e),
        }

        match self.acquire_for(epoch, facing).await {
            Some(acquired) => self.settle_acquisition(epoch, acquired).await,
            None => Ok(SurfacePhase::Closed),
        }
    }

    /// Acquire a stream unless the surface moves past `epoch` first
    ///
    /// The slot is reserved before the epoch is checked, so a close that lands
    /// afterwards waits for this acquisition to settle and release.
    async fn acquire_for(
        &self,
        epoch: u64,
        facing: FacingMode,
    ) -> Option<Result<StreamHandle, camera::BackendError>> {
        let slot = match self.streams.reserve().await {
            Ok(slot) => slot,
            Err(e) => return Some(Err(e)),
        };
        if self.lock().epoch != epoch {
            debug!(epoch, "Surface closed before acquisition, not opening a stream");
            return None;
        }
        Some(self.streams.open_reserved(slot, facing).await)
    }

    /// Fold an acquisition failure, telling the negotiator about refusals
    fn acquisition_error(&self, err: camera::BackendError) -> SurfaceError {
        if let camera::BackendError::PermissionDenied(detail) = &err {
            info!(negotiator = self.permissions.name(), %detail, "Device refused access");
            self.permissions.report_refusal();
        }
        err.into()
    }

    /// Run check, then request when needed
    ///
    /// `Ok(None)` means the surface was closed while waiting.
    async fn negotiate(&self, epoch: u64) -> SurfaceResult<Option<PermissionState>> {
        let checked = self.permissions.check().await;
        debug!(negotiator = self.permissions.name(), state = %checked, "Permission checked");
        if !self.settle(epoch, |inner| inner.permission = checked) {
            return Ok(None);
        }

        // Blocked never prompts; the platform would refuse anyway
        if !checked.is_requestable() {
            return Ok(Some(checked));
        }

        let requested = self.permissions.request().await?;
        info!(state = %requested, "Permission request answered");
        if !self.settle(epoch, |inner| inner.permission = requested) {
            return Ok(None);
        }
        Ok(Some(requested))
    }

    /// Install a freshly acquired stream, or release it if the surface moved on
    async fn settle_acquisition(
        &self,
        epoch: u64,
        acquired: Result<StreamHandle, camera::BackendError>,
    ) -> SurfaceResult<SurfacePhase> {
        let handle = match acquired {
            Ok(handle) => handle,
            Err(e) => {
                let error = self.acquisition_error(e);
                return self.fail(epoch, error);
            }
        };

        let capabilities = self.probe.probe(&handle);
        let can_switch_facing = self.streams.available_facings().len() > 1;

        let stale = {
            let mut inner = self.lock();
            if inner.epoch != epoch {
                Some(handle)
            } else {
                info!(
                    stream = %handle.id(),
                    facing = %handle.facing_mode(),
                    has_torch = capabilities.has_torch,
                    "Capture surface ready"
                );
                inner.stage = Stage::Ready { handle };
                inner.capabilities = capabilities;
                inner.can_switch_facing = can_switch_facing;
                self.publish(&inner);
                None
            }
        };

        match stale {
            Some(handle) => {
                info!(stream = %handle.id(), "Surface closed during acquisition, releasing stream");
                self.release(handle).await;
                Ok(SurfacePhase::Closed)
            }
            None => Ok(SurfacePhase::Ready),
        }
    }

    /// Move to `Closed`, returning the stream if one was installed
    fn close_stage(&self) -> Option<StreamHandle> {
        let mut inner = self.lock();
        inner.epoch += 1;
        let handle = inner.stage.take_handle(Stage::Closed);
        inner.stage = Stage::Closed;
        inner.capabilities = CapabilitySet::default();
        inner.error = None;
        inner.notice = None;
        self.publish(&inner);
        handle
    }

    async fn close(&self) {
        info!("Closing capture surface");
        if let Some(handle) = self.close_stage() {
            self.release(handle).await;
        }
        self.streams.wait_idle().await;
        debug!("Capture surface closed");
    }

    async fn toggle_facing_mode(&self) -> SurfaceResult<bool> {
        let (handle, epoch, previous) = {
            let mut inner = self.lock();
            let Some(handle) = inner.stage.take_handle(Stage::Initializing) else {
                debug!(phase = %inner.stage.phase(), "Facing toggle ignored, surface not ready");
                return Ok(false);
            };
            let previous = inner.facing;
            inner.facing = previous.toggled();
            inner.capabilities = CapabilitySet::default();
            inner.notice = None;
            self.publish(&inner);
            (handle, inner.epoch, previous)
        };

        let next = previous.toggled();
        info!(from = %previous, to = %next, "Switching facing mode");

        self.release(handle).await;
        match self.acquire_for(epoch, next).await {
            Some(Ok(handle)) => self
                .settle_acquisition(epoch, Ok(handle))
                .await
                .map(|phase| phase == SurfacePhase::Ready),
            Some(Err(e)) => {
                // Reopen with the camera that last worked
                self.settle(epoch, |inner| inner.facing = previous);
                let error = self.acquisition_error(e);
                self.fail(epoch, error).map(|_| false)
            }
            None => Ok(false),
        }
    }

    async fn trigger_capture(&self) -> SurfaceResult<CaptureOutcome> {
        let (handle, epoch) = {
            let mut inner = self.lock();
            let Some(handle) = inner.stage.take_handle(Stage::Capturing) else {
                debug!(phase = %inner.stage.phase(), "Capture trigger ignored");
                return Ok(CaptureOutcome::Ignored);
            };
            inner.notice = None;
            self.publish(&inner);
            (handle, inner.epoch)
        };

        let result = self.engine.capture(&self.streams, &handle).await;

        let stale = {
            let mut inner = self.lock();
            if inner.epoch != epoch {
                Some(handle)
            } else {
                inner.stage = Stage::Ready { handle };
                if let Err(e) = &result {
                    inner.notice = Some(e.to_string());
                }
                self.publish(&inner);
                None
            }
        };

        if let Some(handle) = stale {
            info!(stream = %handle.id(), "Surface closed during capture, discarding image");
            self.release(handle).await;
            return Ok(CaptureOutcome::Discarded);
        }

        result
            .map(CaptureOutcome::Captured)
            .map_err(SurfaceError::Capture)
    }

    /// Lend the stream out of `Ready` for a torch change
    fn lend_for_torch(&self) -> Option<(StreamHandle, u64, CapabilitySet)> {
        let mut inner = self.lock();
        if !matches!(inner.stage, Stage::Ready { .. }) {
            debug!("Torch toggle ignored, surface not ready");
            return None;
        }
        let current = inner.capabilities;
        if !current.has_torch {
            debug!("Torch toggle ignored, no torch");
            return None;
        }
        let handle = inner.stage.take_handle(Stage::Adjusting)?;
        Some((handle, inner.epoch, current))
    }

    /// Put the stream back after a torch change
    ///
    /// Hands the stream back as `Err` when the surface closed meanwhile.
    fn return_from_torch(
        &self,
        epoch: u64,
        handle: StreamHandle,
        updated: CapabilitySet,
    ) -> Result<(), StreamHandle> {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            return Err(handle);
        }
        inner.stage = Stage::Ready { handle };
        inner.capabilities = updated;
        self.publish(&inner);
        Ok(())
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = inner.stage.take_handle(Stage::Closed) {
            self.probe.shutdown(&handle);
            drop(handle);
        }
    }
}

// SPDX-License-Identifier: MPL-2.0

//! Scripted collaborators for driving a capture surface in tests
//!
//! Each fake is a cheap clone around shared state, so a test keeps one copy
//! for inspection while the surface owns another.

#![allow(dead_code)]

use capture_surface::backends::camera::{
    BackendError, BackendResult, CameraBackendType, CameraDevice, CameraFrame, CameraSource,
    FacingMode, PixelFormat, Resolution, StreamHandle, StreamManager,
};
use capture_surface::backends::permission::{
    PermissionError, PermissionNegotiator, PermissionState,
};
use capture_surface::{
    CapabilityProbe, CapabilitySet, CaptureSurfaceController, CaptureSurfaceState, SurfacePhase,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Camera source with counters, failure injection and gates
#[derive(Clone, Default)]
pub struct ScriptedSource {
    inner: Arc<SourceScript>,
}

#[derive(Default)]
struct SourceScript {
    open: Mutex<HashSet<Uuid>>,
    open_attempts: AtomicUsize,
    acquisitions: AtomicUsize,
    releases: AtomicUsize,
    max_open: AtomicUsize,
    frames_read: AtomicUsize,
    open_failure: Mutex<Option<BackendError>>,
    fail_frames: AtomicBool,
    acquire_gate: Mutex<Option<Arc<Semaphore>>>,
    frame_gate: Mutex<Option<Arc<Semaphore>>>,
    close_gate: Mutex<Option<Arc<Semaphore>>>,
    close_attempts: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every following open fails with `err` (until cleared with `None`)
    pub fn fail_opens(&self, err: Option<BackendError>) {
        *self.inner.open_failure.lock().unwrap() = err;
    }

    /// Every following frame read fails
    pub fn fail_frames(&self, fail: bool) {
        self.inner.fail_frames.store(fail, Ordering::SeqCst);
    }

    /// Hold opens until a permit is added to the returned gate
    pub fn gate_opens(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.inner.acquire_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Hold frame reads until a permit is added to the returned gate
    pub fn gate_frames(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.inner.frame_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Hold stream closes until a permit is added to the returned gate
    pub fn gate_closes(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.inner.close_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn close_attempts(&self) -> usize {
        self.inner.close_attempts.load(Ordering::SeqCst)
    }

    pub fn open_attempts(&self) -> usize {
        self.inner.open_attempts.load(Ordering::SeqCst)
    }

    pub fn acquisitions(&self) -> usize {
        self.inner.acquisitions.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.inner.releases.load(Ordering::SeqCst)
    }

    pub fn open_streams(&self) -> usize {
        self.inner.open.lock().unwrap().len()
    }

    /// Highest number of streams ever open at once
    pub fn max_open(&self) -> usize {
        self.inner.max_open.load(Ordering::SeqCst)
    }

    pub fn frames_read(&self) -> usize {
        self.inner.frames_read.load(Ordering::SeqCst)
    }

    fn camera(facing: FacingMode) -> CameraDevice {
        CameraDevice {
            name: format!("Scripted {} camera", facing),
            path: format!("scripted:{}", facing),
            facing,
            driver: None,
        }
    }
}

async fn pass_gate(gate: &Mutex<Option<Arc<Semaphore>>>) {
    let gate = gate.lock().unwrap().clone();
    if let Some(gate) = gate
        && let Ok(permit) = gate.acquire().await
    {
        permit.forget();
    }
}

impl CameraSource for ScriptedSource {
    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::Virtual
    }

    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        vec![
            Self::camera(FacingMode::Environment),
            Self::camera(FacingMode::User),
        ]
    }

    fn open_stream(
        &self,
        facing: FacingMode,
        resolution: Resolution,
    ) -> BoxFuture<'_, BackendResult<StreamHandle>> {
        async move {
            self.inner.open_attempts.fetch_add(1, Ordering::SeqCst);
            pass_gate(&self.inner.acquire_gate).await;

            let failure = self.inner.open_failure.lock().unwrap().clone();
            if let Some(err) = failure {
                return Err(err);
            }

            let handle = StreamHandle::new(Self::camera(facing), facing, resolution);
            let open_now = {
                let mut open = self.inner.open.lock().unwrap();
                open.insert(handle.id());
                open.len()
            };
            self.inner.max_open.fetch_max(open_now, Ordering::SeqCst);
            self.inner.acquisitions.fetch_add(1, Ordering::SeqCst);
            Ok(handle)
        }
        .boxed()
    }

    fn read_frame<'a>(
        &'a self,
        handle: &'a StreamHandle,
    ) -> BoxFuture<'a, BackendResult<CameraFrame>> {
        async move {
            self.inner.frames_read.fetch_add(1, Ordering::SeqCst);
            pass_gate(&self.inner.frame_gate).await;

            if self.inner.fail_frames.load(Ordering::SeqCst) {
                return Err(BackendError::FrameUnavailable("scripted failure".to_string()));
            }

            let resolution = handle.resolution();
            let data = vec![128u8; resolution.pixel_count() * 4];
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
            self.inner.close_attempts.fetch_add(1, Ordering::SeqCst);
            pass_gate(&self.inner.close_gate).await;

            if self.inner.open.lock().unwrap().remove(&handle.id()) {
                self.inner.releases.fetch_add(1, Ordering::SeqCst);
            }
        }
        .boxed()
    }
}

/// Negotiator answering from a script
#[derive(Clone)]
pub struct ScriptedPermissions {
    inner: Arc<PermissionScript>,
}

struct PermissionScript {
    current: Mutex<PermissionState>,
    answers: Mutex<VecDeque<Result<PermissionState, PermissionError>>>,
    checks: AtomicUsize,
    requests: AtomicUsize,
}

impl ScriptedPermissions {
    /// `check` reports `current`; requests grant unless answers are queued
    pub fn new(current: PermissionState) -> Self {
        Self {
            inner: Arc::new(PermissionScript {
                current: Mutex::new(current),
                answers: Mutex::new(VecDeque::new()),
                checks: AtomicUsize::new(0),
                requests: AtomicUsize::new(0),
            }),
        }
    }

    pub fn set_current(&self, state: PermissionState) {
        *self.inner.current.lock().unwrap() = state;
    }

    /// Queue the answer of the next request
    pub fn answer(&self, answer: Result<PermissionState, PermissionError>) {
        self.inner.answers.lock().unwrap().push_back(answer);
    }

    pub fn checks(&self) -> usize {
        self.inner.checks.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> usize {
        self.inner.requests.load(Ordering::SeqCst)
    }
}

impl PermissionNegotiator for ScriptedPermissions {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn check(&self) -> BoxFuture<'_, PermissionState> {
        async move {
            self.inner.checks.fetch_add(1, Ordering::SeqCst);
            *self.inner.current.lock().unwrap()
        }
        .boxed()
    }

    fn request(&self) -> BoxFuture<'_, Result<PermissionState, PermissionError>> {
        async move {
            self.inner.requests.fetch_add(1, Ordering::SeqCst);
            let answer = self
                .inner
                .answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(PermissionState::Granted));
            if let Ok(state) = answer {
                *self.inner.current.lock().unwrap() = state;
            }
            answer
        }
        .boxed()
    }
}

/// Capability probe with an optional torch
#[derive(Clone)]
pub struct ScriptedProbe {
    inner: Arc<ProbeScript>,
}

type TorchHook = Box<dyn Fn() + Send + Sync>;

struct ProbeScript {
    has_torch: bool,
    probes: AtomicUsize,
    shutdowns: AtomicUsize,
    torch_hook: Mutex<Option<TorchHook>>,
}

impl ScriptedProbe {
    pub fn new(has_torch: bool) -> Self {
        Self {
            inner: Arc::new(ProbeScript {
                has_torch,
                probes: AtomicUsize::new(0),
                shutdowns: AtomicUsize::new(0),
                torch_hook: Mutex::new(None),
            }),
        }
    }

    /// Run `hook` in the middle of every torch change
    pub fn on_torch(&self, hook: Option<TorchHook>) {
        *self.inner.torch_hook.lock().unwrap() = hook;
    }

    pub fn probes(&self) -> usize {
        self.inner.probes.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.inner.shutdowns.load(Ordering::SeqCst)
    }
}

impl CapabilityProbe for ScriptedProbe {
    fn probe(&self, _handle: &StreamHandle) -> CapabilitySet {
        self.inner.probes.fetch_add(1, Ordering::SeqCst);
        CapabilitySet {
            has_torch: self.inner.has_torch,
            torch_enabled: false,
        }
    }

    fn set_torch(
        &self,
        _handle: &StreamHandle,
        current: CapabilitySet,
        enabled: bool,
    ) -> CapabilitySet {
        if !current.has_torch {
            return current;
        }
        if let Some(hook) = self.inner.torch_hook.lock().unwrap().as_ref() {
            hook();
        }
        CapabilitySet {
            torch_enabled: enabled,
            ..current
        }
    }

    fn shutdown(&self, _handle: &StreamHandle) {
        self.inner.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// A surface wired to scripted collaborators
pub struct Harness {
    pub surface: CaptureSurfaceController,
    pub source: ScriptedSource,
    pub permissions: ScriptedPermissions,
    pub probe: ScriptedProbe,
}

impl Harness {
    pub fn new(permission: PermissionState, has_torch: bool) -> Self {
        Self::with_resolution(permission, has_torch, Resolution::new(1280, 720))
    }

    pub fn with_resolution(
        permission: PermissionState,
        has_torch: bool,
        resolution: Resolution,
    ) -> Self {
        let permissions = ScriptedPermissions::new(permission);
        Self::assemble(Box::new(permissions.clone()), permissions, has_torch, resolution)
    }

    /// Harness around a real negotiator; `permissions` then stays unused
    pub fn with_negotiator(negotiator: Box<dyn PermissionNegotiator>) -> Self {
        let unused = ScriptedPermissions::new(PermissionState::Unknown);
        Self::assemble(negotiator, unused, false, Resolution::new(1280, 720))
    }

    fn assemble(
        negotiator: Box<dyn PermissionNegotiator>,
        permissions: ScriptedPermissions,
        has_torch: bool,
        resolution: Resolution,
    ) -> Self {
        let source = ScriptedSource::new();
        let probe = ScriptedProbe::new(has_torch);

        let streams = StreamManager::new(Arc::new(source.clone()), resolution);
        let surface = CaptureSurfaceController::new(
            negotiator,
            streams,
            Box::new(probe.clone()),
            FacingMode::Environment,
        );

        Self {
            surface,
            source,
            permissions,
            probe,
        }
    }

    /// Wait until the surface publishes `phase`
    pub async fn wait_for_phase(&self, phase: SurfacePhase) -> CaptureSurfaceState {
        let mut rx = self.surface.subscribe();
        let state = tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|state| state.phase == phase),
        )
        .await
        .expect("timed out waiting for phase")
        .expect("surface state channel closed")
        .clone();
        state
    }
}

/// Poll `condition` until it holds
pub async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

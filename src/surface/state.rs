// SPDX-License-Identifier: GPL-3.0-only

//! Observable capture surface state

use super::capabilities::CapabilitySet;
use crate::backends::camera::{FacingMode, StreamHandle};
use crate::backends::permission::PermissionState;
use crate::errors::SurfaceError;
use crate::pipelines::photo::CaptureResult;

/// Phase of the capture surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfacePhase {
    #[default]
    Closed,
    /// Negotiating permission or acquiring a stream
    Initializing,
    /// Stream live, accepting captures
    Ready,
    /// One still capture in flight
    Capturing,
    /// User declined; the next open asks again
    Denied,
    /// Platform refuses to ask; needs a settings change
    Blocked,
}

impl std::fmt::Display for SurfacePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfacePhase::Closed => write!(f, "Closed"),
            SurfacePhase::Initializing => write!(f, "Initializing"),
            SurfacePhase::Ready => write!(f, "Ready"),
            SurfacePhase::Capturing => write!(f, "Capturing"),
            SurfacePhase::Denied => write!(f, "Denied"),
            SurfacePhase::Blocked => write!(f, "Blocked"),
        }
    }
}

/// Snapshot of the surface for rendering
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CaptureSurfaceState {
    pub phase: SurfacePhase,
    pub is_initializing: bool,
    pub permission: PermissionState,
    pub capabilities: CapabilitySet,
    pub is_capturing: bool,
    /// Facing mode of the current (or next) stream
    pub facing: FacingMode,
    /// More than one facing mode is available
    pub can_switch_facing: bool,
    /// Last permission or device error, with its remediation
    pub error: Option<SurfaceError>,
    /// Transient message, e.g. a failed capture
    pub notice: Option<String>,
}

/// What a capture trigger led to
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// A still image, now owned by the caller
    Captured(CaptureResult),
    /// Surface was not ready, or a capture was already in flight
    Ignored,
    /// Surface closed while the capture ran; the image was dropped
    Discarded,
}

/// Controller stage; `Ready` owns the live stream
pub(super) enum Stage {
    Closed,
    Initializing,
    Ready { handle: StreamHandle },
    /// The stream is lent to the running capture
    Capturing,
    /// The stream is lent to a torch change; observed as `Ready`
    Adjusting,
    Denied,
    Blocked,
}

impl Stage {
    pub(super) fn phase(&self) -> SurfacePhase {
        match self {
            Stage::Closed => SurfacePhase::Closed,
            Stage::Initializing => SurfacePhase::Initializing,
            Stage::Ready { .. } | Stage::Adjusting => SurfacePhase::Ready,
            Stage::Capturing => SurfacePhase::Capturing,
            Stage::Denied => SurfacePhase::Denied,
            Stage::Blocked => SurfacePhase::Blocked,
        }
    }

    /// Whether `open` may start from here
    pub(super) fn is_openable(&self) -> bool {
        matches!(self, Stage::Closed | Stage::Denied | Stage::Blocked)
    }

    /// Move the live stream out of `Ready`, leaving `next` in its place
    ///
    /// Any other stage is left untouched.
    pub(super) fn take_handle(&mut self, next: Stage) -> Option<StreamHandle> {
        if !matches!(self, Stage::Ready { .. }) {
            return None;
        }
        match std::mem::replace(self, next) {
            Stage::Ready { handle } => Some(handle),
            _ => None,
        }
    }
}

/// Mutable controller data, guarded by one mutex
pub(super) struct Inner {
    pub(super) stage: Stage,
    /// Bumped by every open and close; work that settles under an older epoch
    /// is stale and must release what it holds
    pub(super) epoch: u64,
    pub(super) permission: PermissionState,
    pub(super) capabilities: CapabilitySet,
    pub(super) facing: FacingMode,
    pub(super) can_switch_facing: bool,
    pub(super) error: Option<SurfaceError>,
    pub(super) notice: Option<String>,
}

impl Inner {
    pub(super) fn new(facing: FacingMode) -> Self {
        Self {
            stage: Stage::Closed,
            epoch: 0,
            permission: PermissionState::Unknown,
            capabilities: CapabilitySet::default(),
            facing,
            can_switch_facing: false,
            error: None,
            notice: None,
        }
    }

    pub(super) fn snapshot(&self) -> CaptureSurfaceState {
        let phase = self.stage.phase();
        CaptureSurfaceState {
            phase,
            is_initializing: phase == SurfacePhase::Initializing,
            permission: self.permission,
            capabilities: self.capabilities,
            is_capturing: phase == SurfacePhase::Capturing,
            facing: self.facing,
            can_switch_facing: self.can_switch_facing,
            error: self.error.clone(),
            notice: self.notice.clone(),
        }
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! The capture surface
//!
//! A UI collaborator drives the surface with five signals (open, close,
//! trigger capture, toggle facing mode, toggle torch) and renders the
//! [`CaptureSurfaceState`] it publishes. Captured images are handed back to
//! the caller and never kept.

pub mod capabilities;
pub mod controller;
pub mod state;

pub use capabilities::{CapabilityProbe, CapabilitySet, NoTorch, probe_for};
pub use controller::CaptureSurfaceController;
pub use state::{CaptureOutcome, CaptureSurfaceState, SurfacePhase};

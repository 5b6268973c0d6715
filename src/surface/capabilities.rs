// SPDX-License-Identifier: GPL-3.0-only

//! Optional stream capabilities

use crate::backends::camera::{CameraBackendType, StreamHandle};
use crate::config::Config;
use crate::flash::FlashProbe;

/// Optional features of the active stream
///
/// Recomputed from scratch on every acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilitySet {
    pub has_torch: bool,
    pub torch_enabled: bool,
}

/// Inspects a stream for optional hardware features
///
/// A missing capability is never an error: probing reports it as absent and
/// changing it is a silent no-op. Implementations log failures themselves.
pub trait CapabilityProbe: Send + Sync {
    /// Capabilities of a freshly acquired stream
    fn probe(&self, handle: &StreamHandle) -> CapabilitySet;

    /// Switch the torch, returning the resulting capabilities
    ///
    /// Returns `current` unchanged when the torch is absent or did not respond.
    fn set_torch(&self, handle: &StreamHandle, current: CapabilitySet, enabled: bool)
    -> CapabilitySet;

    /// Put hardware back to rest before the stream is released
    fn shutdown(&self, _handle: &StreamHandle) {}
}

/// Probe for sources that never have a torch
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTorch;

impl CapabilityProbe for NoTorch {
    fn probe(&self, _handle: &StreamHandle) -> CapabilitySet {
        CapabilitySet::default()
    }

    fn set_torch(
        &self,
        _handle: &StreamHandle,
        current: CapabilitySet,
        _enabled: bool,
    ) -> CapabilitySet {
        current
    }
}

/// Build the capability probe for the configured source
pub fn probe_for(config: &Config) -> Box<dyn CapabilityProbe> {
    match config.backend {
        CameraBackendType::V4l2 if config.torch_enabled => Box::new(FlashProbe::new(
            config.leds_dir.clone(),
            config.torch_intensity,
        )),
        _ => Box::new(NoTorch),
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Device node access as camera permission
//!
//! Outside a sandbox there is no consent prompt: camera access is whether the
//! process may open `/dev/video*`, usually governed by the `video` group.
//! Nothing can be introspected without trying, so [`check`] answers `Prompt`
//! unless a refusal has been recorded, and every open probes the nodes again.
//! Refusals come from probing or from the camera source failing to open a node
//! that probed fine. A second refusal is reported as `Blocked` because fixing
//! group membership needs a new login session.
//!
//! [`check`]: PermissionNegotiator::check

use super::{PermissionError, PermissionNegotiator, PermissionState};
use crate::constants::DEVICE_DIR;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct Decision {
    /// Last refusal outcome; a grant is never cached
    refusal: Option<PermissionState>,
    denials: u32,
}

/// What probing the device nodes found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    /// At least one node opened, or there is nothing to open
    Accessible,
    /// Every node refused with EACCES/EPERM
    Refused,
}

/// Negotiator that tests access to the video device nodes
pub struct DeviceAccessNegotiator {
    device_dir: PathBuf,
    decision: Mutex<Decision>,
}

impl DeviceAccessNegotiator {
    pub fn new() -> Self {
        Self::with_device_dir(PathBuf::from(DEVICE_DIR))
    }

    /// Negotiator probing nodes under `device_dir`
    pub fn with_device_dir(device_dir: PathBuf) -> Self {
        Self {
            device_dir,
            decision: Mutex::new(Decision::default()),
        }
    }

    fn record(&self, probe: Probe) -> PermissionState {
        let mut decision = self.decision.lock().unwrap_or_else(PoisonError::into_inner);
        match probe {
            Probe::Accessible => {
                decision.refusal = None;
                PermissionState::Granted
            }
            Probe::Refused => {
                // Denials are not reset by a later grant: a node that probes
                // fine but refuses streaming would otherwise loop forever
                decision.denials += 1;
                let state = if decision.denials > 1 {
                    PermissionState::Blocked
                } else {
                    PermissionState::Denied
                };
                decision.refusal = Some(state);
                state
            }
        }
    }
}

impl Default for DeviceAccessNegotiator {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionNegotiator for DeviceAccessNegotiator {
    fn name(&self) -> &'static str {
        "device-access"
    }

    fn check(&self) -> BoxFuture<'_, PermissionState> {
        async move {
            self.decision
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .refusal
                .unwrap_or(PermissionState::Prompt)
        }
        .boxed()
    }

    fn request(&self) -> BoxFuture<'_, Result<PermissionState, PermissionError>> {
        async move {
            let dir = self.device_dir.clone();
            let probe = tokio::task::spawn_blocking(move || probe_nodes(&dir))
                .await
                .map_err(|e| PermissionError::RequestError(format!("probe task failed: {}", e)))?
                .map_err(|e| {
                    PermissionError::RequestError(format!(
                        "cannot read {}: {}",
                        self.device_dir.display(),
                        e
                    ))
                })?;

            let state = self.record(probe);
            info!(dir = %self.device_dir.display(), %state, "Device access probed");
            Ok(state)
        }
        .boxed()
    }

    fn report_refusal(&self) {
        let state = self.record(Probe::Refused);
        warn!(dir = %self.device_dir.display(), %state, "Camera source refused device access");
    }
}

fn probe_nodes(dir: &Path) -> io::Result<Probe> {
    let mut refused = 0usize;
    let mut nodes = 0usize;

    for entry in std::fs::read_dir(dir)?.flatten() {
        let name = entry.file_name();
        let is_video_node = name
            .to_str()
            .and_then(|name| name.strip_prefix("video"))
            .is_some_and(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()));
        if !is_video_node {
            continue;
        }

        nodes += 1;
        let path = entry.path();
        match std::fs::OpenOptions::new().read(true).write(true).open(&path) {
            Ok(_) => {
                debug!(path = %path.display(), "Video node accessible");
                return Ok(Probe::Accessible);
            }
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                debug!(path = %path.display(), "Video node refused access");
                refused += 1;
            }
            // Busy or vanished nodes are device problems, not permission problems
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Video node not openable");
            }
        }
    }

    if nodes > 0 && refused == nodes {
        Ok(Probe::Refused)
    } else {
        Ok(Probe::Accessible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("capture-surface-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_check_defaults_to_prompt() {
        let negotiator = DeviceAccessNegotiator::with_device_dir(scratch_dir());
        assert_eq!(negotiator.check().await, PermissionState::Prompt);
    }

    #[tokio::test]
    async fn test_no_nodes_is_granted_but_not_cached() {
        let dir = scratch_dir();
        std::fs::write(dir.join("null"), b"").unwrap();
        let negotiator = DeviceAccessNegotiator::with_device_dir(dir.clone());

        assert_eq!(negotiator.request().await, Ok(PermissionState::Granted));
        // The next open probes again
        assert_eq!(negotiator.check().await, PermissionState::Prompt);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_readable_node_is_granted() {
        let dir = scratch_dir();
        std::fs::write(dir.join("video0"), b"").unwrap();
        let negotiator = DeviceAccessNegotiator::with_device_dir(dir.clone());

        assert_eq!(negotiator.request().await, Ok(PermissionState::Granted));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_unreadable_dir_is_request_error() {
        let negotiator =
            DeviceAccessNegotiator::with_device_dir(PathBuf::from("/nonexistent/capture-surface"));
        assert!(matches!(
            negotiator.request().await,
            Err(PermissionError::RequestError(_))
        ));
        assert_eq!(negotiator.check().await, PermissionState::Prompt);
    }

    #[test]
    fn test_repeated_denial_becomes_blocked() {
        let negotiator = DeviceAccessNegotiator::with_device_dir(scratch_dir());
        assert_eq!(negotiator.record(Probe::Refused), PermissionState::Denied);
        assert_eq!(negotiator.record(Probe::Refused), PermissionState::Blocked);
    }

    #[tokio::test]
    async fn test_source_refusal_after_grant_is_denied_then_blocked() {
        let dir = scratch_dir();
        std::fs::write(dir.join("video0"), b"").unwrap();
        let negotiator = DeviceAccessNegotiator::with_device_dir(dir.clone());

        assert_eq!(negotiator.request().await, Ok(PermissionState::Granted));
        negotiator.report_refusal();
        assert_eq!(negotiator.check().await, PermissionState::Denied);

        // Probing still succeeds, but the earlier refusal is remembered
        assert_eq!(negotiator.request().await, Ok(PermissionState::Granted));
        negotiator.report_refusal();
        assert_eq!(negotiator.check().await, PermissionState::Blocked);
        std::fs::remove_dir_all(dir).unwrap();
    }
}

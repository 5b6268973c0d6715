// SPDX-License-Identifier: GPL-3.0-only

//! Camera permission negotiation
//!
//! Two interchangeable negotiators sit behind [`PermissionNegotiator`]:
//! - [`PortalNegotiator`] asks xdg-desktop-portal, which can both look up a
//!   stored decision and prompt the user
//! - [`DeviceAccessNegotiator`] has no introspection API; it tests whether the
//!   video device nodes can be opened and remembers denials in-process
//!
//! The negotiator is picked once, when the capture surface is built.

pub mod device_access;
pub mod portal;

pub use device_access::DeviceAccessNegotiator;
pub use portal::PortalNegotiator;

use crate::config::Config;
use crate::constants::FLATPAK_INFO_PATH;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Camera authorization state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PermissionState {
    /// Not determined yet
    #[default]
    Unknown,
    /// Access will be asked for on request
    Prompt,
    Granted,
    /// User declined; a later request may ask again
    Denied,
    /// Platform will not ask again until the user changes settings
    Blocked,
}

impl PermissionState {
    /// Whether a consent request can change this state
    pub fn is_requestable(&self) -> bool {
        matches!(
            self,
            PermissionState::Unknown | PermissionState::Prompt | PermissionState::Denied
        )
    }
}

impl std::fmt::Display for PermissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionState::Unknown => write!(f, "unknown"),
            PermissionState::Prompt => write!(f, "prompt"),
            PermissionState::Granted => write!(f, "granted"),
            PermissionState::Denied => write!(f, "denied"),
            PermissionState::Blocked => write!(f, "blocked"),
        }
    }
}

/// Errors from a permission request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionError {
    /// The platform could not show a consent prompt
    RequestError(String),
}

impl std::fmt::Display for PermissionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionError::RequestError(msg) => write!(f, "Permission request failed: {}", msg),
        }
    }
}

impl std::error::Error for PermissionError {}

/// Camera authorization negotiation
pub trait PermissionNegotiator: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Current authorization, without prompting
    fn check(&self) -> BoxFuture<'_, PermissionState>;

    /// Run the consent flow and wait for the user's answer
    fn request(&self) -> BoxFuture<'_, Result<PermissionState, PermissionError>>;

    /// The device refused access even though authorization looked granted
    fn report_refusal(&self) {}
}

/// Which negotiator to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PermissionBackendKind {
    /// Portal inside a sandbox, device access otherwise
    #[default]
    Auto,
    Portal,
    DeviceAccess,
}

/// Build the negotiator selected in the configuration
pub fn negotiator_for(config: &Config) -> Box<dyn PermissionNegotiator> {
    let kind = match config.permission_backend {
        PermissionBackendKind::Auto if Path::new(FLATPAK_INFO_PATH).exists() => {
            PermissionBackendKind::Portal
        }
        PermissionBackendKind::Auto => PermissionBackendKind::DeviceAccess,
        kind => kind,
    };

    info!(backend = ?kind, "Selecting permission negotiator");

    match kind {
        PermissionBackendKind::Portal => Box::new(PortalNegotiator::new(config.portal_app_id.clone())),
        _ => Box::new(DeviceAccessNegotiator::with_device_dir(
            config.device_dir.clone(),
        )),
    }
}

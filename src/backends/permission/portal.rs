// SPDX-License-Identifier: GPL-3.0-only

//! xdg-desktop-portal camera permission
//!
//! Stored decisions live in the portal permission store under the `devices`
//! table, `camera` id. Asking is done through `org.freedesktop.portal.Camera`,
//! whose answer arrives as a `Response` signal on a request object.

use super::{PermissionError, PermissionNegotiator, PermissionState};
use crate::constants::FLATPAK_INFO_PATH;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};

const PORTAL_DEST: &str = "org.freedesktop.portal.Desktop";
const PORTAL_PATH: &str = "/org/freedesktop/portal/desktop";
const CAMERA_IFACE: &str = "org.freedesktop.portal.Camera";
const REQUEST_IFACE: &str = "org.freedesktop.portal.Request";

const STORE_DEST: &str = "org.freedesktop.impl.portal.PermissionStore";
const STORE_PATH: &str = "/org/freedesktop/impl/portal/PermissionStore";
const STORE_NOT_FOUND: &str = "org.freedesktop.portal.Error.NotFound";

/// Portal-backed negotiator
pub struct PortalNegotiator {
    app_id: Option<String>,
}

impl PortalNegotiator {
    /// Create a negotiator
    ///
    /// Without an explicit `app_id` the sandbox's application id is used.
    pub fn new(app_id: Option<String>) -> Self {
        Self { app_id }
    }

    fn app_id(&self) -> String {
        self.app_id
            .clone()
            .or_else(|| {
                std::fs::read_to_string(FLATPAK_INFO_PATH)
                    .ok()
                    .and_then(|info| flatpak_app_id(&info))
            })
            .unwrap_or_default()
    }

    async fn lookup(&self) -> zbus::Result<PermissionState> {
        let connection = zbus::Connection::session().await?;
        let store = zbus::Proxy::new(&connection, STORE_DEST, STORE_PATH, STORE_DEST).await?;

        let app_id = self.app_id();
        let result: zbus::Result<(HashMap<String, Vec<String>>, OwnedValue)> =
            store.call("Lookup", &("devices", "camera")).await;

        match result {
            Ok((permissions, _data)) => {
                let entry = permissions
                    .get(&app_id)
                    .and_then(|values| values.first())
                    .map(String::as_str);
                debug!(app_id = %app_id, ?entry, "Portal permission store entry");
                Ok(state_from_store(entry))
            }
            // The table does not exist until some app has been asked
            Err(zbus::Error::MethodError(name, _, _)) if name.as_str() == STORE_NOT_FOUND => {
                Ok(PermissionState::Prompt)
            }
            Err(e) => Err(e),
        }
    }

    async fn access_camera(&self) -> Result<PermissionState, PermissionError> {
        let connection = zbus::Connection::session()
            .await
            .map_err(|e| request_error("connect to session bus", e))?;

        let token = format!("capture_surface_{}", uuid::Uuid::new_v4().simple());
        let sender = connection
            .unique_name()
            .map(|name| name.as_str().trim_start_matches(':').replace('.', "_"))
            .ok_or_else(|| {
                PermissionError::RequestError("session bus assigned no unique name".to_string())
            })?;
        let request_path = format!("{}/request/{}/{}", PORTAL_PATH, sender, token);

        // Subscribe before calling so a fast answer cannot be missed
        let request = zbus::Proxy::new(&connection, PORTAL_DEST, request_path.as_str(), REQUEST_IFACE)
            .await
            .map_err(|e| request_error("create request proxy", e))?;
        let mut responses = request
            .receive_signal("Response")
            .await
            .map_err(|e| request_error("subscribe to portal response", e))?;

        let camera = zbus::Proxy::new(&connection, PORTAL_DEST, PORTAL_PATH, CAMERA_IFACE)
            .await
            .map_err(|e| request_error("create camera portal proxy", e))?;

        let mut options: HashMap<&str, Value> = HashMap::new();
        options.insert("handle_token", Value::new(token.as_str()));

        info!("Requesting camera access from the desktop portal");
        let handle: OwnedObjectPath = camera
            .call("AccessCamera", &(options,))
            .await
            .map_err(|e| request_error("call AccessCamera", e))?;
        if handle.as_str() != request_path {
            warn!(expected = %request_path, got = %handle.as_str(), "Portal used an unexpected request path");
        }

        let message = responses.next().await.ok_or_else(|| {
            PermissionError::RequestError("portal closed the request without answering".to_string())
        })?;
        let (code, _results): (u32, HashMap<String, OwnedValue>) = message
            .body()
            .deserialize()
            .map_err(|e| request_error("read portal response", e))?;

        info!(code, "Camera portal answered");
        Ok(state_from_response(code))
    }
}

impl PermissionNegotiator for PortalNegotiator {
    fn name(&self) -> &'static str {
        "portal"
    }

    fn check(&self) -> BoxFuture<'_, PermissionState> {
        async move {
            match self.lookup().await {
                Ok(state) => state,
                Err(e) => {
                    warn!(error = %e, "Failed to query portal permission store");
                    PermissionState::Unknown
                }
            }
        }
        .boxed()
    }

    fn request(&self) -> BoxFuture<'_, Result<PermissionState, PermissionError>> {
        self.access_camera().boxed()
    }
}

fn request_error(context: &str, err: zbus::Error) -> PermissionError {
    PermissionError::RequestError(format!("Failed to {}: {}", context, err))
}

/// Map a permission store value to a state
fn state_from_store(entry: Option<&str>) -> PermissionState {
    match entry {
        Some("yes") => PermissionState::Granted,
        // A stored "no" means the portal answers without asking
        Some("no") => PermissionState::Blocked,
        _ => PermissionState::Prompt,
    }
}

/// Map a `Request::Response` code to a state (0 success, 1 cancelled, 2 other)
fn state_from_response(code: u32) -> PermissionState {
    if code == 0 {
        PermissionState::Granted
    } else {
        PermissionState::Denied
    }
}

/// Application id from the `[Application]` section of `.flatpak-info`
fn flatpak_app_id(info: &str) -> Option<String> {
    let mut in_application = false;
    for line in info.lines().map(str::trim) {
        if line.starts_with('[') {
            in_application = line == "[Application]";
        } else if in_application
            && let Some(name) = line.strip_prefix("name=")
        {
            return Some(name.trim().to_string());
        }
    }
    None
}

// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::{CameraBackendType, FacingMode, Resolution};
use crate::backends::permission::PermissionBackendKind;
use crate::constants::{APP_DIR_NAME, DEVICE_DIR, IDEAL_HEIGHT, IDEAL_WIDTH, LEDS_DIR};
use crate::errors::{SurfaceError, SurfaceResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Capture surface configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Camera backend to use (V4L2 or virtual)
    pub backend: CameraBackendType,
    /// How camera permission is negotiated
    pub permission_backend: PermissionBackendKind,
    /// Facing mode used when the surface first opens
    pub default_facing: FacingMode,
    /// Ideal stream width
    pub ideal_width: u32,
    /// Ideal stream height
    pub ideal_height: u32,
    /// Directory scanned for V4L2 device nodes
    pub device_dir: PathBuf,
    /// Facing mode per device path, for cameras whose name gives no hint
    pub facing_overrides: HashMap<String, FacingMode>,
    /// Application id used with the desktop portal (sandbox id if unset)
    pub portal_app_id: Option<String>,
    /// Offer torch control when flash LEDs are present
    pub torch_enabled: bool,
    /// Directory scanned for flash LEDs
    pub leds_dir: PathBuf,
    /// Torch brightness as a fraction of the LED maximum (0.0 - 1.0)
    pub torch_intensity: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: CameraBackendType::default(),
            permission_backend: PermissionBackendKind::default(),
            default_facing: FacingMode::default(),
            ideal_width: IDEAL_WIDTH,
            ideal_height: IDEAL_HEIGHT,
            device_dir: PathBuf::from(DEVICE_DIR),
            facing_overrides: HashMap::new(),
            portal_app_id: None,
            torch_enabled: true,
            leds_dir: PathBuf::from(LEDS_DIR),
            torch_intensity: 1.0,
        }
    }
}

impl Config {
    /// Default config file location (`~/.config/capture-surface/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join("config.json"))
    }

    /// Load from the default location, falling back to defaults when absent
    pub fn load() -> SurfaceResult<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            Some(path) => {
                debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Load and validate a config file
    pub fn load_from(path: &Path) -> SurfaceResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SurfaceError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&contents).map_err(|e| {
            SurfaceError::Config(format!("cannot parse {}: {}", path.display(), e))
        })?;
        config.validate()?;

        info!(path = %path.display(), backend = %config.backend, "Loaded config");
        Ok(config)
    }

    /// Write the config as pretty JSON, creating parent directories
    pub fn save_to(&self, path: &Path) -> SurfaceResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SurfaceError::Config(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| SurfaceError::Config(format!("cannot serialize config: {}", e)))?;
        std::fs::write(path, json)
            .map_err(|e| SurfaceError::Config(format!("cannot write {}: {}", path.display(), e)))
    }

    /// Reject settings the surface cannot work with
    pub fn validate(&self) -> SurfaceResult<()> {
        if self.ideal_width == 0 || self.ideal_height == 0 {
            return Err(SurfaceError::Config(format!(
                "ideal resolution must be non-zero, got {}x{}",
                self.ideal_width, self.ideal_height
            )));
        }
        if !(0.0..=1.0).contains(&self.torch_intensity) {
            return Err(SurfaceError::Config(format!(
                "torch_intensity must be within 0.0 - 1.0, got {}",
                self.torch_intensity
            )));
        }
        Ok(())
    }

    /// Ideal stream resolution
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.ideal_width, self.ideal_height)
    }
}

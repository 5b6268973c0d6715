// SPDX-License-Identifier: GPL-3.0-only

//! Hardware torch control via Linux sysfs
//!
//! Discovers flash LEDs exposed at `/sys/class/leds/*:flash` and drives them in
//! torch mode through the `brightness` file, which is group-writable by
//! `feedbackd`, avoiding the root-only `flash_strobe` interface.

use crate::backends::camera::{FacingMode, StreamHandle};
use crate::surface::{CapabilityProbe, CapabilitySet};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

/// A flash LED device discovered via sysfs
#[derive(Debug, Clone)]
pub struct FlashDevice {
    /// Sysfs path, e.g. `/sys/class/leds/white:flash`
    path: PathBuf,
    max_brightness: u32,
    /// Directory basename
    name: String,
}

impl FlashDevice {
    /// Get the device name (e.g. "white:flash")
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set raw brightness value (0 = off, max_brightness = full)
    pub fn set_brightness(&self, value: u32) -> io::Result<()> {
        let clamped = value.min(self.max_brightness);
        std::fs::write(self.path.join("brightness"), clamped.to_string())
    }

    /// Turn off the LED
    pub fn off(&self) -> io::Result<()> {
        self.set_brightness(0)
    }

    /// Turn on at a fraction of max brightness (0.0 = off, 1.0 = full)
    pub fn torch(&self, intensity: f32) -> io::Result<()> {
        let clamped = intensity.clamp(0.0, 1.0);
        let value = (clamped * self.max_brightness as f32).round() as u32;
        self.set_brightness(value)
    }
}

/// Result of hardware flash detection.
///
/// Separates "hardware exists" from "we can control it" so a helpful
/// permission message can be shown instead of silently hiding the torch.
#[derive(Debug, Default)]
pub struct FlashHardware {
    /// Devices we can actually control (writable)
    pub devices: Vec<FlashDevice>,
    /// User-facing error if hardware was found but not writable
    pub permission_error: Option<String>,
}

impl FlashHardware {
    /// Scan `leds_dir` for `*:flash` entries
    pub fn detect_in(leds_dir: &Path) -> FlashHardware {
        let Ok(entries) = std::fs::read_dir(leds_dir) else {
            debug!(dir = %leds_dir.display(), "Cannot read LED directory, no torch");
            return FlashHardware::default();
        };

        let mut devices = Vec::new();
        let mut permission_failures: Vec<PathBuf> = Vec::new();

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name_str) = name.to_str() else {
                continue;
            };

            // Match entries like "white:flash", "yellow:flash"
            if !name_str.ends_with(":flash") {
                continue;
            }

            let led_path = entry.path();
            let brightness_path = led_path.join("brightness");
            let max_brightness_path = led_path.join("max_brightness");

            let max_brightness = match std::fs::read_to_string(&max_brightness_path) {
                Ok(s) => match s.trim().parse::<u32>() {
                    Ok(v) if v > 0 => v,
                    _ => {
                        warn!(
                            path = %max_brightness_path.display(),
                            "Invalid max_brightness value"
                        );
                        continue;
                    }
                },
                Err(e) => {
                    warn!(
                        path = %max_brightness_path.display(),
                        error = %e,
                        "Cannot read max_brightness"
                    );
                    continue;
                }
            };

            match std::fs::OpenOptions::new()
                .write(true)
                .open(&brightness_path)
            {
                Ok(_) => {
                    info!(name = name_str, max_brightness, "Discovered flash LED");
                    devices.push(FlashDevice {
                        path: led_path,
                        max_brightness,
                        name: name_str.to_string(),
                    });
                }
                Err(_) => {
                    warn!(
                        path = %brightness_path.display(),
                        "Flash LED found but not writable"
                    );
                    permission_failures.push(brightness_path);
                }
            }
        }

        // Deterministic ordering (white before yellow)
        devices.sort_by(|a, b| a.name.cmp(&b.name));

        let permission_error = if !permission_failures.is_empty() && devices.is_empty() {
            Some(build_permission_error(&permission_failures))
        } else {
            None
        };

        FlashHardware {
            devices,
            permission_error,
        }
    }

    /// Whether any controllable flash devices were found
    pub fn has_devices(&self) -> bool {
        !self.devices.is_empty()
    }
}

/// Build a user-friendly permission error message.
///
/// Detects the current username, the required group from file ownership, and
/// whether `doas` or `sudo` is available.
fn build_permission_error(failures: &[PathBuf]) -> String {
    let username = std::env::var("USER").unwrap_or_else(|_| "user".to_string());

    let escalation_tool = if Path::new("/usr/bin/doas").exists() {
        "doas"
    } else {
        "sudo"
    };

    let group = failures
        .first()
        .and_then(|path| {
            let gid = std::fs::metadata(path).ok()?.gid();
            let group_contents = std::fs::read_to_string("/etc/group").ok()?;
            group_contents.lines().find_map(|line| {
                let parts: Vec<&str> = line.split(':').collect();
                (parts.len() >= 3 && parts[2].parse::<u32>().ok() == Some(gid))
                    .then(|| parts[0].to_string())
            })
        })
        .unwrap_or_else(|| "feedbackd".to_string());

    format!(
        "Flash LEDs detected but cannot be controlled. \
         Run: {escalation_tool} adduser {username} {group}, then log out and back in."
    )
}

/// Turn on all devices at `intensity`; true if at least one LED lit
pub fn all_on(devices: &[FlashDevice], intensity: f32) -> bool {
    let mut lit = false;
    for dev in devices {
        match dev.torch(intensity) {
            Ok(()) => lit = true,
            Err(e) => warn!(device = %dev.name, error = %e, "Failed to turn on flash LED"),
        }
    }
    lit
}

/// Turn off all devices; true if every LED went off
pub fn all_off(devices: &[FlashDevice]) -> bool {
    let mut all_ok = true;
    for dev in devices {
        if let Err(e) = dev.off() {
            warn!(device = %dev.name, error = %e, "Failed to turn off flash LED");
            all_ok = false;
        }
    }
    all_ok
}

/// Torch capability backed by sysfs flash LEDs
///
/// Phone flash LEDs sit next to the rear sensor, so the torch is only offered
/// for environment-facing streams. LEDs are re-detected on every probe.
pub struct FlashProbe {
    leds_dir: PathBuf,
    intensity: f32,
    devices: Mutex<Vec<FlashDevice>>,
}

impl FlashProbe {
    /// Probe for LEDs under `leds_dir`, lighting them at `intensity` (0.0 - 1.0)
    pub fn new(leds_dir: PathBuf, intensity: f32) -> Self {
        Self {
            leds_dir,
            intensity: intensity.clamp(0.0, 1.0),
            devices: Mutex::new(Vec::new()),
        }
    }

    fn devices(&self) -> Vec<FlashDevice> {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CapabilityProbe for FlashProbe {
    fn probe(&self, handle: &StreamHandle) -> CapabilitySet {
        let hardware = if handle.facing_mode() == FacingMode::Environment {
            FlashHardware::detect_in(&self.leds_dir)
        } else {
            FlashHardware::default()
        };

        if let Some(message) = &hardware.permission_error {
            warn!(message = %message, "Torch unavailable");
        }

        let has_torch = hardware.has_devices();
        *self.devices.lock().unwrap_or_else(PoisonError::into_inner) = hardware.devices;

        debug!(stream = %handle.id(), has_torch, "Probed torch capability");
        CapabilitySet {
            has_torch,
            torch_enabled: false,
        }
    }

    fn set_torch(
        &self,
        handle: &StreamHandle,
        current: CapabilitySet,
        enabled: bool,
    ) -> CapabilitySet {
        if !current.has_torch {
            return current;
        }

        let devices = self.devices();
        let applied = if enabled {
            all_on(&devices, self.intensity)
        } else {
            all_off(&devices)
        };

        if !applied {
            warn!(stream = %handle.id(), enabled, "Torch change did not apply");
            return current;
        }

        info!(stream = %handle.id(), enabled, "Torch toggled");
        CapabilitySet {
            torch_enabled: enabled,
            ..current
        }
    }

    fn shutdown(&self, handle: &StreamHandle) {
        let devices = self.devices();
        if !devices.is_empty() {
            debug!(stream = %handle.id(), "Turning torch off before release");
            all_off(&devices);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::{CameraDevice, Resolution};

    fn led_dir(leds: &[&str]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("capture-surface-leds-{}", uuid::Uuid::new_v4()));
        for led in leds {
            let led_path = dir.join(led);
            std::fs::create_dir_all(&led_path).unwrap();
            std::fs::write(led_path.join("max_brightness"), "255\n").unwrap();
            std::fs::write(led_path.join("brightness"), "0\n").unwrap();
        }
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn handle(facing: FacingMode) -> StreamHandle {
        let device = CameraDevice {
            name: "test".to_string(),
            path: "test:0".to_string(),
            facing,
            driver: None,
        };
        StreamHandle::new(device, facing, Resolution::default())
    }

    fn brightness(dir: &Path, led: &str) -> String {
        std::fs::read_to_string(dir.join(led).join("brightness"))
            .unwrap()
            .trim()
            .to_string()
    }

    #[test]
    fn test_detect_only_flash_leds() {
        let dir = led_dir(&["white:flash", "input3::capslock"]);
        let hardware = FlashHardware::detect_in(&dir);
        assert_eq!(hardware.devices.len(), 1);
        assert_eq!(hardware.devices[0].name(), "white:flash");
        assert!(hardware.permission_error.is_none());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_torch_toggles_brightness() {
        let dir = led_dir(&["white:flash"]);
        let probe = FlashProbe::new(dir.clone(), 0.5);
        let handle = handle(FacingMode::Environment);

        let caps = probe.probe(&handle);
        assert!(caps.has_torch);
        assert!(!caps.torch_enabled);

        let caps = probe.set_torch(&handle, caps, true);
        assert!(caps.torch_enabled);
        assert_eq!(brightness(&dir, "white:flash"), "128");

        probe.shutdown(&handle);
        assert_eq!(brightness(&dir, "white:flash"), "0");
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_user_facing_stream_has_no_torch() {
        let dir = led_dir(&["white:flash"]);
        let probe = FlashProbe::new(dir.clone(), 1.0);
        let handle = handle(FacingMode::User);

        let caps = probe.probe(&handle);
        assert_eq!(caps, CapabilitySet::default());
        assert_eq!(probe.set_torch(&handle, caps, true), caps);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_missing_led_dir_is_not_an_error() {
        let hardware = FlashHardware::detect_in(Path::new("/nonexistent/leds"));
        assert!(!hardware.has_devices());
        assert!(hardware.permission_error.is_none());
    }
}

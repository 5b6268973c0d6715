// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camera operations
//!
//! This module provides command-line functionality for:
//! - Listing available cameras
//! - Taking photos through the capture surface

use capture_surface::backends::camera::FacingMode;
use capture_surface::constants::APP_DIR_NAME;
use capture_surface::{CaptureOutcome, CaptureSurfaceController, Config};
use std::path::{Path, PathBuf};

/// List all available cameras
pub fn list_cameras(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let surface = CaptureSurfaceController::from_config(config)?;
    let cameras = surface.streams().enumerate_cameras();

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras ({}):", surface.streams().backend_type());
    println!();
    for (index, camera) in cameras.iter().enumerate() {
        println!("  [{}] {}", index, camera.name);
        println!("      Path:   {}", camera.path);
        println!("      Facing: {}", camera.facing);
        if let Some(driver) = &camera.driver {
            println!("      Driver: {}", driver);
        }
        println!();
    }

    Ok(())
}

/// Open the surface, capture one photo, write it and close again
pub fn take_photo(
    config: &Config,
    facing: Option<FacingMode>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = config.clone();
    if let Some(facing) = facing {
        config.default_facing = facing;
    }

    let surface = CaptureSurfaceController::from_config(&config)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let outcome = runtime.block_on(async {
        let opened = surface.open().await;
        let outcome = match opened {
            Ok(_) => surface.trigger_capture().await,
            Err(e) => Err(e),
        };
        surface.close().await;
        outcome
    });

    let photo = match outcome {
        Ok(CaptureOutcome::Captured(photo)) => photo,
        Ok(other) => return Err(format!("No photo captured ({:?})", other).into()),
        Err(e) => {
            eprintln!("{}", e.remediation());
            return Err(e.into());
        }
    };

    let path = output_path(output.as_deref(), &photo.file_name());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, &photo.image_data)?;

    println!(
        "Photo saved: {} ({}x{})",
        path.display(),
        photo.width,
        photo.height
    );
    Ok(())
}

/// Resolve where a photo goes
///
/// A directory gets the generated file name; a file path is used as is.
fn output_path(output: Option<&Path>, file_name: &str) -> PathBuf {
    match output {
        Some(path) if path.is_dir() => path.join(file_name),
        Some(path) => path.to_path_buf(),
        None => get_default_photo_dir().join(file_name),
    }
}

/// Get default photo directory
pub fn get_default_photo_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(APP_DIR_NAME)
}

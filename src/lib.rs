// SPDX-License-Identifier: MPL-2.0

//! Capture Surface - live camera capture for embedding applications
//!
//! This library negotiates camera permission, owns the lifecycle of the one
//! camera stream a surface may hold, probes it for a torch, and freezes a
//! single frame into an encoded still image on request.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`surface`]: The capture surface state machine and its observable state
//! - [`backends`]: Camera sources and permission negotiators
//! - [`pipelines`]: Still capture (frame rendering and encoding)
//! - [`flash`]: Torch control through sysfs flash LEDs
//! - [`config`]: User configuration handling
//! - [`terminal`]: Terminal status viewer driving a surface
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> Result<(), capture_surface::SurfaceError> {
//! use capture_surface::{CaptureOutcome, CaptureSurfaceController, Config};
//!
//! let surface = CaptureSurfaceController::from_config(&Config::load()?)?;
//! surface.open().await?;
//! if let CaptureOutcome::Captured(photo) = surface.trigger_capture().await? {
//!     println!("{}x{}, {} bytes", photo.width, photo.height, photo.image_data.len());
//! }
//! surface.close().await;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod flash;
pub mod pipelines;
pub mod surface;
pub mod terminal;

// Re-export commonly used types
pub use backends::camera::{FacingMode, Resolution, StreamHandle, StreamManager};
pub use backends::permission::{PermissionNegotiator, PermissionState};
pub use config::Config;
pub use errors::{PhotoError, SurfaceError, SurfaceResult};
pub use pipelines::photo::CaptureResult;
pub use surface::{
    CapabilityProbe, CapabilitySet, CaptureOutcome, CaptureSurfaceController, CaptureSurfaceState,
    SurfacePhase,
};

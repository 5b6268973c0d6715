// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer for camera access
//!
//! This module provides platform-specific implementations for:
//! - Camera streams via V4L2 (or a synthetic source)
//! - Camera permission negotiation via the desktop portal or device node access
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               Capture Surface               │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │               Backend Layer                 │
//! │  ┌──────────────┐    ┌──────────────────┐   │
//! │  │  Permission  │    │      Camera      │   │
//! │  │ (Portal/dev) │    │ (V4L2/virtual)   │   │
//! │  └──────────────┘    └──────────────────┘   │
//! └─────────────────────────────────────────────┘
//! ```

pub mod camera;
pub mod permission;

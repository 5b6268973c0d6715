// SPDX-License-Identifier: MPL-2.0

//! Processing pipelines for still capture
//!
//! Heavy work (pixel conversion, encoding) runs on blocking threads so the
//! surface keeps reacting to signals while a capture is in flight.
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌───────────────┐
//! │ Camera Frame │ ──▶ │  Photo Pipeline   │ ──▶ │ CaptureResult │
//! │ (YUYV/MJPEG) │     │  - → RGB surface  │     │  (JPEG bytes) │
//! │              │     │  - Encoding       │     │               │
//! └──────────────┘     └───────────────────┘     └───────────────┘
//! ```

pub mod photo;

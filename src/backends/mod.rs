// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for camera capture
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                Session Layer                │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │               Backend Layer                 │
//! │  ┌──────────────────┐  ┌─────────────────┐  │
//! │  │  Camera (trait,  │  │ Virtual Camera  │  │
//! │  │    registry)     │  │  (in-process)   │  │
//! │  └──────────────────┘  └─────────────────┘  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: Backend trait, device types and the device registry
//! - [`virtual_camera`]: Simulated backend used by the CLI and tests

pub mod camera;
pub mod virtual_camera;

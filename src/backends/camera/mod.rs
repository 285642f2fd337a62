// SPDX-License-Identifier: GPL-3.0-only

//! Camera backend abstraction
//!
//! Each platform provides one [`PlatformCameraBackend`]. The backend is chosen
//! once at startup and injected into the [`DeviceRegistry`] and every
//! [`CaptureSession`](crate::session::CaptureSession); nothing in the core
//! branches on which implementation it was given.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │   UI Layer (App)    │
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐     ┌────────────────┐
//! │   CaptureSession    │◀────│ DeviceRegistry │  ← snapshots of devices
//! └──────────┬──────────┘     └───────┬────────┘
//!            │                        │
//!            ▼                        ▼
//! ┌──────────────────────────────────────────┐
//! │        PlatformCameraBackend trait       │  ← Common interface
//! └──────────────────────┬───────────────────┘
//!                        │
//!                        ▼
//!            ┌───────────────────────┐
//!            │ Virtual / OS backends │  ← Concrete implementations
//!            └───────────────────────┘
//! ```
//!
//! # Completion contract
//!
//! Requests whose outcome arrives later take a [`Completer`]. A backend must
//! resolve every completer it accepts exactly once, from any thread, even if
//! the handle is closed first (resolve with an error in that case). Extra
//! resolutions are ignored.

pub mod registry;
pub mod types;

pub use registry::DeviceRegistry;
pub use types::*;

use crate::config::Config;
use crate::flash::FlashMode;
use crate::session::bridge::Completer;
use std::path::Path;
use std::sync::Arc;

/// Native camera driver for one platform
pub trait PlatformCameraBackend: Send + Sync {
    // ===== Metadata =====

    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    // ===== Enumeration =====

    /// List the devices currently present
    ///
    /// May block (subprocesses, IPC); callers run it off the async executor.
    fn enumerate_devices(&self) -> BackendResult<Vec<DeviceDescriptor>>;

    // ===== Lifecycle =====

    /// Acquire a native binding for `device`
    ///
    /// The returned handle is not usable until `ready` resolves with `Ok`.
    fn open(
        &self,
        device: &DeviceDescriptor,
        ready: Completer<BackendResult<()>>,
    ) -> BackendResult<BackendHandle>;

    /// Release a native binding, aborting anything still running on it
    fn close(&self, handle: BackendHandle);

    // ===== Preview =====

    fn bind_preview(&self, handle: &BackendHandle, surface: &PreviewSurface) -> BackendResult<()>;

    fn unbind_preview(&self, handle: &BackendHandle) -> BackendResult<()>;

    // ===== Capture: Photo =====

    /// Take one still; `done` receives the encoded image bytes
    fn capture_photo(&self, handle: &BackendHandle, done: Completer<BackendResult<Vec<u8>>>);

    // ===== Capture: Video =====

    /// Begin recording into `destination`
    ///
    /// `events.started` acknowledges the start; `events.finalized` fires once
    /// the artifact at `destination` is complete or the recording failed.
    fn start_recording(
        &self,
        handle: &BackendHandle,
        destination: &Path,
        events: RecordingEvents,
    ) -> BackendResult<()>;

    /// Ask the active recording to finish; completion arrives via `finalized`
    fn stop_recording(&self, handle: &BackendHandle) -> BackendResult<()>;

    // ===== Controls =====

    fn set_zoom(&self, handle: &BackendHandle, level: f32) -> BackendResult<()>;

    fn set_flash(&self, handle: &BackendHandle, mode: FlashMode) -> BackendResult<()>;

    /// Select the capture resolution; `applied` fires once the stream uses it
    fn set_resolution_filter(
        &self,
        handle: &BackendHandle,
        resolution: Resolution,
        applied: Completer<BackendResult<()>>,
    );
}

/// Get the backend for this build
///
/// OS drivers live outside this crate and are injected the same way; the
/// in-process virtual backend is the built-in one.
pub fn get_backend(config: &Config) -> Arc<dyn PlatformCameraBackend> {
    Arc::new(crate::backends::virtual_camera::VirtualCameraBackend::new(
        config.virtual_devices.clone(),
    ))
}

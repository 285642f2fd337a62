// SPDX-License-Identifier: GPL-3.0-only

//! Camera Session - capture session state machine over pluggable camera backends
//!
//! This library owns the lifecycle of one camera at a time: discovery,
//! connect, preview binding, still capture, recording and teardown. Native
//! drivers plug in behind a single trait and report completions through
//! callbacks; the session turns those into awaitable, cancellable operations.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Backend trait, device registry and the virtual backend
//! - [`session`]: The capture session state machine and callback bridge
//! - [`storage`]: Temporary recording files and sink delivery
//! - [`config`]: User configuration handling
//! - [`errors`]: Session error taxonomy
//!
//! # Example
//!
//! ```ignore
//! let config = Config::load();
//! let backend = get_backend(&config);
//! let registry = DeviceRegistry::new(backend.clone());
//! let session = CaptureSession::new(backend, registry, &config);
//!
//! let token = CancellationToken::new();
//! session.connect(None, &token).await?;
//! let photo = session.take_picture(&token).await?;
//! session.disconnect().await;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod flash;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use backends::camera::{
    DeviceDescriptor, DeviceRegistry, PlatformCameraBackend, Resolution, get_backend,
};
pub use config::Config;
pub use errors::{SessionError, SessionResult};
pub use flash::FlashMode;
pub use session::{CaptureSession, Operation, SessionEvent, SessionState};

// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use crate::session::bridge::Completer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;

/// Which way a camera points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    Front,
    Back,
    /// USB webcams and anything else without a fixed mounting
    #[default]
    External,
}

impl std::fmt::Display for Facing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Facing::Front => write!(f, "front"),
            Facing::Back => write!(f, "back"),
            Facing::External => write!(f, "external"),
        }
    }
}

/// Capture resolution in pixels
///
/// Compared exactly. Ordered by width, then height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Create a resolution, rejecting zero dimensions
    pub fn new(width: u32, height: u32) -> Result<Self, DescriptorError> {
        if width == 0 || height == 0 {
            return Err(DescriptorError::InvalidResolution { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = DescriptorError;

    /// Parse `"1920x1080"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || DescriptorError::Malformed(s.to_string());
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(malformed)?;
        let width = w.trim().parse::<u32>().map_err(|_| malformed())?;
        let height = h.trim().parse::<u32>().map_err(|_| malformed())?;
        Resolution::new(width, height)
    }
}

/// Supported zoom ratios for a device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomRange {
    pub min: f32,
    pub max: f32,
}

impl ZoomRange {
    pub fn new(min: f32, max: f32) -> Result<Self, DescriptorError> {
        if !min.is_finite() || !max.is_finite() || min < 0.0 || min > max {
            return Err(DescriptorError::InvalidZoomRange { min, max });
        }
        Ok(Self { min, max })
    }

    /// Fixed-focal-length devices
    pub fn fixed() -> Self {
        Self { min: 1.0, max: 1.0 }
    }

    /// Map a requested zoom level into this range (NaN maps to `min`)
    pub fn clamp(&self, level: f32) -> f32 {
        if level.is_nan() {
            return self.min;
        }
        level.clamp(self.min, self.max)
    }
}

impl Default for ZoomRange {
    fn default() -> Self {
        Self::fixed()
    }
}

/// Validation failures when building descriptors
#[derive(Debug, Clone, PartialEq)]
pub enum DescriptorError {
    /// Device id must not be empty
    EmptyId,
    InvalidZoomRange { min: f32, max: f32 },
    InvalidResolution { width: u32, height: u32 },
    /// Unparseable text (e.g. a resolution string)
    Malformed(String),
}

impl std::fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DescriptorError::EmptyId => write!(f, "Device id is empty"),
            DescriptorError::InvalidZoomRange { min, max } => {
                write!(f, "Invalid zoom range {}..{}", min, max)
            }
            DescriptorError::InvalidResolution { width, height } => {
                write!(f, "Invalid resolution {}x{}", width, height)
            }
            DescriptorError::Malformed(s) => write!(f, "Malformed value: {:?}", s),
        }
    }
}

impl std::error::Error for DescriptorError {}

/// Immutable description of one physical camera
///
/// Equality is structural: every field must match, and the resolution set is
/// compared without regard to the order it was reported in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DescriptorFields", into = "DescriptorFields")]
pub struct DeviceDescriptor {
    id: String,
    name: String,
    facing: Facing,
    flash_supported: bool,
    zoom: ZoomRange,
    resolutions: BTreeSet<Resolution>,
}

impl DeviceDescriptor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        facing: Facing,
        flash_supported: bool,
        zoom: ZoomRange,
        resolutions: impl IntoIterator<Item = Resolution>,
    ) -> Result<Self, DescriptorError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DescriptorError::EmptyId);
        }
        // Re-validate in case the caller built the values by hand
        let zoom = ZoomRange::new(zoom.min, zoom.max)?;
        let resolutions = resolutions
            .into_iter()
            .map(|r| Resolution::new(r.width, r.height))
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(Self {
            id,
            name: name.into(),
            facing,
            flash_supported,
            zoom,
            resolutions,
        })
    }

    /// Opaque backend identity
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    pub fn flash_supported(&self) -> bool {
        self.flash_supported
    }

    pub fn zoom_range(&self) -> ZoomRange {
        self.zoom
    }

    /// Supported resolutions in ascending order
    pub fn resolutions(&self) -> impl Iterator<Item = &Resolution> {
        self.resolutions.iter()
    }

    pub fn supports_resolution(&self, resolution: &Resolution) -> bool {
        self.resolutions.contains(resolution)
    }

    /// Largest supported resolution by pixel count
    pub fn max_resolution(&self) -> Option<Resolution> {
        self.resolutions.iter().copied().max_by_key(|r| r.pixel_count())
    }
}

impl std::fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.facing, self.id)
    }
}

/// Serialized form of [`DeviceDescriptor`], validated on the way in
#[derive(Serialize, Deserialize)]
struct DescriptorFields {
    id: String,
    name: String,
    #[serde(default)]
    facing: Facing,
    #[serde(default)]
    flash_supported: bool,
    #[serde(default)]
    zoom: ZoomRange,
    #[serde(default)]
    resolutions: Vec<Resolution>,
}

impl TryFrom<DescriptorFields> for DeviceDescriptor {
    type Error = DescriptorError;

    fn try_from(fields: DescriptorFields) -> Result<Self, Self::Error> {
        DeviceDescriptor::new(
            fields.id,
            fields.name,
            fields.facing,
            fields.flash_supported,
            fields.zoom,
            fields.resolutions,
        )
    }
}

impl From<DeviceDescriptor> for DescriptorFields {
    fn from(device: DeviceDescriptor) -> Self {
        Self {
            id: device.id,
            name: device.name,
            facing: device.facing,
            flash_supported: device.flash_supported,
            zoom: device.zoom,
            resolutions: device.resolutions.into_iter().collect(),
        }
    }
}

/// Opaque native binding to an open device
///
/// Minted by the backend in `open` and handed back in `close`. Deliberately
/// not `Clone`: whoever holds it owns the native session.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct BackendHandle {
    id: u64,
    device_id: String,
}

impl BackendHandle {
    /// Called by backend implementations only
    pub fn new(id: u64, device_id: impl Into<String>) -> Self {
        Self {
            id,
            device_id: device_id.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

/// Handle to the UI-owned surface a preview is rendered into
///
/// The session never looks inside; it only passes it to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewSurface {
    id: u64,
}

impl PreviewSurface {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Completion signals for one recording
pub struct RecordingEvents {
    /// Backend acknowledged that recording has begun
    pub started: Completer<BackendResult<()>>,
    /// Artifact at the destination is complete (or the recording failed)
    pub finalized: Completer<BackendResult<PathBuf>>,
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Backend is not available on this system
    NotAvailable(String),
    /// Failed to open or configure the device
    InitializationFailed(String),
    /// Camera device not found
    DeviceNotFound(String),
    /// Handle does not belong to this backend or was already closed
    InvalidHandle(u64),
    /// Device reported by the platform failed validation
    InvalidDescriptor(String),
    /// Backend crashed or became unresponsive
    Crashed(String),
    /// A completion signal did not arrive in time
    Timeout(String),
    /// The backend dropped a completion without ever resolving it
    Abandoned(String),
    /// Recording already in progress
    RecordingInProgress,
    /// No recording in progress
    NoRecordingInProgress,
    /// General I/O error
    IoError(String),
    /// Other errors
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::NotAvailable(msg) => write!(f, "Backend not available: {}", msg),
            BackendError::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::InvalidHandle(id) => write!(f, "Invalid backend handle #{}", id),
            BackendError::InvalidDescriptor(msg) => write!(f, "Invalid device descriptor: {}", msg),
            BackendError::Crashed(msg) => write!(f, "Backend crashed: {}", msg),
            BackendError::Timeout(msg) => write!(f, "Timed out waiting for {}", msg),
            BackendError::Abandoned(msg) => write!(f, "Backend abandoned {}", msg),
            BackendError::RecordingInProgress => write!(f, "Recording already in progress"),
            BackendError::NoRecordingInProgress => write!(f, "No recording in progress"),
            BackendError::IoError(msg) => write!(f, "I/O error: {}", msg),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::IoError(err.to_string())
    }
}

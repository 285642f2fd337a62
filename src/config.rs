// SPDX-License-Identifier: GPL-3.0-only

//! User configuration
//!
//! Stored as JSON in the platform config directory:
//! - Linux: `~/.config/camera-session/config.json`
//! - macOS: `~/Library/Application Support/camera-session/config.json`
//! - Windows: `%APPDATA%\camera-session\config.json`

use crate::backends::camera::types::{DeviceDescriptor, Facing, Resolution, ZoomRange};
use crate::constants::{self, app_info};
use crate::flash::FlashMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory for temporary recording files (None = OS temp dir)
    pub temp_dir: Option<PathBuf>,
    /// Wait for ready / capture / ack / reconfigure completions
    pub operation_timeout_ms: u64,
    /// Wait for a recording to finalize after stop
    pub finalize_timeout_ms: u64,
    /// Flash mode applied on connect
    pub default_flash_mode: FlashMode,
    /// Resolution requested after connect when the device supports it
    pub preferred_resolution: Option<Resolution>,
    /// Last connected device id
    pub last_device_id: Option<String>,
    /// Devices exposed by the virtual backend
    pub virtual_devices: Vec<DeviceDescriptor>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            temp_dir: None,
            operation_timeout_ms: constants::DEFAULT_OPERATION_TIMEOUT.as_millis() as u64,
            finalize_timeout_ms: constants::DEFAULT_FINALIZE_TIMEOUT.as_millis() as u64,
            default_flash_mode: FlashMode::default(),
            preferred_resolution: None,
            last_device_id: None,
            virtual_devices: default_virtual_devices(),
        }
    }
}

impl Config {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn finalize_timeout(&self) -> Duration {
        Duration::from_millis(self.finalize_timeout_ms)
    }

    /// Directory temporary recordings are allocated in
    pub fn recording_temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Path of the config file, if the platform has a config directory
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| {
            dir.join(app_info::CONFIG_DIR_NAME)
                .join(app_info::CONFIG_FILE_NAME)
        })
    }

    /// Load from the platform config file, falling back to defaults
    pub fn load() -> Self {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => {
                warn!("No platform config directory, using defaults");
                Self::default()
            }
        }
    }

    /// Load from `path`; a missing or unreadable file yields defaults
    pub fn load_from(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Self::default();
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Failed to read config, using defaults");
                return Self::default();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(config) => {
                info!(path = %path.display(), "Loaded config");
                config
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Invalid config, using defaults");
                Self::default()
            }
        }
    }

    /// Save to the platform config file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::path().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config directory",
            )
        })?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)?;
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }
}

/// A front and a back camera, like a typical phone
fn default_virtual_devices() -> Vec<DeviceDescriptor> {
    let resolutions = |list: &[(u32, u32)]| {
        list.iter()
            .map(|&(width, height)| Resolution { width, height })
            .collect::<Vec<_>>()
    };

    let front = DeviceDescriptor::new(
        "virtual:0",
        "Virtual Front Camera",
        Facing::Front,
        false,
        ZoomRange::fixed(),
        resolutions(&[(640, 480), (1280, 720)]),
    );
    let back = DeviceDescriptor::new(
        "virtual:1",
        "Virtual Back Camera",
        Facing::Back,
        true,
        ZoomRange { min: 1.0, max: 8.0 },
        resolutions(&[(640, 480), (1280, 720), (1920, 1080)]),
    );

    // Both are statically valid
    [front, back].into_iter().filter_map(Result::ok).collect()
}

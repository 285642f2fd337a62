// SPDX-License-Identifier: GPL-3.0-only

//! Flash mode requested from the camera backend

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Flash operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashMode {
    /// Flash LED is off
    #[default]
    Off,
    /// Flash fires during photo capture
    On,
    /// Backend decides per shot from scene brightness
    Auto,
    /// Torch / flashlight mode (LED stays on continuously)
    Torch,
}

impl FlashMode {
    pub const ALL: [FlashMode; 4] = [
        FlashMode::Off,
        FlashMode::On,
        FlashMode::Auto,
        FlashMode::Torch,
    ];

    /// Whether this mode lights the LED at some point
    pub fn uses_led(self) -> bool {
        !matches!(self, FlashMode::Off)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlashMode::Off => "off",
            FlashMode::On => "on",
            FlashMode::Auto => "auto",
            FlashMode::Torch => "torch",
        }
    }
}

impl std::fmt::Display for FlashMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlashMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FlashMode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown flash mode: {}", s))
    }
}

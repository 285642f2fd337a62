// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Default wait for a backend completion (ready, capture, ack, reconfigure)
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait for a recording to finalize after stop
///
/// Longer than the operation timeout: muxers flush their whole buffer here.
pub const DEFAULT_FINALIZE_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of the session and registry broadcast channels
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Temporary recording file naming
pub mod temp {
    /// Prefix of every temporary recording file
    pub const RECORDING_PREFIX: &str = "camera-session-rec";

    /// Extension of temporary recording files (container is backend-defined)
    pub const RECORDING_EXTENSION: &str = "part";

    /// Timestamp format used in temporary file names
    pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S%.3f";
}

/// Output file naming for the CLI
pub mod output {
    pub const PHOTO_PREFIX: &str = "IMG";
    pub const PHOTO_EXTENSION: &str = "jpg";
    pub const VIDEO_PREFIX: &str = "VID";
    pub const VIDEO_EXTENSION: &str = "bin";
    pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
    /// Subdirectory created under the user's Pictures/Videos folder
    pub const APP_SUBDIR: &str = "camera";
}

/// Virtual backend timing and defaults
pub mod virtual_camera {
    use std::time::Duration;

    /// Simulated time for a device to report ready after open
    pub const OPEN_LATENCY: Duration = Duration::from_millis(50);

    /// Simulated exposure + encode time for a still
    pub const CAPTURE_LATENCY: Duration = Duration::from_millis(80);

    /// Simulated time to reconfigure the stream resolution
    pub const RECONFIGURE_LATENCY: Duration = Duration::from_millis(30);

    /// Interval between synthetic recording chunks
    pub const FRAME_INTERVAL: Duration = Duration::from_millis(33);

    /// Bytes written per synthetic recording chunk
    pub const CHUNK_SIZE: usize = 4096;

    /// Stills are rendered at most this wide to keep them cheap
    pub const MAX_PHOTO_WIDTH: u32 = 1280;

    /// JPEG quality of rendered stills
    pub const JPEG_QUALITY: u8 = 85;
}

/// Application identity
pub mod app_info {
    /// Directory name under the platform config dir
    pub const CONFIG_DIR_NAME: &str = "camera-session";

    /// Config file name
    pub const CONFIG_FILE_NAME: &str = "config.json";

    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}

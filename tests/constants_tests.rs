// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use camera_session::constants::{self, output, temp, virtual_camera};

#[test]
fn test_timeouts_ordering() {
    // Finalizing a recording can take longer than any single operation
    assert!(constants::DEFAULT_FINALIZE_TIMEOUT > constants::DEFAULT_OPERATION_TIMEOUT);
}

#[test]
fn test_virtual_latencies_fit_in_timeout() {
    for latency in [
        virtual_camera::OPEN_LATENCY,
        virtual_camera::CAPTURE_LATENCY,
        virtual_camera::RECONFIGURE_LATENCY,
    ] {
        assert!(
            latency < constants::DEFAULT_OPERATION_TIMEOUT,
            "Simulated latency should never trip the operation timeout"
        );
    }
}

#[test]
fn test_temp_and_output_names_differ() {
    // Temporary artifacts must never be mistaken for delivered files
    assert_ne!(temp::RECORDING_EXTENSION, output::VIDEO_EXTENSION);
    assert_ne!(temp::RECORDING_PREFIX, output::VIDEO_PREFIX);
}

#[test]
fn test_version_is_set() {
    assert!(!constants::app_info::version().is_empty());
}

// SPDX-License-Identifier: GPL-3.0-only

//! Session states, operation names and the events a session publishes

use crate::errors::SessionError;
use std::fmt;

/// Lifecycle state of a [`CaptureSession`](super::CaptureSession)
///
/// ```text
/// Idle ──connect──▶ Connecting ──ready──▶ PreviewActive ◀──┐
///   ▲                                        │    │         │
///   │                                  take_picture  start_recording
///   │                                        ▼    ▼         │
///   └──────── disconnect (any) ────── Capturing  Recording ─┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    PreviewActive,
    Capturing,
    Recording,
}

impl SessionState {
    /// States in which the session owns a backend handle
    pub fn has_handle(&self) -> bool {
        matches!(
            self,
            SessionState::PreviewActive | SessionState::Capturing | SessionState::Recording
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::PreviewActive => "preview active",
            SessionState::Capturing => "capturing",
            SessionState::Recording => "recording",
        };
        f.write_str(name)
    }
}

/// Session operations, used in errors and events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    StartPreview,
    StopPreview,
    TakePicture,
    StartRecording,
    StopRecording,
    UpdateCaptureResolution,
    RefreshDevices,
    /// An active recording; holds the session from start until stop
    Recording,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Connect => "connect",
            Operation::StartPreview => "start preview",
            Operation::StopPreview => "stop preview",
            Operation::TakePicture => "take picture",
            Operation::StartRecording => "start recording",
            Operation::StopRecording => "stop recording",
            Operation::UpdateCaptureResolution => "update capture resolution",
            Operation::RefreshDevices => "refresh devices",
            Operation::Recording => "recording",
        };
        f.write_str(name)
    }
}

/// Notifications published to the UI layer
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    OperationFailed {
        operation: Operation,
        error: SessionError,
    },
}

// SPDX-License-Identifier: GPL-3.0-only

//! Error types for capture session operations

use crate::backends::camera::types::{BackendError, DescriptorError};
use crate::session::{Operation, SessionState};
use std::fmt;

/// Result type alias using SessionError
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors surfaced by [`CaptureSession`](crate::session::CaptureSession) and
/// [`DeviceRegistry`](crate::backends::camera::DeviceRegistry)
///
/// All variants are recoverable; the session is always left in a state from
/// which the caller can retry.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// No bound backend handle, or the device list is empty
    DeviceUnavailable(String),
    /// Rejected because an exclusive operation is already in flight
    SessionBusy {
        /// The operation that was rejected
        requested: Operation,
        /// The operation currently holding the session
        in_flight: Operation,
    },
    /// The native layer reported an error
    BackendFailure(BackendError),
    /// The caller's token was cancelled (raised after local cleanup)
    OperationCancelled(Operation),
    /// The operation is not valid from the current state
    InvalidState {
        operation: Operation,
        state: SessionState,
    },
}

impl SessionError {
    /// Busy rejection for `requested` while `in_flight` holds the session
    pub(crate) fn busy(requested: Operation, in_flight: Operation) -> Self {
        SessionError::SessionBusy {
            requested,
            in_flight,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, SessionError::SessionBusy { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SessionError::OperationCancelled(_))
    }

    pub fn is_device_unavailable(&self) -> bool {
        matches!(self, SessionError::DeviceUnavailable(_))
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::DeviceUnavailable(msg) => write!(f, "Device unavailable: {}", msg),
            SessionError::SessionBusy {
                requested,
                in_flight,
            } => write!(
                f,
                "Session busy: cannot {} while {} is in progress",
                requested, in_flight
            ),
            SessionError::BackendFailure(err) => write!(f, "Backend failure: {}", err),
            SessionError::OperationCancelled(op) => write!(f, "{} cancelled", op),
            SessionError::InvalidState { operation, state } => {
                write!(f, "Cannot {} in state {}", operation, state)
            }
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::BackendFailure(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BackendError> for SessionError {
    fn from(err: BackendError) -> Self {
        SessionError::BackendFailure(err)
    }
}

impl From<DescriptorError> for SessionError {
    fn from(err: DescriptorError) -> Self {
        SessionError::BackendFailure(BackendError::InvalidDescriptor(err.to_string()))
    }
}

// Temp-file and sink I/O happens on behalf of the backend's artifact
impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::BackendFailure(BackendError::IoError(err.to_string()))
    }
}

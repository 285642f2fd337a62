// SPDX-License-Identifier: GPL-3.0-only

//! State owned by one in-flight recording

use super::bridge::{Completion, Outcome};
use crate::backends::camera::types::BackendResult;
use crate::storage::{self, RecordingSink, TempRecording};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type Finalized = Completion<BackendResult<PathBuf>>;

/// Temporary artifact the backend may still be writing
///
/// Dropped without [`release`](Self::release) or [`discard`](Self::discard),
/// the file is handed to a background task that waits for finalize (bounded)
/// before deleting it.
pub(crate) struct PendingArtifact {
    parts: Option<(TempRecording, Finalized)>,
    path: PathBuf,
    finalize_timeout: Duration,
}

impl PendingArtifact {
    pub fn new(temp: TempRecording, finalized: Finalized, finalize_timeout: Duration) -> Self {
        let path = temp.path().to_path_buf();
        Self {
            parts: Some((temp, finalized)),
            path,
            finalize_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the backend to finalize. Neither caller cancellation nor
    /// disconnect interrupts this; only the finalize timeout does.
    pub async fn finalized(&mut self) -> Outcome<BackendResult<PathBuf>> {
        match self.parts.as_mut() {
            Some((_, finalized)) => {
                finalized
                    .wait_uncancellable(&CancellationToken::new(), self.finalize_timeout)
                    .await
            }
            None => Outcome::Abandoned,
        }
    }

    /// Delete the file now. Use once finalize has been seen (or the backend
    /// refused to start).
    pub async fn release(mut self) {
        if let Some((temp, _)) = self.parts.take() {
            temp.release().await;
        }
    }

    /// Wait for finalize, then delete whatever the backend wrote
    pub async fn discard(mut self) {
        if let Some((temp, finalized)) = self.parts.take() {
            discard_after_finalize(temp, finalized, self.finalize_timeout).await;
        }
    }
}

impl Drop for PendingArtifact {
    fn drop(&mut self) {
        let Some((temp, finalized)) = self.parts.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(path = %self.path.display(), "Deferring temporary recording cleanup");
                runtime.spawn(discard_after_finalize(
                    temp,
                    finalized,
                    self.finalize_timeout,
                ));
            }
            // No runtime to wait on; the temp guard removes the file now
            Err(_) => drop(temp),
        }
    }
}

impl std::fmt::Debug for PendingArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingArtifact")
            .field("path", &self.path)
            .field("released", &self.parts.is_none())
            .finish()
    }
}

async fn discard_after_finalize(temp: TempRecording, mut finalized: Finalized, timeout: Duration) {
    match finalized
        .wait_uncancellable(&CancellationToken::new(), timeout)
        .await
    {
        Outcome::Resolved(Ok(artifact)) if artifact != temp.path() => {
            storage::remove_artifact(&artifact).await;
        }
        Outcome::TimedOut => {
            warn!(path = %temp.path().display(), "Recording did not finalize before discard");
        }
        _ => {}
    }
    temp.release().await;
}

/// Everything an acknowledged recording owns
pub(crate) struct RecordingContext {
    pub sink: RecordingSink,
    pub artifact: PendingArtifact,
    pub started_at: Instant,
}

impl RecordingContext {
    /// Drop the sink and discard the partial artifact; the sink never sees it
    pub async fn discard(self) {
        let RecordingContext { sink, artifact, .. } = self;
        drop(sink);
        artifact.discard().await;
    }
}

impl std::fmt::Debug for RecordingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingContext")
            .field("artifact", &self.artifact)
            .field("started_at", &self.started_at)
            .finish()
    }
}

/// Recording held by the session; present exactly while it is `Recording`
#[derive(Debug)]
pub(crate) enum RecordingSlot {
    Active(RecordingContext),
    /// A stop is in flight and owns the context until it settles
    Stopping { started_at: Instant },
}

impl RecordingSlot {
    pub fn elapsed(&self) -> Duration {
        match self {
            RecordingSlot::Active(context) => context.started_at.elapsed(),
            RecordingSlot::Stopping { started_at } => started_at.elapsed(),
        }
    }
}

/// Result of a completed recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSummary {
    pub device_id: String,
    /// Bytes copied into the caller's sink
    pub bytes_written: u64,
    pub duration: Duration,
}

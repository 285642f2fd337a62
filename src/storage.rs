// SPDX-License-Identifier: GPL-3.0-only

//! Temporary recording storage
//!
//! Each recording writes into its own temporary file, named from a timestamp
//! plus a random suffix so concurrent sessions never collide. The file is
//! removed exactly once: either through [`TempRecording::release`] or, as a
//! last resort, when the guard is dropped.

use crate::constants::temp;
use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Caller-supplied destination for a finished recording
pub type RecordingSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Owned temporary recording file
#[derive(Debug)]
pub struct TempRecording {
    path: PathBuf,
    released: bool,
}

impl TempRecording {
    /// Reserve a unique path under `dir` (the file itself is created by the
    /// backend when recording starts)
    pub async fn allocate(dir: &Path) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let timestamp = Local::now().format(temp::TIMESTAMP_FORMAT);
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let filename = format!(
            "{}_{}_{}.{}",
            temp::RECORDING_PREFIX,
            timestamp,
            &suffix[..8],
            temp::RECORDING_EXTENSION
        );
        let path = dir.join(filename);
        debug!(path = %path.display(), "Allocated temporary recording");
        Ok(Self {
            path,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file. Consumes the guard so it cannot be released twice.
    ///
    /// A missing file is not an error (the backend may never have created
    /// it). Other failures are logged and swallowed.
    pub async fn release(mut self) {
        self.released = true;
        remove_artifact(&self.path).await;
    }
}

impl Drop for TempRecording {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Only reached when a task holding the guard was dropped mid-flight
        warn!(path = %self.path.display(), "Temporary recording dropped without release");
        if let Err(err) = std::fs::remove_file(&self.path)
            && err.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %err, "Failed to remove temporary recording");
        }
    }
}

/// Delete a recording artifact, tolerating one that was never created
pub async fn remove_artifact(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed recording artifact"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(
            path = %path.display(),
            error = %err,
            "Failed to remove recording artifact"
        ),
    }
}

/// Stream a finalized artifact into the caller's sink, returning bytes copied
pub async fn copy_into_sink(artifact: &Path, sink: &mut RecordingSink) -> std::io::Result<u64> {
    let mut file = tokio::fs::File::open(artifact).await?;
    let copied = tokio::io::copy(&mut file, sink).await?;
    sink.flush().await?;
    debug!(artifact = %artifact.display(), bytes = copied, "Copied recording into sink");
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allocate_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let a = TempRecording::allocate(dir.path()).await.unwrap();
        let b = TempRecording::allocate(dir.path()).await.unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(dir.path()));
        let name = a.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(temp::RECORDING_PREFIX));
        assert!(name.ends_with(temp::RECORDING_EXTENSION));
        a.release().await;
        b.release().await;
    }

    #[tokio::test]
    async fn test_release_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let temp = TempRecording::allocate(dir.path()).await.unwrap();
        let path = temp.path().to_path_buf();
        tokio::fs::write(&path, b"partial").await.unwrap();

        temp.release().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_release_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let temp = TempRecording::allocate(dir.path()).await.unwrap();
        temp.release().await;
    }

    #[tokio::test]
    async fn test_drop_removes_unreleased_file() {
        let dir = tempfile::tempdir().unwrap();
        let temp = TempRecording::allocate(dir.path()).await.unwrap();
        let path = temp.path().to_path_buf();
        std::fs::write(&path, b"orphan").unwrap();

        drop(temp);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_copy_into_sink() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("artifact");
        tokio::fs::write(&artifact, b"frames").await.unwrap();

        let out = dir.path().join("out");
        let mut sink: RecordingSink = Box::new(tokio::fs::File::create(&out).await.unwrap());
        let copied = copy_into_sink(&artifact, &mut sink).await.unwrap();
        drop(sink);

        assert_eq!(copied, 6);
        assert_eq!(tokio::fs::read(&out).await.unwrap(), b"frames");
    }
}

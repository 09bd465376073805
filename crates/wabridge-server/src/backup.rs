//! Session file backup to an external object store.
//!
//! Only the embedded session database is snapshotted; an external session
//! database brings its own backups. The live file is never written here:
//! snapshots copy it to a temp sibling first, restores write a temp file and
//! rename over the destination.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{watch, Mutex};

const SNAPSHOT_DEADLINE: Duration = Duration::from_secs(60);

/// Fixed cadence of periodic snapshots.
pub const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("object store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolve the object URL for a bucket that is either a bare GCS bucket name
/// or a full base URL to any HTTP object store.
pub fn object_url(bucket: &str, object: &str) -> String {
    let bucket = bucket.trim_end_matches('/');
    if bucket.starts_with("http://") || bucket.starts_with("https://") {
        format!("{bucket}/{object}")
    } else {
        format!("https://storage.googleapis.com/{bucket}/{object}")
    }
}

pub struct SessionSnapshotter {
    client: reqwest::Client,
    object_url: String,
    session_path: PathBuf,
    // At most one snapshot runs at a time.
    running: Mutex<()>,
}

impl SessionSnapshotter {
    pub fn new(bucket: &str, object: &str, session_path: &Path) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(SNAPSHOT_DEADLINE)
                .build()
                .unwrap_or_default(),
            object_url: object_url(bucket, object),
            session_path: session_path.to_path_buf(),
            running: Mutex::new(()),
        }
    }

    /// Download the session file if the object exists. Returns whether a
    /// restore happened.
    pub async fn restore(&self) -> Result<bool, BackupError> {
        let response = self.client.get(&self.object_url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::info!(url = %self.object_url, "no session snapshot to restore");
            return Ok(false);
        }
        let bytes = response.error_for_status()?.bytes().await?;

        if let Some(parent) = self.session_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.session_path.with_extension("restore.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.session_path).await?;

        tracing::info!(
            url = %self.object_url,
            bytes = bytes.len(),
            path = %self.session_path.display(),
            "restored session from object store"
        );
        Ok(true)
    }

    /// Upload the current session file. Copies to a temp sibling before
    /// reading so the live file is untouched.
    pub async fn snapshot(&self) -> Result<(), BackupError> {
        let _guard = self.running.lock().await;

        if !self.session_path.exists() {
            tracing::debug!(path = %self.session_path.display(), "no session file yet, skipping snapshot");
            return Ok(());
        }

        let tmp = self.session_path.with_extension("snapshot.tmp");
        tokio::fs::copy(&self.session_path, &tmp).await?;
        let bytes = tokio::fs::read(&tmp).await?;
        let _ = tokio::fs::remove_file(&tmp).await;

        self.client
            .put(&self.object_url)
            .body(bytes.clone())
            .send()
            .await?
            .error_for_status()?;

        tracing::info!(url = %self.object_url, bytes = bytes.len(), "session snapshot uploaded");
        Ok(())
    }

    /// Run periodic snapshots until shutdown is signaled.
    pub async fn run_periodic(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(SNAPSHOT_INTERVAL) => {
                    if let Err(error) = self.snapshot().await {
                        tracing::warn!(%error, "periodic session snapshot failed");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_url_forms() {
        assert_eq!(
            object_url("wa-sessions", "session.db"),
            "https://storage.googleapis.com/wa-sessions/session.db"
        );
        assert_eq!(
            object_url("https://objects.internal/bucket/", "session.db"),
            "https://objects.internal/bucket/session.db"
        );
    }

    #[tokio::test]
    async fn snapshot_skips_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let snapshotter = SessionSnapshotter::new(
            "http://127.0.0.1:9",
            "session.db",
            &dir.path().join("session.db"),
        );
        // No session file: a snapshot is a no-op, not an error.
        snapshotter.snapshot().await.unwrap();
    }
}

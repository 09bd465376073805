//! Backend selection and session restore.
//!
//! Precedence for session storage:
//! 1. `SESSIONS_DSN` with a remote scheme selects the external backend.
//! 2. Otherwise a remote `DATA_DSN` is used for sessions as well.
//! 3. Otherwise the embedded backend at `SESSIONS_DSN`'s path, falling back
//!    to `MEDIA_ROOT/session.db`.
//!
//! With embedded sessions and a configured bucket, a missing local session
//! file is restored from the object store before the backend opens.

use std::sync::Arc;

use thiserror::Error;
use wabridge_store::{Dsn, MessageStore, SessionBackend, StoreError};

use crate::backup::SessionSnapshotter;
use crate::config::BridgeConfig;

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct Backends {
    pub store: Arc<MessageStore>,
    pub session: Arc<SessionBackend>,
    pub snapshotter: Option<Arc<SessionSnapshotter>>,
    /// Backup posture reported on the health view.
    pub backup_note: &'static str,
}

pub async fn prepare(config: &BridgeConfig) -> Result<Backends, BootstrapError> {
    std::fs::create_dir_all(&config.media_root)?;

    let messages_dsn = match &config.data_dsn {
        Some(raw) => Dsn::parse(raw)?,
        None => Dsn::Sqlite(config.default_messages_path()),
    };
    let sessions_dsn = resolve_sessions_dsn(config)?;

    tracing::info!(
        messages = %messages_dsn.display_host(),
        sessions = %sessions_dsn.display_host(),
        "selected storage backends"
    );

    let (snapshotter, backup_note) = match (&sessions_dsn, &config.session_bucket) {
        (Dsn::Sqlite(path), Some(bucket)) => {
            let snapshotter = SessionSnapshotter::new(bucket, &config.session_object, path);
            if !path.exists() {
                match snapshotter.restore().await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::info!("starting with a fresh session; pairing will be required")
                    }
                    Err(error) => {
                        tracing::warn!(%error, "session restore failed, continuing with a fresh session")
                    }
                }
            }
            (Some(Arc::new(snapshotter)), "active")
        }
        (Dsn::Postgres(_), _) => (None, "skipped (external sessions)"),
        (Dsn::Sqlite(_), None) => (None, "disabled"),
    };

    let session = SessionBackend::open(&sessions_dsn).await?;
    let store = MessageStore::open(&messages_dsn).await?;

    Ok(Backends {
        store: Arc::new(store),
        session: Arc::new(session),
        snapshotter,
        backup_note,
    })
}

fn resolve_sessions_dsn(config: &BridgeConfig) -> Result<Dsn, StoreError> {
    if let Some(raw) = &config.sessions_dsn {
        return Dsn::parse(raw);
    }
    if let Some(raw) = &config.data_dsn {
        let dsn = Dsn::parse(raw)?;
        if dsn.is_remote() {
            return Ok(dsn);
        }
    }
    Ok(Dsn::Sqlite(config.default_session_path()))
}

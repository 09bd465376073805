//! Protocol session backend.
//!
//! These tables belong to the protocol engine: device identity, signal
//! ratchet state, app-state sync bookkeeping. The bridge never writes them.
//! Its duties end at opening the connection with the right parameters,
//! guaranteeing the schema exists (embedded) or validating it (external),
//! and reading the device row to answer "is a device paired?".

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls};
use wabridge_proto::Jid;

use crate::dsn::Dsn;
use crate::error::{Result, StoreError};

/// Every table the protocol engine expects to find.
pub const SESSION_TABLES: [&str; 13] = [
    "devices",
    "identities",
    "prekeys",
    "sessions",
    "sender_keys",
    "signed_prekeys",
    "app_state_sync_keys",
    "app_state_version",
    "app_state_mutation_macs",
    "contacts",
    "chat_settings",
    "message_secrets",
    "privacy_tokens",
];

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS devices (
    jid                  TEXT PRIMARY KEY NOT NULL,
    registration_id      INTEGER NOT NULL,
    noise_key            BLOB NOT NULL,
    identity_key         BLOB NOT NULL,
    signed_pre_key       BLOB NOT NULL,
    signed_pre_key_id    INTEGER NOT NULL,
    signed_pre_key_sig   BLOB NOT NULL,
    adv_key              BLOB,
    adv_details          BLOB,
    adv_account_sig      BLOB,
    adv_device_sig       BLOB,
    platform             TEXT NOT NULL DEFAULT '',
    business_name        TEXT NOT NULL DEFAULT '',
    push_name            TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS identities (
    our_jid  TEXT NOT NULL,
    their_id TEXT NOT NULL,
    identity BLOB NOT NULL,
    PRIMARY KEY (our_jid, their_id)
);

CREATE TABLE IF NOT EXISTS prekeys (
    jid      TEXT NOT NULL,
    key_id   INTEGER NOT NULL,
    key      BLOB NOT NULL,
    uploaded INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (jid, key_id)
);

CREATE TABLE IF NOT EXISTS sessions (
    our_jid  TEXT NOT NULL,
    their_id TEXT NOT NULL,
    session  BLOB,
    PRIMARY KEY (our_jid, their_id)
);

CREATE TABLE IF NOT EXISTS sender_keys (
    our_jid    TEXT NOT NULL,
    chat_id    TEXT NOT NULL,
    sender_id  TEXT NOT NULL,
    sender_key BLOB NOT NULL,
    PRIMARY KEY (our_jid, chat_id, sender_id)
);

CREATE TABLE IF NOT EXISTS signed_prekeys (
    jid       TEXT NOT NULL,
    key_id    INTEGER NOT NULL,
    key       BLOB NOT NULL,
    signature BLOB NOT NULL,
    PRIMARY KEY (jid, key_id)
);

CREATE TABLE IF NOT EXISTS app_state_sync_keys (
    jid         TEXT NOT NULL,
    key_id      BLOB NOT NULL,
    key_data    BLOB NOT NULL,
    timestamp   INTEGER NOT NULL,
    fingerprint BLOB NOT NULL,
    PRIMARY KEY (jid, key_id)
);

CREATE TABLE IF NOT EXISTS app_state_version (
    jid     TEXT NOT NULL,
    name    TEXT NOT NULL,
    version INTEGER NOT NULL,
    hash    BLOB NOT NULL,
    PRIMARY KEY (jid, name)
);

CREATE TABLE IF NOT EXISTS app_state_mutation_macs (
    jid       TEXT NOT NULL,
    name      TEXT NOT NULL,
    version   INTEGER NOT NULL,
    index_mac BLOB NOT NULL,
    value_mac BLOB NOT NULL,
    PRIMARY KEY (jid, name, version, index_mac)
);

CREATE TABLE IF NOT EXISTS contacts (
    our_jid       TEXT NOT NULL,
    their_jid     TEXT NOT NULL,
    first_name    TEXT,
    full_name     TEXT,
    push_name     TEXT,
    business_name TEXT,
    PRIMARY KEY (our_jid, their_jid)
);

CREATE TABLE IF NOT EXISTS chat_settings (
    our_jid     TEXT NOT NULL,
    chat_jid    TEXT NOT NULL,
    muted_until INTEGER NOT NULL DEFAULT 0,
    pinned      INTEGER NOT NULL DEFAULT 0,
    archived    INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (our_jid, chat_jid)
);

CREATE TABLE IF NOT EXISTS message_secrets (
    our_jid    TEXT NOT NULL,
    chat_jid   TEXT NOT NULL,
    sender_jid TEXT NOT NULL,
    message_id TEXT NOT NULL,
    key        BLOB NOT NULL,
    PRIMARY KEY (our_jid, chat_jid, sender_jid, message_id)
);

CREATE TABLE IF NOT EXISTS privacy_tokens (
    our_jid   TEXT NOT NULL,
    their_jid TEXT NOT NULL,
    token     BLOB NOT NULL,
    timestamp INTEGER NOT NULL,
    PRIMARY KEY (our_jid, their_jid)
);
"#;

pub enum SessionBackend {
    Sqlite {
        conn: Arc<Mutex<Connection>>,
        path: PathBuf,
    },
    Postgres {
        client: Arc<Client>,
        host: String,
        tables_ok: bool,
    },
}

impl SessionBackend {
    pub async fn open(dsn: &Dsn) -> Result<Self> {
        match dsn {
            Dsn::Sqlite(path) => Self::open_sqlite(path),
            Dsn::Postgres(conn) => Self::open_postgres(conn, dsn.display_host()).await,
        }
    }

    fn open_sqlite(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %path.display(), "opening session database");

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self::Sqlite {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_path_buf(),
        })
    }

    async fn open_postgres(dsn: &str, host: String) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(dsn, NoTls).await?;
        tokio::spawn(async move {
            if let Err(error) = connection.await {
                tracing::error!(%error, "session database connection stopped");
            }
        });

        client
            .simple_query("SET statement_timeout = 10000")
            .await?;

        let present = client
            .query(
                "SELECT table_name FROM information_schema.tables
                 WHERE table_schema = 'public'",
                &[],
            )
            .await?;
        let present: Vec<String> = present.iter().map(|r| r.get(0)).collect();
        for table in SESSION_TABLES {
            if !present.iter().any(|t| t == table) {
                return Err(StoreError::SchemaMissing(table.to_string()));
            }
        }

        Ok(Self::Postgres {
            client: Arc::new(client),
            host,
            tables_ok: true,
        })
    }

    pub fn backend_kind(&self) -> &'static str {
        match self {
            Self::Sqlite { .. } => "sqlite",
            Self::Postgres { .. } => "postgres",
        }
    }

    pub fn host(&self) -> String {
        match self {
            Self::Sqlite { path, .. } => path.display().to_string(),
            Self::Postgres { host, .. } => host.clone(),
        }
    }

    /// Filesystem path of the session file, embedded mode only. The backup
    /// snapshotter keys off this.
    pub fn file_path(&self) -> Option<&Path> {
        match self {
            Self::Sqlite { path, .. } => Some(path),
            Self::Postgres { .. } => None,
        }
    }

    pub fn tables_ok(&self) -> bool {
        match self {
            Self::Sqlite { .. } => true,
            Self::Postgres { tables_ok, .. } => *tables_ok,
        }
    }

    pub async fn reachable(&self) -> bool {
        match self {
            Self::Sqlite { conn, .. } => {
                let conn = conn.lock().await;
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                    .is_ok()
            }
            Self::Postgres { client, .. } => client.simple_query("SELECT 1").await.is_ok(),
        }
    }

    /// JID of the paired device, when one exists. Read-only probe of the
    /// engine-owned device row.
    pub async fn device_jid(&self) -> Result<Option<Jid>> {
        let raw: Option<String> = match self {
            Self::Sqlite { conn, .. } => {
                use rusqlite::OptionalExtension;
                let conn = conn.lock().await;
                conn.query_row("SELECT jid FROM devices LIMIT 1", [], |row| row.get(0))
                    .optional()?
            }
            Self::Postgres { client, .. } => client
                .query_opt("SELECT jid FROM devices LIMIT 1", &[])
                .await?
                .map(|row| row.get(0)),
        };

        // Device JIDs carry an agent/device suffix (`user:device@server`);
        // tolerate any well-formed value and surface parse failures as None.
        Ok(raw.and_then(|s| Jid::parse(&s).ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embedded_creates_all_tables() {
        let dir = tempfile::tempdir().unwrap();
        let dsn = Dsn::Sqlite(dir.path().join("session.db"));
        let backend = SessionBackend::open(&dsn).await.unwrap();

        assert_eq!(backend.backend_kind(), "sqlite");
        assert!(backend.tables_ok());
        assert!(backend.reachable().await);
        assert!(backend.file_path().is_some());

        match &backend {
            SessionBackend::Sqlite { conn, .. } => {
                let conn = conn.lock().await;
                for table in SESSION_TABLES {
                    let count: i64 = conn
                        .query_row(
                            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                            [table],
                            |row| row.get(0),
                        )
                        .unwrap();
                    assert_eq!(count, 1, "missing table {table}");
                }
            }
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn device_probe_reports_pairing() {
        let dir = tempfile::tempdir().unwrap();
        let dsn = Dsn::Sqlite(dir.path().join("session.db"));
        let backend = SessionBackend::open(&dsn).await.unwrap();

        assert!(backend.device_jid().await.unwrap().is_none());

        // Simulate the engine writing its device row after pairing.
        match &backend {
            SessionBackend::Sqlite { conn, .. } => {
                let conn = conn.lock().await;
                conn.execute(
                    "INSERT INTO devices
                         (jid, registration_id, noise_key, identity_key,
                          signed_pre_key, signed_pre_key_id, signed_pre_key_sig)
                     VALUES (?1, 1, x'00', x'00', x'00', 1, x'00')",
                    ["15551234567@s.whatsapp.net"],
                )
                .unwrap();
            }
            _ => unreachable!(),
        }

        let jid = backend.device_jid().await.unwrap().unwrap();
        assert_eq!(jid.server, "s.whatsapp.net");
    }

    #[tokio::test]
    async fn reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let dsn = Dsn::Sqlite(dir.path().join("session.db"));
        drop(SessionBackend::open(&dsn).await.unwrap());
        let backend = SessionBackend::open(&dsn).await.unwrap();
        assert!(backend.reachable().await);
    }
}

//! Embedded message store driver backed by rusqlite.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings so that SQL
//! string comparison orders them correctly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;
use wabridge_proto::{MediaKind, MediaRef};

use crate::error::{Result, StoreError};
use crate::models::{Chat, StoredMessage};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS chats (
    jid               TEXT PRIMARY KEY NOT NULL,
    name              TEXT,
    last_message_time TEXT                        -- RFC-3339 UTC
);

CREATE TABLE IF NOT EXISTS messages (
    id              TEXT NOT NULL,
    chat_jid        TEXT NOT NULL,
    sender          TEXT NOT NULL,
    content         TEXT NOT NULL,
    timestamp       TEXT NOT NULL,                -- RFC-3339 UTC
    is_from_me      INTEGER NOT NULL DEFAULT 0,   -- boolean 0/1
    media_type      TEXT,
    filename        TEXT,
    url             TEXT,
    media_key       BLOB,
    file_sha256     BLOB,
    file_enc_sha256 BLOB,
    file_length     INTEGER,

    PRIMARY KEY (id, chat_jid),
    FOREIGN KEY (chat_jid) REFERENCES chats(jid)
);

CREATE INDEX IF NOT EXISTS idx_messages_chat_ts
    ON messages(chat_jid, timestamp DESC);
"#;

pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

pub struct SqliteMessageStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteMessageStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %path.display(), "opening messages database");

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn reachable(&self) -> bool {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }

    pub async fn upsert_chat(
        &self,
        jid: &str,
        name: Option<&str>,
        last_message_time: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO chats (jid, name, last_message_time) VALUES (?1, ?2, ?3)
             ON CONFLICT(jid) DO UPDATE SET
                 name = CASE
                     WHEN chats.last_message_time IS NULL
                       OR excluded.last_message_time >= chats.last_message_time
                     THEN COALESCE(excluded.name, chats.name)
                     ELSE chats.name
                 END,
                 last_message_time = CASE
                     WHEN chats.last_message_time IS NULL
                       OR excluded.last_message_time >= chats.last_message_time
                     THEN excluded.last_message_time
                     ELSE chats.last_message_time
                 END",
            params![jid, name, fmt_ts(last_message_time)],
        )?;
        Ok(())
    }

    pub async fn upsert_message(&self, message: &StoredMessage) -> Result<()> {
        let media = message.media.as_ref();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO messages
                 (id, chat_jid, sender, content, timestamp, is_from_me,
                  media_type, filename, url, media_key, file_sha256, file_enc_sha256, file_length)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(id, chat_jid) DO UPDATE SET
                 sender          = excluded.sender,
                 content         = CASE WHEN excluded.content <> '' THEN excluded.content
                                        ELSE messages.content END,
                 timestamp       = excluded.timestamp,
                 is_from_me      = excluded.is_from_me,
                 media_type      = COALESCE(excluded.media_type, messages.media_type),
                 filename        = COALESCE(excluded.filename, messages.filename),
                 url             = COALESCE(excluded.url, messages.url),
                 media_key       = COALESCE(excluded.media_key, messages.media_key),
                 file_sha256     = COALESCE(excluded.file_sha256, messages.file_sha256),
                 file_enc_sha256 = COALESCE(excluded.file_enc_sha256, messages.file_enc_sha256),
                 file_length     = COALESCE(excluded.file_length, messages.file_length)",
            params![
                message.id,
                message.chat_jid,
                message.sender,
                message.content,
                fmt_ts(message.timestamp),
                message.is_from_me,
                media.map(|m| m.kind.as_str()),
                media.and_then(|m| m.filename.as_deref()),
                media.map(|m| m.url.as_str()),
                media.map(|m| m.media_key.as_slice()),
                media.map(|m| m.file_sha256.as_slice()),
                media.map(|m| m.file_enc_sha256.as_slice()),
                media.map(|m| m.file_length as i64),
            ],
        )?;
        Ok(())
    }

    /// Persist a chat rename without touching `last_message_time`.
    pub async fn rename_chat(&self, jid: &str, name: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO chats (jid, name, last_message_time) VALUES (?1, ?2, NULL)
             ON CONFLICT(jid) DO UPDATE SET name = excluded.name",
            params![jid, name],
        )?;
        Ok(())
    }

    pub async fn get_chats(&self) -> Result<Vec<Chat>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT jid, name, last_message_time FROM chats
             ORDER BY last_message_time IS NULL, last_message_time DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;

        let mut chats = Vec::new();
        for row in rows {
            let (jid, name, ts) = row?;
            chats.push(Chat {
                jid,
                name,
                last_message_time: ts.as_deref().map(parse_ts).transpose()?,
            });
        }
        Ok(chats)
    }

    pub async fn get_messages(&self, chat_jid: &str, limit: u32) -> Result<Vec<StoredMessage>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, chat_jid, sender, content, timestamp, is_from_me,
                    media_type, filename, url, media_key, file_sha256, file_enc_sha256, file_length
             FROM messages WHERE chat_jid = ?1
             ORDER BY timestamp DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![chat_jid, limit], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row??);
        }
        Ok(messages)
    }

    pub async fn get_media_info(&self, id: &str, chat_jid: &str) -> Result<MediaRef> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT media_type, filename, url, media_key, file_sha256, file_enc_sha256, file_length
                 FROM messages WHERE id = ?1 AND chat_jid = ?2",
                params![id, chat_jid],
                media_columns,
            )
            .optional()?;

        match row {
            None => Err(StoreError::NotFound),
            Some(columns) => media_from_columns(columns).ok_or(StoreError::NoMedia),
        }
    }

    pub async fn get_media_type_and_filename(
        &self,
        id: &str,
        chat_jid: &str,
    ) -> Result<(MediaKind, Option<String>)> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT media_type, filename FROM messages WHERE id = ?1 AND chat_jid = ?2",
                params![id, chat_jid],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Err(StoreError::NotFound),
            Some((media_type, filename)) => media_type
                .as_deref()
                .and_then(MediaKind::from_str_opt)
                .map(|kind| (kind, filename))
                .ok_or(StoreError::NoMedia),
        }
    }

    pub async fn update_media_info(
        &self,
        id: &str,
        chat_jid: &str,
        url: &str,
        media_key: &[u8],
        file_sha256: &[u8],
        file_enc_sha256: &[u8],
        file_length: u64,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        let affected = conn.execute(
            "UPDATE messages SET url = ?3, media_key = ?4, file_sha256 = ?5,
                                 file_enc_sha256 = ?6, file_length = ?7
             WHERE id = ?1 AND chat_jid = ?2",
            params![
                id,
                chat_jid,
                url,
                media_key,
                file_sha256,
                file_enc_sha256,
                file_length as i64
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub async fn count_messages(&self) -> Result<u64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub async fn count_chats(&self) -> Result<u64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM chats", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub async fn size_bytes(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0))
    }
}

type MediaColumns = (
    Option<String>,
    Option<String>,
    Option<String>,
    Option<Vec<u8>>,
    Option<Vec<u8>>,
    Option<Vec<u8>>,
    Option<i64>,
);

fn media_columns(row: &rusqlite::Row<'_>) -> rusqlite::Result<MediaColumns> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn media_from_columns(columns: MediaColumns) -> Option<MediaRef> {
    let (media_type, filename, url, media_key, file_sha256, file_enc_sha256, file_length) = columns;
    let kind = media_type.as_deref().and_then(MediaKind::from_str_opt)?;
    Some(MediaRef {
        kind,
        filename,
        url: url.unwrap_or_default(),
        media_key: media_key.unwrap_or_default(),
        file_sha256: file_sha256.unwrap_or_default(),
        file_enc_sha256: file_enc_sha256.unwrap_or_default(),
        file_length: file_length.unwrap_or(0) as u64,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<StoredMessage>> {
    let id: String = row.get(0)?;
    let chat_jid: String = row.get(1)?;
    let sender: String = row.get(2)?;
    let content: String = row.get(3)?;
    let ts_str: String = row.get(4)?;
    let is_from_me: bool = row.get(5)?;
    let media = media_from_columns((
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
    ));

    Ok(parse_ts(&ts_str).map(|timestamp| StoredMessage {
        id,
        chat_jid,
        sender,
        content,
        timestamp,
        is_from_me,
        media,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store() -> (SqliteMessageStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteMessageStore::open(&dir.path().join("messages.db")).unwrap();
        (store, dir)
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn message(id: &str, chat: &str, secs: i64) -> StoredMessage {
        StoredMessage {
            id: id.into(),
            chat_jid: chat.into(),
            sender: "15551234567@s.whatsapp.net".into(),
            content: format!("msg {id}"),
            timestamp: ts(secs),
            is_from_me: false,
            media: None,
        }
    }

    #[tokio::test]
    async fn chat_upsert_keeps_newest() {
        let (store, _dir) = store();
        store
            .upsert_chat("room@g.us", Some("Old"), ts(100))
            .await
            .unwrap();
        // Older timestamp must not regress name or time.
        store
            .upsert_chat("room@g.us", Some("Stale"), ts(50))
            .await
            .unwrap();

        let chats = store.get_chats().await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].name.as_deref(), Some("Old"));
        assert_eq!(chats[0].last_message_time, Some(ts(100)));

        // Equal timestamp keeps the newer name.
        store
            .upsert_chat("room@g.us", Some("Renamed"), ts(100))
            .await
            .unwrap();
        let chats = store.get_chats().await.unwrap();
        assert_eq!(chats[0].name.as_deref(), Some("Renamed"));
    }

    #[tokio::test]
    async fn chat_upsert_null_name_preserved() {
        let (store, _dir) = store();
        store
            .upsert_chat("room@g.us", Some("Named"), ts(10))
            .await
            .unwrap();
        store.upsert_chat("room@g.us", None, ts(20)).await.unwrap();

        let chats = store.get_chats().await.unwrap();
        assert_eq!(chats[0].name.as_deref(), Some("Named"));
        assert_eq!(chats[0].last_message_time, Some(ts(20)));
    }

    #[tokio::test]
    async fn rename_updates_name_only() {
        let (store, _dir) = store();
        store
            .upsert_chat("room@g.us", Some("Old"), ts(100))
            .await
            .unwrap();
        store.rename_chat("room@g.us", "New Name").await.unwrap();

        let chats = store.get_chats().await.unwrap();
        assert_eq!(chats[0].name.as_deref(), Some("New Name"));
        assert_eq!(chats[0].last_message_time, Some(ts(100)));

        // Renaming an unknown chat creates the row.
        store.rename_chat("new@g.us", "Fresh").await.unwrap();
        assert_eq!(store.count_chats().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn message_upsert_is_idempotent() {
        let (store, _dir) = store();
        store.upsert_chat("a@s.whatsapp.net", None, ts(1)).await.unwrap();
        let msg = message("M1", "a@s.whatsapp.net", 1);

        store.upsert_message(&msg).await.unwrap();
        store.upsert_message(&msg).await.unwrap();

        assert_eq!(store.count_messages().await.unwrap(), 1);
        let got = store.get_messages("a@s.whatsapp.net", 10).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].content, "msg M1");
    }

    #[tokio::test]
    async fn message_upsert_enriches_media_without_clobbering() {
        let (store, _dir) = store();
        store.upsert_chat("a@s.whatsapp.net", None, ts(1)).await.unwrap();

        let mut msg = message("M1", "a@s.whatsapp.net", 1);
        msg.media = Some(MediaRef {
            kind: MediaKind::Image,
            filename: None,
            url: "https://mmg.whatsapp.net/v/x.enc?oh=1".into(),
            media_key: vec![1; 32],
            file_sha256: vec![2; 32],
            file_enc_sha256: vec![3; 32],
            file_length: 42,
        });
        store.upsert_message(&msg).await.unwrap();

        // A later re-delivery with no media fields must not erase them.
        let bare = message("M1", "a@s.whatsapp.net", 1);
        store.upsert_message(&bare).await.unwrap();

        let media = store.get_media_info("M1", "a@s.whatsapp.net").await.unwrap();
        assert_eq!(media.kind, MediaKind::Image);
        assert_eq!(media.file_length, 42);
    }

    #[tokio::test]
    async fn media_info_errors() {
        let (store, _dir) = store();
        store.upsert_chat("a@s.whatsapp.net", None, ts(1)).await.unwrap();
        store
            .upsert_message(&message("TXT", "a@s.whatsapp.net", 1))
            .await
            .unwrap();

        assert!(matches!(
            store.get_media_info("TXT", "a@s.whatsapp.net").await,
            Err(StoreError::NoMedia)
        ));
        assert!(matches!(
            store.get_media_info("NOPE", "a@s.whatsapp.net").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn update_media_info_fills_fields() {
        let (store, _dir) = store();
        store.upsert_chat("a@s.whatsapp.net", None, ts(1)).await.unwrap();
        let mut msg = message("M2", "a@s.whatsapp.net", 2);
        msg.media = Some(MediaRef {
            kind: MediaKind::Video,
            filename: None,
            url: String::new(),
            media_key: vec![],
            file_sha256: vec![],
            file_enc_sha256: vec![],
            file_length: 0,
        });
        store.upsert_message(&msg).await.unwrap();

        store
            .update_media_info(
                "M2",
                "a@s.whatsapp.net",
                "https://mmg.whatsapp.net/v/y.enc",
                &[9; 32],
                &[8; 32],
                &[7; 32],
                1234,
            )
            .await
            .unwrap();

        let media = store.get_media_info("M2", "a@s.whatsapp.net").await.unwrap();
        assert_eq!(media.url, "https://mmg.whatsapp.net/v/y.enc");
        assert_eq!(media.file_length, 1234);

        assert!(matches!(
            store
                .update_media_info("NOPE", "a@s.whatsapp.net", "u", &[], &[], &[], 0)
                .await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn messages_ordered_and_limited() {
        let (store, _dir) = store();
        store.upsert_chat("a@s.whatsapp.net", None, ts(1)).await.unwrap();
        for i in 0..5 {
            store
                .upsert_message(&message(&format!("M{i}"), "a@s.whatsapp.net", i))
                .await
                .unwrap();
        }

        let got = store.get_messages("a@s.whatsapp.net", 3).await.unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].id, "M4");
        assert_eq!(got[2].id, "M2");
    }

    #[tokio::test]
    async fn counts_and_size() {
        let (store, _dir) = store();
        store.upsert_chat("a@s.whatsapp.net", None, ts(1)).await.unwrap();
        store
            .upsert_message(&message("M1", "a@s.whatsapp.net", 1))
            .await
            .unwrap();

        assert_eq!(store.count_chats().await.unwrap(), 1);
        assert_eq!(store.count_messages().await.unwrap(), 1);
        assert!(store.size_bytes().await.unwrap() > 0);
        assert!(store.reachable().await);
    }
}

//! External message store driver backed by tokio-postgres.
//!
//! The external schema is owned by the deployment; `open` validates it and
//! fails fast when tables or columns are missing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_postgres::{Client, NoTls};
use wabridge_proto::{MediaKind, MediaRef};

use crate::error::{Result, StoreError};
use crate::models::{Chat, StoredMessage};

const REQUIRED_TABLES: [(&str, &[&str]); 2] = [
    ("chats", &["jid", "name", "last_message_time"]),
    (
        "messages",
        &[
            "id",
            "chat_jid",
            "sender",
            "content",
            "timestamp",
            "is_from_me",
            "media_type",
            "filename",
            "url",
            "media_key",
            "file_sha256",
            "file_enc_sha256",
            "file_length",
        ],
    ),
];

pub struct PgMessageStore {
    client: Arc<Client>,
    host: String,
}

impl PgMessageStore {
    pub async fn open(dsn: &str, host: String) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(dsn, NoTls).await?;
        tokio::spawn(async move {
            if let Err(error) = connection.await {
                tracing::error!(%error, "messages database connection stopped");
            }
        });

        // Bound every query; a wedged server must not stall the event loop.
        client
            .simple_query("SET statement_timeout = 10000")
            .await?;

        let store = Self {
            client: Arc::new(client),
            host,
        };
        store.validate_schema().await?;
        Ok(store)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    async fn validate_schema(&self) -> Result<()> {
        for (table, columns) in REQUIRED_TABLES {
            let rows = self
                .client
                .query(
                    "SELECT column_name FROM information_schema.columns
                     WHERE table_schema = 'public' AND table_name = $1",
                    &[&table],
                )
                .await?;
            if rows.is_empty() {
                return Err(StoreError::SchemaMissing(table.to_string()));
            }
            let present: Vec<String> = rows.iter().map(|r| r.get(0)).collect();
            for column in columns {
                if !present.iter().any(|c| c == column) {
                    return Err(StoreError::SchemaMissing(format!("{table}.{column}")));
                }
            }
        }
        Ok(())
    }

    pub async fn reachable(&self) -> bool {
        self.client.simple_query("SELECT 1").await.is_ok()
    }

    pub async fn upsert_chat(
        &self,
        jid: &str,
        name: Option<&str>,
        last_message_time: DateTime<Utc>,
    ) -> Result<()> {
        self.client
            .execute(
                "INSERT INTO chats (jid, name, last_message_time) VALUES ($1, $2, $3)
                 ON CONFLICT (jid) DO UPDATE SET
                     name = CASE
                         WHEN chats.last_message_time IS NULL
                           OR EXCLUDED.last_message_time >= chats.last_message_time
                         THEN COALESCE(EXCLUDED.name, chats.name)
                         ELSE chats.name
                     END,
                     last_message_time = CASE
                         WHEN chats.last_message_time IS NULL
                           OR EXCLUDED.last_message_time >= chats.last_message_time
                         THEN EXCLUDED.last_message_time
                         ELSE chats.last_message_time
                     END",
                &[&jid, &name, &last_message_time],
            )
            .await?;
        Ok(())
    }

    pub async fn upsert_message(&self, message: &StoredMessage) -> Result<()> {
        let media = message.media.as_ref();
        self.client
            .execute(
                "INSERT INTO messages
                     (id, chat_jid, sender, content, timestamp, is_from_me,
                      media_type, filename, url, media_key, file_sha256, file_enc_sha256, file_length)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                 ON CONFLICT (id, chat_jid) DO UPDATE SET
                     sender          = EXCLUDED.sender,
                     content         = CASE WHEN EXCLUDED.content <> '' THEN EXCLUDED.content
                                            ELSE messages.content END,
                     timestamp       = EXCLUDED.timestamp,
                     is_from_me      = EXCLUDED.is_from_me,
                     media_type      = COALESCE(EXCLUDED.media_type, messages.media_type),
                     filename        = COALESCE(EXCLUDED.filename, messages.filename),
                     url             = COALESCE(EXCLUDED.url, messages.url),
                     media_key       = COALESCE(EXCLUDED.media_key, messages.media_key),
                     file_sha256     = COALESCE(EXCLUDED.file_sha256, messages.file_sha256),
                     file_enc_sha256 = COALESCE(EXCLUDED.file_enc_sha256, messages.file_enc_sha256),
                     file_length     = COALESCE(EXCLUDED.file_length, messages.file_length)",
                &[
                    &message.id,
                    &message.chat_jid,
                    &message.sender,
                    &message.content,
                    &message.timestamp,
                    &message.is_from_me,
                    &media.map(|m| m.kind.as_str()),
                    &media.and_then(|m| m.filename.as_deref()),
                    &media.map(|m| m.url.as_str()),
                    &media.map(|m| m.media_key.as_slice()),
                    &media.map(|m| m.file_sha256.as_slice()),
                    &media.map(|m| m.file_enc_sha256.as_slice()),
                    &media.map(|m| m.file_length as i64),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn rename_chat(&self, jid: &str, name: &str) -> Result<()> {
        self.client
            .execute(
                "INSERT INTO chats (jid, name, last_message_time) VALUES ($1, $2, NULL)
                 ON CONFLICT (jid) DO UPDATE SET name = EXCLUDED.name",
                &[&jid, &name],
            )
            .await?;
        Ok(())
    }

    pub async fn get_chats(&self) -> Result<Vec<Chat>> {
        let rows = self
            .client
            .query(
                "SELECT jid, name, last_message_time FROM chats
                 ORDER BY last_message_time DESC NULLS LAST",
                &[],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| Chat {
                jid: row.get(0),
                name: row.get(1),
                last_message_time: row.get(2),
            })
            .collect())
    }

    pub async fn get_messages(&self, chat_jid: &str, limit: u32) -> Result<Vec<StoredMessage>> {
        let rows = self
            .client
            .query(
                "SELECT id, chat_jid, sender, content, timestamp, is_from_me,
                        media_type, filename, url, media_key, file_sha256, file_enc_sha256, file_length
                 FROM messages WHERE chat_jid = $1
                 ORDER BY timestamp DESC LIMIT $2",
                &[&chat_jid, &(limit as i64)],
            )
            .await?;
        Ok(rows.iter().map(row_to_message).collect())
    }

    pub async fn get_media_info(&self, id: &str, chat_jid: &str) -> Result<MediaRef> {
        let row = self
            .client
            .query_opt(
                "SELECT media_type, filename, url, media_key, file_sha256, file_enc_sha256, file_length
                 FROM messages WHERE id = $1 AND chat_jid = $2",
                &[&id, &chat_jid],
            )
            .await?
            .ok_or(StoreError::NotFound)?;

        media_from_row(&row, 0).ok_or(StoreError::NoMedia)
    }

    pub async fn get_media_type_and_filename(
        &self,
        id: &str,
        chat_jid: &str,
    ) -> Result<(MediaKind, Option<String>)> {
        let row = self
            .client
            .query_opt(
                "SELECT media_type, filename FROM messages WHERE id = $1 AND chat_jid = $2",
                &[&id, &chat_jid],
            )
            .await?
            .ok_or(StoreError::NotFound)?;

        let media_type: Option<String> = row.get(0);
        let filename: Option<String> = row.get(1);
        media_type
            .as_deref()
            .and_then(MediaKind::from_str_opt)
            .map(|kind| (kind, filename))
            .ok_or(StoreError::NoMedia)
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
        let affected = self
            .client
            .execute(
                "UPDATE messages SET url = $3, media_key = $4, file_sha256 = $5,
                                     file_enc_sha256 = $6, file_length = $7
                 WHERE id = $1 AND chat_jid = $2",
                &[
                    &id,
                    &chat_jid,
                    &url,
                    &media_key,
                    &file_sha256,
                    &file_enc_sha256,
                    &(file_length as i64),
                ],
            )
            .await?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub async fn count_messages(&self) -> Result<u64> {
        let row = self
            .client
            .query_one("SELECT COUNT(*) FROM messages", &[])
            .await?;
        Ok(row.get::<_, i64>(0) as u64)
    }

    pub async fn count_chats(&self) -> Result<u64> {
        let row = self
            .client
            .query_one("SELECT COUNT(*) FROM chats", &[])
            .await?;
        Ok(row.get::<_, i64>(0) as u64)
    }

    pub async fn size_bytes(&self) -> Result<u64> {
        let row = self
            .client
            .query_one(
                "SELECT COALESCE(pg_total_relation_size('chats'), 0)
                      + COALESCE(pg_total_relation_size('messages'), 0)",
                &[],
            )
            .await?;
        Ok(row.get::<_, i64>(0) as u64)
    }
}

fn media_from_row(row: &tokio_postgres::Row, offset: usize) -> Option<MediaRef> {
    let media_type: Option<String> = row.get(offset);
    let kind = media_type.as_deref().and_then(MediaKind::from_str_opt)?;
    Some(MediaRef {
        kind,
        filename: row.get(offset + 1),
        url: row.get::<_, Option<String>>(offset + 2).unwrap_or_default(),
        media_key: row.get::<_, Option<Vec<u8>>>(offset + 3).unwrap_or_default(),
        file_sha256: row.get::<_, Option<Vec<u8>>>(offset + 4).unwrap_or_default(),
        file_enc_sha256: row.get::<_, Option<Vec<u8>>>(offset + 5).unwrap_or_default(),
        file_length: row.get::<_, Option<i64>>(offset + 6).unwrap_or(0) as u64,
    })
}

fn row_to_message(row: &tokio_postgres::Row) -> StoredMessage {
    StoredMessage {
        id: row.get(0),
        chat_jid: row.get(1),
        sender: row.get(2),
        content: row.get(3),
        timestamp: row.get(4),
        is_from_me: row.get(5),
        media: media_from_row(row, 6),
    }
}

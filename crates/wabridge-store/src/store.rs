//! Driver dispatch for the message/chat store.
//!
//! Both drivers expose identical externally observable behavior; callers
//! only ever see this enum.

use chrono::{DateTime, Utc};
use wabridge_proto::{MediaKind, MediaRef};

use crate::dsn::Dsn;
use crate::error::Result;
use crate::models::{Chat, StoredMessage};
use crate::postgres::PgMessageStore;
use crate::sqlite::SqliteMessageStore;

pub enum MessageStore {
    Sqlite(SqliteMessageStore),
    Postgres(PgMessageStore),
}

impl MessageStore {
    /// Open the driver selected by `dsn`. Embedded stores create their
    /// schema; the external driver validates it and fails fast with
    /// `SchemaMissing` otherwise.
    pub async fn open(dsn: &Dsn) -> Result<Self> {
        match dsn {
            Dsn::Sqlite(path) => Ok(Self::Sqlite(SqliteMessageStore::open(path)?)),
            Dsn::Postgres(conn) => Ok(Self::Postgres(
                PgMessageStore::open(conn, dsn.display_host()).await?,
            )),
        }
    }

    pub fn backend_kind(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "sqlite",
            Self::Postgres(_) => "postgres",
        }
    }

    pub fn host(&self) -> String {
        match self {
            Self::Sqlite(store) => store.path().display().to_string(),
            Self::Postgres(store) => store.host().to_string(),
        }
    }

    pub async fn reachable(&self) -> bool {
        match self {
            Self::Sqlite(store) => store.reachable().await,
            Self::Postgres(store) => store.reachable().await,
        }
    }

    pub async fn upsert_chat(
        &self,
        jid: &str,
        name: Option<&str>,
        last_message_time: DateTime<Utc>,
    ) -> Result<()> {
        match self {
            Self::Sqlite(store) => store.upsert_chat(jid, name, last_message_time).await,
            Self::Postgres(store) => store.upsert_chat(jid, name, last_message_time).await,
        }
    }

    pub async fn upsert_message(&self, message: &StoredMessage) -> Result<()> {
        match self {
            Self::Sqlite(store) => store.upsert_message(message).await,
            Self::Postgres(store) => store.upsert_message(message).await,
        }
    }

    pub async fn rename_chat(&self, jid: &str, name: &str) -> Result<()> {
        match self {
            Self::Sqlite(store) => store.rename_chat(jid, name).await,
            Self::Postgres(store) => store.rename_chat(jid, name).await,
        }
    }

    pub async fn get_chats(&self) -> Result<Vec<Chat>> {
        match self {
            Self::Sqlite(store) => store.get_chats().await,
            Self::Postgres(store) => store.get_chats().await,
        }
    }

    pub async fn get_messages(&self, chat_jid: &str, limit: u32) -> Result<Vec<StoredMessage>> {
        match self {
            Self::Sqlite(store) => store.get_messages(chat_jid, limit).await,
            Self::Postgres(store) => store.get_messages(chat_jid, limit).await,
        }
    }

    pub async fn get_media_info(&self, id: &str, chat_jid: &str) -> Result<MediaRef> {
        match self {
            Self::Sqlite(store) => store.get_media_info(id, chat_jid).await,
            Self::Postgres(store) => store.get_media_info(id, chat_jid).await,
        }
    }

    pub async fn get_media_type_and_filename(
        &self,
        id: &str,
        chat_jid: &str,
    ) -> Result<(MediaKind, Option<String>)> {
        match self {
            Self::Sqlite(store) => store.get_media_type_and_filename(id, chat_jid).await,
            Self::Postgres(store) => store.get_media_type_and_filename(id, chat_jid).await,
        }
    }

    #[allow(clippy::too_many_arguments)]
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
        match self {
            Self::Sqlite(store) => {
                store
                    .update_media_info(
                        id,
                        chat_jid,
                        url,
                        media_key,
                        file_sha256,
                        file_enc_sha256,
                        file_length,
                    )
                    .await
            }
            Self::Postgres(store) => {
                store
                    .update_media_info(
                        id,
                        chat_jid,
                        url,
                        media_key,
                        file_sha256,
                        file_enc_sha256,
                        file_length,
                    )
                    .await
            }
        }
    }

    pub async fn count_messages(&self) -> Result<u64> {
        match self {
            Self::Sqlite(store) => store.count_messages().await,
            Self::Postgres(store) => store.count_messages().await,
        }
    }

    pub async fn count_chats(&self) -> Result<u64> {
        match self {
            Self::Sqlite(store) => store.count_chats().await,
            Self::Postgres(store) => store.count_chats().await,
        }
    }

    pub async fn size_bytes(&self) -> Result<u64> {
        match self {
            Self::Sqlite(store) => store.size_bytes().await,
            Self::Postgres(store) => store.size_bytes().await,
        }
    }
}

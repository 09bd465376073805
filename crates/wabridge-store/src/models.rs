use chrono::{DateTime, Utc};
use wabridge_proto::MediaRef;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    pub jid: String,
    pub name: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
}

/// A message row. Keyed on `(id, chat_jid)`; `media` is present iff the
/// source message carried an attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: String,
    pub chat_jid: String,
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_from_me: bool,
    pub media: Option<MediaRef>,
}

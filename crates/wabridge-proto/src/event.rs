use chrono::{DateTime, Utc};

use crate::content::MessageContent;
use crate::jid::Jid;

/// Events pushed by the protocol engine into the bridge's bounded queue.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A fresh pairing QR code was issued. Supersedes any previous one.
    Qr { code: String },
    /// The device was linked to an account.
    PairSuccess { jid: Jid },
    /// The socket is up and authenticated.
    Connected,
    /// The socket dropped; the lifecycle owner schedules a reconnect.
    Disconnected { reason: String },
    /// The account was unlinked remotely; pairing is required again.
    LoggedOut,
    /// A live message, incoming or our own echo.
    Message(Box<MessageEvent>),
    /// A bulk batch of past conversations delivered after pairing.
    HistorySync(HistorySync),
    /// A chat changed its display name.
    ChatRenamed { jid: Jid, name: String },
}

/// A single message as delivered by the engine.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub id: String,
    pub chat: Jid,
    pub sender: Jid,
    pub from_me: bool,
    pub timestamp: DateTime<Utc>,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Default)]
pub struct HistorySync {
    pub conversations: Vec<Conversation>,
}

/// One conversation push inside a history sync batch. Message order within
/// the batch is not guaranteed.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub jid: Jid,
    pub name: Option<String>,
    pub messages: Vec<MessageEvent>,
}

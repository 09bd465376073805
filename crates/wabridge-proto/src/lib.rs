pub mod content;
pub mod event;
pub mod jid;
pub mod media;
pub mod payload;
pub mod transport;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use content::{MediaPart, MessageContent};
pub use event::{ClientEvent, Conversation, HistorySync, MessageEvent};
pub use jid::{Jid, JidError};
pub use media::{extract_direct_path, MediaKind, MediaRef, UploadedMedia};
pub use payload::{OutgoingPayload, SendReceipt};
pub use transport::{Detached, Transport, TransportError, EVENT_QUEUE_DEPTH};

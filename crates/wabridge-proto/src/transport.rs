use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::event::ClientEvent;
use crate::jid::Jid;
use crate::media::{MediaKind, MediaRef, UploadedMedia};
use crate::payload::{OutgoingPayload, SendReceipt};

/// Depth of the engine-to-bridge event queue. When the queue is full the
/// engine blocks; events are never dropped.
pub const EVENT_QUEUE_DEPTH: usize = 1024;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("client is not connected")]
    NotConnected,

    #[error("no paired device")]
    NotAuthenticated,

    #[error("operation timed out")]
    Timeout,

    #[error("media decrypt failed: {0}")]
    Decrypt(String),

    #[error("media upload failed: {0}")]
    Upload(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("protocol failure: {0}")]
    Protocol(String),
}

/// Contract the bridge asks of the WhatsApp protocol engine.
///
/// The engine owns the socket, the noise/ratchet machinery and the session
/// tables; the bridge owns everything around it. Events flow through the
/// sender handed to [`Transport::connect`]; all other calls are
/// request/response.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open the connection (or begin pairing when no device exists) and
    /// start delivering events on `events`.
    async fn connect(&self, events: mpsc::Sender<ClientEvent>) -> Result<(), TransportError>;

    /// Close the socket. Idempotent.
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// JID of the paired device, when one exists.
    fn device_jid(&self) -> Option<Jid>;

    /// Dispatch an outgoing message and await the server acknowledgment.
    async fn send(&self, to: &Jid, payload: OutgoingPayload)
        -> Result<SendReceipt, TransportError>;

    /// Encrypt and upload a blob to the media CDN.
    async fn upload(&self, kind: MediaKind, data: Vec<u8>)
        -> Result<UploadedMedia, TransportError>;

    /// Fetch and decrypt a media blob by reference.
    async fn download(&self, media: &MediaRef) -> Result<Vec<u8>, TransportError>;
}

/// Transport used when the bridge runs without a linked protocol engine.
///
/// The process stays up and serves its HTTP surface; every protocol
/// operation reports `NotConnected`. Useful for store/API smoke runs and as
/// the placeholder until an engine is attached.
#[derive(Default)]
pub struct Detached {
    // Held so the event queue stays open and the consumer parks on recv.
    events: tokio::sync::Mutex<Option<mpsc::Sender<ClientEvent>>>,
}

impl Detached {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for Detached {
    async fn connect(&self, events: mpsc::Sender<ClientEvent>) -> Result<(), TransportError> {
        *self.events.lock().await = Some(events);
        Ok(())
    }

    async fn disconnect(&self) {}

    fn is_connected(&self) -> bool {
        false
    }

    fn device_jid(&self) -> Option<Jid> {
        None
    }

    async fn send(
        &self,
        _to: &Jid,
        _payload: OutgoingPayload,
    ) -> Result<SendReceipt, TransportError> {
        Err(TransportError::NotConnected)
    }

    async fn upload(
        &self,
        _kind: MediaKind,
        _data: Vec<u8>,
    ) -> Result<UploadedMedia, TransportError> {
        Err(TransportError::NotConnected)
    }

    async fn download(&self, _media: &MediaRef) -> Result<Vec<u8>, TransportError> {
        Err(TransportError::NotConnected)
    }
}

//! Scripted in-memory transport for tests.
//!
//! Lets a test drive the bridge end to end: emit pairing and message events,
//! capture what the bridge sends, and serve media blobs for download.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

use crate::event::ClientEvent;
use crate::jid::Jid;
use crate::media::{extract_direct_path, MediaKind, MediaRef, UploadedMedia};
use crate::payload::{OutgoingPayload, SendReceipt};
use crate::transport::{Transport, TransportError};

/// A message captured by [`MockTransport::send`].
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub to: Jid,
    pub payload: OutgoingPayload,
}

#[derive(Default)]
struct Inner {
    connected: AtomicBool,
    connects: AtomicU64,
    device: Mutex<Option<Jid>>,
    events: Mutex<Option<mpsc::Sender<ClientEvent>>>,
    sent: Mutex<Vec<SentMessage>>,
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    fail_next_send: Mutex<Option<TransportError>>,
    next_id: AtomicU64,
}

#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that already has a paired device.
    pub fn paired(jid: Jid) -> Self {
        let transport = Self::new();
        *transport.inner.device.lock().unwrap() = Some(jid);
        transport
    }

    /// Push an event into the bridge, as the engine would.
    pub async fn emit(&self, event: ClientEvent) {
        let sender = self
            .inner
            .events
            .lock()
            .unwrap()
            .clone()
            .expect("mock transport not connected");
        sender.send(event).await.expect("event queue closed");
    }

    /// Complete pairing: records the device and emits `PairSuccess`.
    pub async fn pair(&self, jid: Jid) {
        *self.inner.device.lock().unwrap() = Some(jid.clone());
        self.emit(ClientEvent::PairSuccess { jid }).await;
    }

    /// Register a blob served by [`Transport::download`] for `media_ref`s
    /// whose URL matches.
    pub fn serve_blob(&self, url: impl Into<String>, data: Vec<u8>) {
        self.inner.blobs.lock().unwrap().insert(url.into(), data);
    }

    /// Make the next `send` fail with `err`.
    pub fn fail_next_send(&self, err: TransportError) {
        *self.inner.fail_next_send.lock().unwrap() = Some(err);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.inner.sent.lock().unwrap().clone()
    }

    /// How many times [`Transport::connect`] ran; lets tests observe
    /// reconnects.
    pub fn connect_count(&self) -> u64 {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Deterministic upload metadata for `data`, also registering the blob
    /// for download round trips.
    pub fn upload_result(data: &[u8]) -> UploadedMedia {
        let file_sha256 = Sha256::digest(data).to_vec();
        let file_enc_sha256 = Sha256::digest(&file_sha256).to_vec();
        let url = format!(
            "https://mmg.whatsapp.net/v/t62.7118-24/{}_n.enc?ccb=11-4&oh=mock",
            hex::encode(&file_sha256[..16])
        );
        UploadedMedia {
            direct_path: extract_direct_path(&url),
            url,
            media_key: file_sha256.iter().rev().copied().collect(),
            file_sha256,
            file_enc_sha256,
            file_length: data.len() as u64,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, events: mpsc::Sender<ClientEvent>) -> Result<(), TransportError> {
        *self.inner.events.lock().unwrap() = Some(events.clone());
        self.inner.connected.store(true, Ordering::SeqCst);
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        events
            .send(ClientEvent::Connected)
            .await
            .map_err(|_| TransportError::NotConnected)?;
        Ok(())
    }

    async fn disconnect(&self) {
        self.inner.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn device_jid(&self) -> Option<Jid> {
        self.inner.device.lock().unwrap().clone()
    }

    async fn send(
        &self,
        to: &Jid,
        payload: OutgoingPayload,
    ) -> Result<SendReceipt, TransportError> {
        if let Some(err) = self.inner.fail_next_send.lock().unwrap().take() {
            return Err(err);
        }
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.inner.sent.lock().unwrap().push(SentMessage {
            to: to.clone(),
            payload,
        });
        let n = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(SendReceipt {
            message_id: format!("3EB0MOCK{n:08X}"),
            timestamp: Utc::now(),
        })
    }

    async fn upload(
        &self,
        _kind: MediaKind,
        data: Vec<u8>,
    ) -> Result<UploadedMedia, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let uploaded = Self::upload_result(&data);
        self.serve_blob(uploaded.url.clone(), data);
        Ok(uploaded)
    }

    async fn download(&self, media: &MediaRef) -> Result<Vec<u8>, TransportError> {
        self.inner
            .blobs
            .lock()
            .unwrap()
            .get(&media.url)
            .cloned()
            .ok_or_else(|| TransportError::Decrypt("no ciphertext at media url".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::EVENT_QUEUE_DEPTH;

    #[tokio::test]
    async fn connect_emits_connected() {
        let transport = MockTransport::new();
        let (tx, mut rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        transport.connect(tx).await.unwrap();
        assert!(matches!(rx.recv().await, Some(ClientEvent::Connected)));
        assert!(transport.is_connected());
    }

    #[tokio::test]
    async fn upload_then_download_round_trips() {
        let transport = MockTransport::new();
        let (tx, _rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        transport.connect(tx).await.unwrap();

        let data = b"jpeg bytes".to_vec();
        let uploaded = transport.upload(MediaKind::Image, data.clone()).await.unwrap();
        assert_eq!(uploaded.file_length, data.len() as u64);
        assert!(uploaded.direct_path.starts_with('/'));

        let media = MediaRef {
            kind: MediaKind::Image,
            filename: None,
            url: uploaded.url.clone(),
            media_key: uploaded.media_key.clone(),
            file_sha256: uploaded.file_sha256.clone(),
            file_enc_sha256: uploaded.file_enc_sha256.clone(),
            file_length: uploaded.file_length,
        };
        assert_eq!(transport.download(&media).await.unwrap(), data);
    }

    #[tokio::test]
    async fn send_requires_connection() {
        let transport = MockTransport::new();
        let err = transport
            .send(
                &Jid::new("1555", "s.whatsapp.net"),
                OutgoingPayload::Text { body: "hi".into() },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }
}

//! Outgoing message pipeline.
//!
//! Ordering contract: the local message row is written only after the engine
//! acknowledges the send. A store failure after a confirmed send is logged
//! and flagged on the health view, but the caller still gets success: the
//! network message is out either way.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{error, info};
use wabridge_media::{caps, detect, voice, waveform};
use wabridge_proto::jid::normalize_recipient;
use wabridge_proto::{Jid, MediaKind, MediaRef, OutgoingPayload, SendReceipt, Transport, UploadedMedia};
use wabridge_store::{MessageStore, StoredMessage};

use crate::error::{ApiError, ErrorKind};
use crate::health::HealthState;

const SEND_DEADLINE: Duration = Duration::from_secs(30);
const UPLOAD_DEADLINE: Duration = Duration::from_secs(120);

pub struct SendEngine {
    transport: Arc<dyn Transport>,
    store: Arc<MessageStore>,
    health: Arc<HealthState>,
    /// Scratch directory for voice transcoding output.
    work_dir: PathBuf,
}

impl SendEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<MessageStore>,
        health: Arc<HealthState>,
        media_root: &Path,
    ) -> Self {
        Self {
            transport,
            store,
            health,
            work_dir: media_root.join("voice-tmp"),
        }
    }

    pub async fn send_text(&self, recipient: &str, text: &str) -> Result<String, ApiError> {
        let to = parse_recipient(recipient)?;
        let payload = OutgoingPayload::Text {
            body: text.to_string(),
        };
        let receipt = self.dispatch(&to, payload).await?;

        self.persist(&to, &receipt, text.to_string(), None).await;
        Ok(receipt.message_id)
    }

    pub async fn send_file(&self, recipient: &str, path: &str) -> Result<String, ApiError> {
        let to = parse_recipient(recipient)?;
        let path = Path::new(path);
        let data = read_file(path).await?;

        let head = &data[..data.len().min(detect::SNIFF_LEN)];
        let (kind, mime) = detect::detect_kind(path, head);
        check_cap(kind, data.len() as u64)?;

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string());
        info!(
            kind = %kind,
            mime = %mime,
            bytes = data.len(),
            file = %path.display(),
            "uploading outgoing file"
        );

        let local_sha256 = Sha256::digest(&data).to_vec();
        let upload = self.upload(kind, data).await?;
        if upload.file_sha256 != local_sha256 {
            tracing::debug!("upload reported a different plaintext hash than computed locally");
        }

        let payload = OutgoingPayload::Media {
            kind,
            filename: filename.clone(),
            upload: upload.clone(),
        };
        let receipt = self.dispatch(&to, payload).await?;

        let media = media_ref(kind, filename.clone(), &upload);
        self.persist(&to, &receipt, filename.unwrap_or_default(), Some(media))
            .await;
        Ok(receipt.message_id)
    }

    pub async fn send_voice(&self, recipient: &str, path: &str) -> Result<String, ApiError> {
        let to = parse_recipient(recipient)?;

        let converted = voice::ensure_opus_ogg(Path::new(path), &self.work_dir).await?;
        let data = read_file(&converted).await?;
        check_cap(MediaKind::Audio, data.len() as u64)?;

        let duration_secs = voice::ogg_duration_secs(&data)?;
        let preview = waveform::placeholder_waveform(&data);

        let upload = self.upload(MediaKind::Audio, data).await?;
        let payload = OutgoingPayload::Voice {
            upload: upload.clone(),
            duration_secs,
            waveform: preview,
        };
        let receipt = self.dispatch(&to, payload).await?;

        let media = media_ref(MediaKind::Audio, None, &upload);
        self.persist(&to, &receipt, String::new(), Some(media)).await;
        Ok(receipt.message_id)
    }

    async fn upload(&self, kind: MediaKind, data: Vec<u8>) -> Result<UploadedMedia, ApiError> {
        match tokio::time::timeout(UPLOAD_DEADLINE, self.transport.upload(kind, data)).await {
            Ok(result) => result.map_err(ApiError::from),
            Err(_) => Err(ApiError::with_detail(ErrorKind::Timeout, "media upload")),
        }
    }

    async fn dispatch(&self, to: &Jid, payload: OutgoingPayload) -> Result<SendReceipt, ApiError> {
        match tokio::time::timeout(SEND_DEADLINE, self.transport.send(to, payload)).await {
            Ok(result) => result.map_err(ApiError::from),
            Err(_) => Err(ApiError::with_detail(ErrorKind::Timeout, "send acknowledgment")),
        }
    }

    /// Record the sent message. Runs strictly after network success.
    async fn persist(
        &self,
        to: &Jid,
        receipt: &SendReceipt,
        content: String,
        media: Option<MediaRef>,
    ) {
        let chat_jid = to.to_string();
        let sender = self
            .transport
            .device_jid()
            .map(|jid| jid.to_string())
            .unwrap_or_default();
        let row = StoredMessage {
            id: receipt.message_id.clone(),
            chat_jid: chat_jid.clone(),
            sender,
            content,
            timestamp: receipt.timestamp,
            is_from_me: true,
            media,
        };

        let result = async {
            self.store
                .upsert_chat(&chat_jid, None, receipt.timestamp)
                .await?;
            self.store.upsert_message(&row).await
        }
        .await;

        if let Err(err) = result {
            // The message is already on the wire; surface on health only.
            error!(error = %err, id = %receipt.message_id, "failed to record sent message");
            self.health.record_error(err.to_string()).await;
        }
    }
}

fn parse_recipient(recipient: &str) -> Result<Jid, ApiError> {
    normalize_recipient(recipient)
        .map_err(|err| ApiError::with_detail(ErrorKind::InvalidRecipient, err.to_string()))
}

fn check_cap(kind: MediaKind, size: u64) -> Result<(), ApiError> {
    let cap = caps::size_cap(kind);
    if size > cap {
        return Err(ApiError::with_detail(
            ErrorKind::TooLarge,
            format!("{size} bytes exceeds the {cap} byte cap for {kind}"),
        ));
    }
    Ok(())
}

async fn read_file(path: &Path) -> Result<Vec<u8>, ApiError> {
    tokio::fs::read(path)
        .await
        .map_err(|err| ApiError::with_detail(ErrorKind::IOFailed, format!("{}: {err}", path.display())))
}

fn media_ref(kind: MediaKind, filename: Option<String>, upload: &UploadedMedia) -> MediaRef {
    MediaRef {
        kind,
        filename,
        url: upload.url.clone(),
        media_key: upload.media_key.clone(),
        file_sha256: upload.file_sha256.clone(),
        file_enc_sha256: upload.file_enc_sha256.clone(),
        file_length: upload.file_length,
    }
}

use chrono::{DateTime, Utc};

use crate::media::{MediaKind, UploadedMedia};

/// An outgoing message, built by the send engine and handed to the
/// protocol engine for dispatch.
#[derive(Debug, Clone)]
pub enum OutgoingPayload {
    Text {
        body: String,
    },
    Media {
        kind: MediaKind,
        filename: Option<String>,
        upload: UploadedMedia,
    },
    /// A push-to-talk voice note: Opus-in-Ogg with a waveform preview.
    Voice {
        upload: UploadedMedia,
        duration_secs: u32,
        waveform: [u8; 64],
    },
}

/// Acknowledgment returned by the engine after a successful send.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
}

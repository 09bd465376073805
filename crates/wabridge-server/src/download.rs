//! On-demand media download.
//!
//! Rebuilds the minimal reference the engine needs from the stored
//! descriptor, downloads the plaintext, and lands it atomically under
//! `<media-root>/<chat_jid>/<message_id>.<ext>`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use wabridge_media::detect;
use wabridge_proto::transport::TransportError;
use wabridge_proto::Transport;
use wabridge_store::MessageStore;

use crate::error::{ApiError, ErrorKind};

const DOWNLOAD_DEADLINE: Duration = Duration::from_secs(60);

pub async fn download_media(
    store: &MessageStore,
    transport: &Arc<dyn Transport>,
    media_root: &Path,
    message_id: &str,
    chat_jid: &str,
) -> Result<PathBuf, ApiError> {
    // Cheap existence/media check before pulling the full descriptor.
    let (kind, _) = store
        .get_media_type_and_filename(message_id, chat_jid)
        .await?;

    let media = store.get_media_info(message_id, chat_jid).await?;
    debug!(
        id = %message_id,
        chat = %chat_jid,
        kind = %kind,
        direct_path = %media.direct_path(),
        "downloading media by reference"
    );

    let data = fetch_with_retry(transport, &media).await?;

    let extension = detect::file_extension(media.kind, media.filename.as_deref());
    let dir = media_root.join(chat_jid);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|err| ApiError::with_detail(ErrorKind::IOFailed, err.to_string()))?;

    let final_path = dir.join(format!("{message_id}.{extension}"));
    let tmp_path = dir.join(format!(".{message_id}.{extension}.tmp"));
    tokio::fs::write(&tmp_path, &data)
        .await
        .map_err(|err| ApiError::with_detail(ErrorKind::IOFailed, err.to_string()))?;
    tokio::fs::rename(&tmp_path, &final_path)
        .await
        .map_err(|err| ApiError::with_detail(ErrorKind::IOFailed, err.to_string()))?;

    let absolute = std::fs::canonicalize(&final_path)
        .map_err(|err| ApiError::with_detail(ErrorKind::IOFailed, err.to_string()))?;
    info!(
        id = %message_id,
        chat = %chat_jid,
        path = %absolute.display(),
        bytes = data.len(),
        "media downloaded"
    );
    Ok(absolute)
}

/// One retry on timeout before surfacing it; other failures surface
/// immediately.
async fn fetch_with_retry(
    transport: &Arc<dyn Transport>,
    media: &wabridge_proto::MediaRef,
) -> Result<Vec<u8>, ApiError> {
    for attempt in 0..2 {
        match tokio::time::timeout(DOWNLOAD_DEADLINE, transport.download(media)).await {
            Ok(Ok(data)) => return Ok(data),
            Ok(Err(TransportError::Timeout)) | Err(_) if attempt == 0 => {
                debug!("media download timed out, retrying once");
            }
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => return Err(ApiError::with_detail(ErrorKind::Timeout, "media download")),
        }
    }
    Err(ApiError::with_detail(ErrorKind::Timeout, "media download"))
}

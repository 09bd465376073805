//! Content-type detection for outgoing files.
//!
//! Sniffs magic bytes from the head of the file first, then falls back to
//! the extension. Anything unrecognized sends as a document.

use std::path::Path;

use wabridge_proto::MediaKind;

/// How many bytes of the file head the sniffer looks at.
pub const SNIFF_LEN: usize = 512;

/// Classify a file from its head bytes and path.
pub fn detect_kind(path: &Path, head: &[u8]) -> (MediaKind, String) {
    if let Some((kind, mime)) = sniff(head) {
        return (kind, mime.to_string());
    }

    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let kind = match mime.type_().as_str() {
        "image" => MediaKind::Image,
        "video" => MediaKind::Video,
        "audio" => MediaKind::Audio,
        _ => MediaKind::Document,
    };
    (kind, mime.essence_str().to_string())
}

fn sniff(head: &[u8]) -> Option<(MediaKind, &'static str)> {
    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some((MediaKind::Image, "image/jpeg"));
    }
    if head.starts_with(&[0x89, b'P', b'N', b'G']) {
        return Some((MediaKind::Image, "image/png"));
    }
    if head.starts_with(b"GIF8") {
        return Some((MediaKind::Image, "image/gif"));
    }
    if head.len() >= 12 && head.starts_with(b"RIFF") {
        if &head[8..12] == b"WEBP" {
            return Some((MediaKind::Image, "image/webp"));
        }
        if &head[8..12] == b"WAVE" {
            return Some((MediaKind::Audio, "audio/wav"));
        }
    }
    if head.len() >= 8 && &head[4..8] == b"ftyp" {
        return Some((MediaKind::Video, "video/mp4"));
    }
    if head.starts_with(b"OggS") {
        return Some((MediaKind::Audio, "audio/ogg"));
    }
    if head.starts_with(b"ID3") || (head.len() >= 2 && head[0] == 0xFF && head[1] & 0xE0 == 0xE0) {
        return Some((MediaKind::Audio, "audio/mpeg"));
    }
    None
}

/// File extension used when persisting a downloaded blob.
///
/// Documents keep the extension of their carried filename when one exists.
pub fn file_extension(kind: MediaKind, filename: Option<&str>) -> String {
    match kind {
        MediaKind::Image => "jpg".into(),
        MediaKind::Video => "mp4".into(),
        MediaKind::Audio => "ogg".into(),
        MediaKind::Sticker => "webp".into(),
        MediaKind::Document => filename
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| "bin".into()),
    }
}

use serde::{Deserialize, Serialize};

/// Kind of media attached to a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
    Sticker,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
            MediaKind::Sticker => "sticker",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            "audio" => Some(MediaKind::Audio),
            "document" => Some(MediaKind::Document),
            "sticker" => Some(MediaKind::Sticker),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to re-download and decrypt a media blob by reference.
///
/// The decryption key lives only here (and in the message row persisting it);
/// downloaded plaintext never carries it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub filename: Option<String>,
    pub url: String,
    pub media_key: Vec<u8>,
    pub file_sha256: Vec<u8>,
    pub file_enc_sha256: Vec<u8>,
    pub file_length: u64,
}

impl MediaRef {
    /// CDN-relative path used when re-requesting the blob by reference.
    pub fn direct_path(&self) -> String {
        extract_direct_path(&self.url)
    }
}

/// Result of uploading a blob to the media CDN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    pub url: String,
    pub direct_path: String,
    pub media_key: Vec<u8>,
    pub file_sha256: Vec<u8>,
    pub file_enc_sha256: Vec<u8>,
    pub file_length: u64,
}

/// Strip scheme, host and query from a media CDN URL, leaving the
/// `/`-prefixed direct path. Applying it to an existing direct path is a
/// no-op.
pub fn extract_direct_path(url: &str) -> String {
    let after_host = match url.find("://") {
        Some(idx) => {
            let rest = &url[idx + 3..];
            match rest.find('/') {
                Some(slash) => &rest[slash..],
                None => "/",
            }
        }
        None => url,
    };
    match after_host.find('?') {
        Some(q) => after_host[..q].to_string(),
        None => after_host.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CDN_URL: &str = "https://mmg.whatsapp.net/v/t62.7118-24/13812002_698058036224062_3424455886509161511_n.enc?ccb=11-4&oh=abc";

    #[test]
    fn direct_path_strips_host_and_query() {
        let dp = extract_direct_path(CDN_URL);
        assert_eq!(
            dp,
            "/v/t62.7118-24/13812002_698058036224062_3424455886509161511_n.enc"
        );
        assert!(dp.starts_with('/'));
        assert!(dp.len() < CDN_URL.len());
    }

    #[test]
    fn direct_path_is_fixpoint() {
        let once = extract_direct_path(CDN_URL);
        let twice = extract_direct_path(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn direct_path_of_bare_host() {
        assert_eq!(extract_direct_path("https://mmg.whatsapp.net"), "/");
    }

    #[test]
    fn media_kind_round_trip() {
        for kind in [
            MediaKind::Image,
            MediaKind::Video,
            MediaKind::Audio,
            MediaKind::Document,
            MediaKind::Sticker,
        ] {
            assert_eq!(MediaKind::from_str_opt(kind.as_str()), Some(kind));
        }
        assert_eq!(MediaKind::from_str_opt(""), None);
        assert_eq!(MediaKind::from_str_opt("gif"), None);
    }
}

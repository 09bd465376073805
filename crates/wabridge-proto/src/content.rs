use crate::media::{MediaKind, MediaRef};

/// One media slot of a protocol message, as handed over by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaPart {
    pub caption: Option<String>,
    pub filename: Option<String>,
    pub url: String,
    pub media_key: Vec<u8>,
    pub file_sha256: Vec<u8>,
    pub file_enc_sha256: Vec<u8>,
    pub file_length: u64,
}

impl MediaPart {
    fn to_ref(&self, kind: MediaKind) -> MediaRef {
        MediaRef {
            kind,
            filename: self.filename.clone(),
            url: self.url.clone(),
            media_key: self.media_key.clone(),
            file_sha256: self.file_sha256.clone(),
            file_enc_sha256: self.file_enc_sha256.clone(),
            file_length: self.file_length,
        }
    }
}

/// Structural view of a protocol message body.
///
/// Mirrors the variant layout of the wire message: at most one of the media
/// slots is populated, and text can arrive as plain conversation text, an
/// extended text block, or a caption on a media slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageContent {
    pub conversation: Option<String>,
    pub extended_text: Option<String>,
    pub image: Option<MediaPart>,
    pub video: Option<MediaPart>,
    pub audio: Option<MediaPart>,
    pub document: Option<MediaPart>,
    pub sticker: Option<MediaPart>,
}

impl MessageContent {
    pub fn text_message(body: impl Into<String>) -> Self {
        Self {
            conversation: Some(body.into()),
            ..Self::default()
        }
    }

    /// Textual content: the first non-empty of conversation text, extended
    /// text, then image/video/document caption. Empty when none apply.
    pub fn text(&self) -> String {
        let candidates = [
            self.conversation.as_deref(),
            self.extended_text.as_deref(),
            self.image.as_ref().and_then(|m| m.caption.as_deref()),
            self.video.as_ref().and_then(|m| m.caption.as_deref()),
            self.document.as_ref().and_then(|m| m.caption.as_deref()),
        ];
        candidates
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .unwrap_or_default()
            .to_string()
    }

    /// Media descriptor, inspecting slots in fixed priority: image, video,
    /// audio, document, sticker.
    pub fn media(&self) -> Option<MediaRef> {
        let slots = [
            (MediaKind::Image, self.image.as_ref()),
            (MediaKind::Video, self.video.as_ref()),
            (MediaKind::Audio, self.audio.as_ref()),
            (MediaKind::Document, self.document.as_ref()),
            (MediaKind::Sticker, self.sticker.as_ref()),
        ];
        slots
            .into_iter()
            .find_map(|(kind, part)| part.map(|p| p.to_ref(kind)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(caption: Option<&str>) -> MediaPart {
        MediaPart {
            caption: caption.map(String::from),
            url: "https://mmg.whatsapp.net/v/x.enc?oh=1".into(),
            media_key: vec![1; 32],
            file_sha256: vec![2; 32],
            file_enc_sha256: vec![3; 32],
            file_length: 10,
            ..MediaPart::default()
        }
    }

    #[test]
    fn text_prefers_conversation() {
        let content = MessageContent {
            conversation: Some("hello".into()),
            extended_text: Some("ignored".into()),
            ..MessageContent::default()
        };
        assert_eq!(content.text(), "hello");
    }

    #[test]
    fn text_skips_empty_candidates() {
        let content = MessageContent {
            conversation: Some(String::new()),
            image: Some(part(Some("the caption"))),
            ..MessageContent::default()
        };
        assert_eq!(content.text(), "the caption");
    }

    #[test]
    fn text_empty_when_nothing_set() {
        assert_eq!(MessageContent::default().text(), "");
    }

    #[test]
    fn media_priority_is_fixed() {
        let content = MessageContent {
            video: Some(part(None)),
            document: Some(part(None)),
            ..MessageContent::default()
        };
        assert_eq!(content.media().unwrap().kind, MediaKind::Video);
    }

    #[test]
    fn media_none_for_text_only() {
        assert!(MessageContent::text_message("hi").media().is_none());
    }

    #[test]
    fn media_carries_document_filename() {
        let mut doc = part(None);
        doc.filename = Some("report.pdf".into());
        let content = MessageContent {
            document: Some(doc),
            ..MessageContent::default()
        };
        let media = content.media().unwrap();
        assert_eq!(media.kind, MediaKind::Document);
        assert_eq!(media.filename.as_deref(), Some("report.pdf"));
    }
}

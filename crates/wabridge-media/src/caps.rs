use wabridge_proto::MediaKind;

const MIB: u64 = 1024 * 1024;

/// Per-type upload size caps enforced before any bytes leave the machine.
pub fn size_cap(kind: MediaKind) -> u64 {
    match kind {
        MediaKind::Image => 16 * MIB,
        MediaKind::Video => 64 * MIB,
        MediaKind::Audio => 16 * MIB,
        MediaKind::Document => 2048 * MIB,
        MediaKind::Sticker => MIB,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_have_the_largest_cap() {
        for kind in [
            MediaKind::Image,
            MediaKind::Video,
            MediaKind::Audio,
            MediaKind::Sticker,
        ] {
            assert!(size_cap(kind) < size_cap(MediaKind::Document));
        }
    }
}

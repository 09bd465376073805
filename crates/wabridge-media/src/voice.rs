//! Voice-note transcoding.
//!
//! WhatsApp voice notes are Opus in an Ogg container, mono, 48kHz. Anything
//! else is piped through out-of-process ffmpeg. Duration comes from the last
//! Ogg page's granule position, which for Opus counts 48kHz samples.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::MediaError;

/// Opus sample clock, fixed by the codec regardless of input rate.
const OPUS_CLOCK_HZ: u64 = 48_000;

const FFMPEG_DEADLINE: Duration = Duration::from_secs(60);

/// Whether a file head already looks like Opus-in-Ogg.
///
/// The OpusHead capture pattern sits in the first page, well inside the
/// sniff window.
pub fn is_opus_ogg(head: &[u8]) -> bool {
    head.starts_with(b"OggS") && head.windows(8).any(|w| w == b"OpusHead")
}

/// Return a path to an Opus-in-Ogg rendition of `input`, transcoding into
/// `work_dir` when needed.
pub async fn ensure_opus_ogg(input: &Path, work_dir: &Path) -> Result<PathBuf, MediaError> {
    let head = read_head(input).await?;
    if is_opus_ogg(&head) {
        return Ok(input.to_path_buf());
    }

    tokio::fs::create_dir_all(work_dir).await?;
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("voice");
    let output = work_dir.join(format!("{stem}.ogg"));

    transcode(input, &output).await?;
    Ok(output)
}

async fn read_head(path: &Path) -> Result<Vec<u8>, MediaError> {
    use tokio::io::AsyncReadExt;

    let mut file = tokio::fs::File::open(path).await?;
    let mut head = vec![0u8; crate::detect::SNIFF_LEN];
    let mut filled = 0;
    while filled < head.len() {
        let n = file.read(&mut head[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    head.truncate(filled);
    Ok(head)
}

async fn transcode(input: &Path, output: &Path) -> Result<(), MediaError> {
    tracing::debug!(input = %input.display(), output = %output.display(), "transcoding voice note");

    let child = Command::new("ffmpeg")
        .arg("-y")
        .arg("-i")
        .arg(input)
        .args(["-c:a", "libopus", "-b:a", "16k", "-ac", "1", "-ar", "48000", "-f", "ogg"])
        .arg(output)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(MediaError::VoiceConversionUnavailable);
        }
        Err(e) => return Err(e.into()),
    };

    let result = tokio::time::timeout(FFMPEG_DEADLINE, child.wait_with_output()).await;
    let output_status = match result {
        Ok(status) => status?,
        Err(_) => return Err(MediaError::Timeout),
    };

    if !output_status.status.success() {
        let stderr = String::from_utf8_lossy(&output_status.stderr);
        let tail: String = stderr
            .lines()
            .rev()
            .take(3)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join("; ");
        return Err(MediaError::Ffmpeg(tail));
    }
    Ok(())
}

/// Duration of an Ogg Opus file, rounded up to whole seconds.
pub fn ogg_duration_secs(data: &[u8]) -> Result<u32, MediaError> {
    if !data.starts_with(b"OggS") {
        return Err(MediaError::InvalidAudio("missing OggS capture".into()));
    }

    // Granule position lives at byte 6 of each page header; the last page's
    // value is the total sample count.
    let mut last_granule: Option<u64> = None;
    let mut offset = 0;
    while let Some(pos) = find_page(data, offset) {
        if pos + 14 > data.len() {
            break;
        }
        let mut granule = [0u8; 8];
        granule.copy_from_slice(&data[pos + 6..pos + 14]);
        let granule = u64::from_le_bytes(granule);
        // -1 marks a page with no completed packet.
        if granule != u64::MAX {
            last_granule = Some(granule);
        }
        offset = pos + 4;
    }

    let samples =
        last_granule.ok_or_else(|| MediaError::InvalidAudio("no completed Ogg page".into()))?;
    Ok(samples.div_ceil(OPUS_CLOCK_HZ) as u32)
}

fn find_page(data: &[u8], from: usize) -> Option<usize> {
    data.get(from..)?
        .windows(4)
        .position(|w| w == b"OggS")
        .map(|p| p + from)
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ffmpeg is not available on PATH")]
    VoiceConversionUnavailable,

    #[error("ffmpeg failed: {0}")]
    Ffmpeg(String),

    #[error("conversion timed out")]
    Timeout,

    #[error("file is {size} bytes, above the {cap} byte cap for {kind}")]
    TooLarge {
        kind: &'static str,
        size: u64,
        cap: u64,
    },

    #[error("not a valid Ogg stream: {0}")]
    InvalidAudio(String),
}

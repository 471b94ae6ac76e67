use thiserror::Error;

/// All errors produced by karaoke-core.
///
/// Only these abort a processing pass. Degraded-but-defined outcomes
/// (strategy fallbacks, clipping, low detector confidence) are reported as
/// [`crate::events::Notice`] values instead.
#[derive(Debug, Error)]
pub enum KaraokeError {
    #[error("invalid audio: {0}")]
    InvalidAudio(String),

    #[error("resampler error: {0}")]
    Resampler(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("chunk out of order: expected {expected}, got {got}")]
    OutOfOrder { expected: usize, got: usize },

    #[error("processing cancelled after {chunks_done} chunks")]
    Cancelled { chunks_done: usize },

    #[error("engine is already processing")]
    AlreadyRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, KaraokeError>;

//! Engine error taxonomy.
//!
//! Service backends report failures as [`anyhow::Error`] with context; the engine folds them
//! into one of these categories so callers can react (for example "unsupported file" versus
//! "no output device") without string matching.

use thiserror::Error;

/// Errors returned by [`crate::engine::PlaybackEngine`] operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input bytes or file could not be used at all.
    #[error("invalid input: {0}")]
    Input(String),

    /// Container parsed but the stream is not the supported profile.
    #[error("unsupported stream: {0}")]
    Format(String),

    /// A buffer reservation failed.
    #[error("out of memory reserving {bytes} bytes for {what}")]
    OutOfMemory { what: &'static str, bytes: usize },

    /// Codec session could not be opened or a block failed to convert.
    #[error("codec failure: {0}")]
    Codec(String),

    /// Output device could not be opened or driven.
    #[error("output device failure: {0}")]
    Device(String),

    #[error("no track is open")]
    NotOpen,

    #[error("decoded PCM buffer is empty")]
    EmptyBuffer,
}

impl EngineError {
    pub(crate) fn format(err: anyhow::Error) -> Self {
        Self::Format(format!("{err:#}"))
    }

    pub(crate) fn codec(err: anyhow::Error) -> Self {
        Self::Codec(format!("{err:#}"))
    }

    pub(crate) fn device(err: anyhow::Error) -> Self {
        Self::Device(format!("{err:#}"))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

//! Error types for the audio channel.

use thiserror::Error;

/// Main error type for the channel.
#[derive(Error, Debug)]
pub enum Error {
    /// The hardware sink could not be created or configured.
    #[error("sink init error: {0}")]
    SinkInit(String),

    /// The hardware sink failed after creation (play state change, stream error).
    #[error("sink error: {0}")]
    Sink(String),

    /// Codec creation or decoding failed.
    #[error("decode error: {0}")]
    Decode(String),

    /// Sample conversion failed.
    #[error("resample error: {0}")]
    Resample(String),

    /// The input stream cannot be described with a supported layout.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The operation is not valid in the channel's current run state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Demuxing/probing the input failed.
    #[error("source error: {0}")]
    Source(#[from] symphonia::core::errors::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

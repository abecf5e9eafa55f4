//! Error types for the broadcast audio sink
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for the sink
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Radio stack command errors (scan, sink delete, BIS sync)
    #[error("Radio error: {0}")]
    Radio(String),

    /// Frame decoding errors
    #[error("Decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Hardware codec register access errors
    #[error("Codec I/O error: {0}")]
    CodecIo(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using the sink Error
pub type Result<T> = std::result::Result<T, Error>;

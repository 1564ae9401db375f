//! Error types for `AudioSpecificConfig` handling.

use thiserror::Error;

/// Errors that can occur while decoding or encoding an `AudioSpecificConfig`.
#[derive(Error, Debug)]
pub enum AacError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The config is shorter than the two bytes every AAC config carries.
    #[error("AudioSpecificConfig too short: {len} bytes")]
    TooShort {
        /// Number of bytes available.
        len: usize,
    },

    /// The config cannot be expressed in the requested form.
    #[error("unsupported AudioSpecificConfig: {0}")]
    Unsupported(&'static str),
}

/// Result type alias for AAC config operations.
pub type Result<T> = std::result::Result<T, AacError>;

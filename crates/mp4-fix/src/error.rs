use std::io;

use mp4::{BoxType, Mp4Error};
use thiserror::Error;

/// Error type for MP4 rewrite operations
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    #[error("MP4 Error: {0}")]
    Mp4(#[from] Mp4Error),

    #[error("AAC Error: {0}")]
    Aac(#[from] aac::AacError),

    #[error("Unsupported layout: {0}")]
    UnsupportedLayout(String),

    #[error("expected '{expected}' at source offset {offset} while patching, found '{found}'")]
    ChunkOffsetTypeChanged {
        offset: u64,
        expected: BoxType,
        found: BoxType,
    },

    #[error("tracked size delta {tracked} disagrees with stream positions ({actual}) at offset {offset}")]
    DeltaMismatch {
        offset: u64,
        tracked: i64,
        actual: i64,
    },
}

pub type Result<T> = std::result::Result<T, RewriteError>;

use std::io;

use thiserror::Error;

use crate::BoxType;

/// Errors raised while decoding or encoding boxes.
///
/// Everything except [`Mp4Error::Io`] describes a structurally broken or
/// unsupported file; none of them are recoverable mid-rewrite.
#[derive(Error, Debug)]
pub enum Mp4Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("box '{box_type}' declares size {size}, smaller than its {header_size}-byte header")]
    BoxTooSmall {
        box_type: BoxType,
        size: u64,
        header_size: u64,
    },

    #[error("box '{box_type}' at offset {offset} with size {size} extends past its parent end {limit}")]
    BoxOverrun {
        box_type: BoxType,
        offset: u64,
        size: u64,
        limit: u64,
    },

    #[error("box '{box_type}' with size {size} does not fit its 32-bit size field")]
    HeaderOverflow { box_type: BoxType, size: u64 },

    #[error("box '{box_type}' payload is {actual} bytes, expected {expected}")]
    PayloadSizeMismatch {
        box_type: BoxType,
        expected: u64,
        actual: u64,
    },

    #[error("'{0}' is not a chunk offset box")]
    UnknownChunkOffsetBox(BoxType),

    #[error("chunk offset {offset} in '{box_type}' cannot be shifted by {delta}")]
    OffsetOverflow {
        box_type: BoxType,
        offset: u64,
        delta: i64,
    },

    #[error("unsupported '{box_type}' version {version}")]
    UnsupportedVersion { box_type: BoxType, version: u16 },

    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),
}

pub type Result<T> = std::result::Result<T, Mp4Error>;

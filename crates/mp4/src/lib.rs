//! Minimal ISOBMFF (ISO Base Media File Format) box primitives.
//!
//! This crate provides just enough of the box layer to rewrite an MP4 file in
//! a single streaming pass: box headers in all three size forms, the container
//! layouts that lead from `moov` down to the audio sample entries, the
//! `stco`/`co64` chunk-offset tables, and the `esds` descriptor tree.
//! Every other box is expected to be treated as opaque bytes by the caller.
//!
//! ## License
//!
//! MIT License
//!
//! ## Authors
//!
//! - hua0512
//!

pub mod box_utils;
mod chunk_offset;
mod container;
mod error;
mod esds;
mod header;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use chunk_offset::ChunkOffsetBox;
pub use container::ContainerLayout;
pub use error::{Mp4Error, Result};
pub use esds::{
    DECODER_CONFIG_DESCRIPTOR_TAG, DECODER_SPECIFIC_INFO_TAG, Descriptor, DescriptorBody,
    ES_DESCRIPTOR_TAG, EsdsBox, SL_CONFIG_DESCRIPTOR_TAG,
};
pub use header::{BoxInfo, BoxType, COMPACT_HEADER_SIZE, SizeField, fourcc_to_string};

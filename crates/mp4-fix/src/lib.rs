//! MP4 box-tree rewriting library
//!
//! This crate rewrites an MP4 file box by box in a single streaming pass,
//! applying payload edits deep inside the box tree while keeping the file
//! internally consistent: every container size is recomputed and every
//! `stco`/`co64` chunk offset is shifted by the number of bytes the metadata
//! ahead of `mdat` grew or shrank.
//!
//! ## Component Overview
//!
//! - `cursor`: Paired source/destination cursors
//! - `rewriter`: The box-tree walker and file-level entry point
//! - `session`: Per-file size tracking, options and statistics
//! - `patcher`: Seek-back correction of chunk offset tables
//! - `transform`: Payload edits, including AAC SBR signalling

mod cursor;
mod error;
mod patcher;
mod rewriter;
mod session;
mod transform;

pub use cursor::BoxCursors;
pub use error::{Result, RewriteError};
pub use patcher::{ChunkOffsetPatcher, ChunkOffsetRecord};
pub use rewriter::{Mp4Rewriter, rewrite_file};
pub use session::{RewriteOptions, RewriteStats};
pub use transform::{PayloadTransform, SbrSignallingTransform};

/// Buffer size of the file reader and writer used by [`rewrite_file`].
pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;

#[cfg(test)]
pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

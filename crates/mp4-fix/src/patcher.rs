//! Retroactive correction of `stco`/`co64` tables.
//!
//! Chunk offsets are absolute file positions, so they can only be corrected
//! once the size change of everything before `mdat` is known. By then the
//! tables have already been written; the patcher remembers where each one
//! came from and where it went, and rewrites them in a single seek-back pass
//! right before the first `mdat` byte is copied.

use std::io::{Read, Seek, Write};

use mp4::{BoxType, ChunkOffsetBox};
use tracing::{debug, info};

use crate::{
    cursor::BoxCursors,
    error::{Result, RewriteError},
};

/// Where one chunk offset table lives in the source and in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOffsetRecord {
    pub box_type: BoxType,
    /// Source offset of the box header.
    pub read_offset: u64,
    /// Output offset of the box header.
    pub write_offset: u64,
}

#[derive(Debug, Default)]
pub struct ChunkOffsetPatcher {
    pending: Vec<ChunkOffsetRecord>,
}

impl ChunkOffsetPatcher {
    pub fn record(&mut self, record: ChunkOffsetRecord) {
        debug!(
            box_type = %record.box_type,
            read_offset = record.read_offset,
            write_offset = record.write_offset,
            "Recorded chunk offset table"
        );
        self.pending.push(record);
    }

    pub fn pending(&self) -> &[ChunkOffsetRecord] {
        &self.pending
    }

    /// Shifts every recorded table by `delta`, in recording order.
    ///
    /// Values are re-read from the source so that they are the original,
    /// unshifted offsets; the output only has table contents overwritten,
    /// never sizes. Both cursors are back at their starting positions
    /// afterwards. Returns the number of tables patched.
    pub fn flush<R, W>(&mut self, cursors: &mut BoxCursors<R, W>, delta: i64) -> Result<usize>
    where
        R: Read + Seek,
        W: Write + Seek,
    {
        let read_resume = cursors.read_position()?;
        let write_resume = cursors.write_position()?;
        let limit = cursors.source_len();
        let records = std::mem::take(&mut self.pending);

        for record in &records {
            cursors.seek_read(record.read_offset)?;
            let info = cursors.read_box_info(limit)?;
            if info.box_type != record.box_type {
                return Err(RewriteError::ChunkOffsetTypeChanged {
                    offset: record.read_offset,
                    expected: record.box_type,
                    found: info.box_type,
                });
            }

            let payload = cursors.read_payload(info.payload_size())?;
            let mut table = ChunkOffsetBox::decode(info.box_type, &payload)?;
            table.shift(delta)?;

            cursors.seek_write(record.write_offset + info.header_size)?;
            cursors.write_all(&table.encode()?)?;
            debug!(
                box_type = %info.box_type,
                entries = table.offsets.len(),
                write_offset = record.write_offset,
                "Patched chunk offset table"
            );
        }

        cursors.seek_read(read_resume)?;
        cursors.seek_write(write_resume)?;

        info!(
            "Shifted {} chunk offset tables by {delta:+} bytes",
            records.len()
        );
        Ok(records.len())
    }
}

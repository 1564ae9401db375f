//! # MP4 Rewriter Module
//!
//! Single forward pass over an MP4 file that re-emits every box, editing the
//! payloads that have a registered [`PayloadTransform`] and keeping the file
//! consistent afterwards.
//!
//! ## Key Features:
//!
//! - Copies uninterpreted boxes and `mdat` verbatim without buffering them
//! - Recomputes the size of every container whose descendants changed
//! - Tracks the cumulative size change ahead of `mdat` and shifts the
//!   `stco`/`co64` chunk offsets by it
//!
//! ## License
//!
//! MIT License
//!
//! ## Authors
//!
//! - hua0512
//!

use std::{
    fs,
    io::{BufReader, BufWriter, Read, Seek, Write},
    path::Path,
};

use mp4::{BoxInfo, BoxType, COMPACT_HEADER_SIZE, ChunkOffsetBox, ContainerLayout, Mp4Error};
use tracing::{debug, trace, warn};

use crate::{
    DEFAULT_BUFFER_SIZE,
    cursor::BoxCursors,
    error::{Result, RewriteError},
    patcher::ChunkOffsetRecord,
    session::{RewriteOptions, RewriteSession, RewriteStats},
    transform::{PayloadTransform, SbrSignallingTransform},
};

/// Streaming box-tree rewriter.
pub struct Mp4Rewriter<R, W> {
    cursors: BoxCursors<R, W>,
    session: RewriteSession,
    options: RewriteOptions,
    transforms: Vec<Box<dyn PayloadTransform>>,
    /// Types of the containers currently being rewritten, outermost first.
    parents: Vec<BoxType>,
}

impl<R: Read + Seek, W: Write + Seek> Mp4Rewriter<R, W> {
    pub fn new(reader: R, writer: W, options: RewriteOptions) -> Result<Self> {
        Ok(Self {
            cursors: BoxCursors::new(reader, writer)?,
            session: RewriteSession::default(),
            options,
            transforms: Vec::new(),
            parents: Vec::new(),
        })
    }

    /// Registers a payload edit. The first transform registered for a box
    /// type wins.
    pub fn with_transform(mut self, transform: impl PayloadTransform + 'static) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    /// Rewrites the whole source into the destination.
    pub fn rewrite(mut self) -> Result<(RewriteStats, W)> {
        let limit = self.cursors.source_len();
        while self.cursors.read_position()? < limit {
            self.rewrite_box(limit)?;
        }
        self.cursors.flush()?;

        let (_, writer) = self.cursors.into_inner();
        Ok((self.session.into_stats(), writer))
    }

    /// Rewrites the box at the read cursor, which must end at or before
    /// `limit`, and returns its size change including all descendants.
    pub fn rewrite_box(&mut self, limit: u64) -> Result<i64> {
        let info = self.cursors.read_box_info(limit)?;
        self.session.stats.boxes_visited += 1;

        if info.box_type == BoxType::MDAT {
            self.rewrite_media_data(&info)?;
            return Ok(0);
        }
        if ChunkOffsetBox::is_chunk_offset_box(info.box_type) {
            return self.rewrite_chunk_offset_box(&info);
        }
        if let Some(layout) = ContainerLayout::of(info.box_type, self.parents.last().copied()) {
            return self.rewrite_container(&info, layout);
        }
        if let Some(index) = self
            .transforms
            .iter()
            .position(|t| t.box_type() == info.box_type)
        {
            return self.rewrite_transformed(&info, index);
        }

        self.copy_verbatim(&info)?;
        Ok(0)
    }

    fn copy_verbatim(&mut self, info: &BoxInfo) -> Result<()> {
        trace!(
            box_type = %info.box_type,
            offset = info.offset,
            size = info.size,
            "Copying box verbatim"
        );
        self.cursors.seek_read(info.offset)?;
        self.cursors.copy_bytes(info.size)?;
        self.session.stats.boxes_copied += 1;
        Ok(())
    }

    fn rewrite_media_data(&mut self, info: &BoxInfo) -> Result<()> {
        let delta = self.session.size_diff();
        let actual = self.cursors.write_position()? as i64 - info.offset as i64;
        if actual != delta {
            return Err(RewriteError::DeltaMismatch {
                offset: info.offset,
                tracked: delta,
                actual,
            });
        }

        if self.session.media_data_seen() {
            if delta != 0 {
                self.ambiguous_layout(format!(
                    "second 'mdat' at offset {} follows a size change of {delta:+} bytes",
                    info.offset
                ))?;
            }
        } else {
            self.session.enter_media_data();
            if delta != 0 {
                let patched = self.session.patcher.flush(&mut self.cursors, delta)?;
                self.session.stats.chunk_offset_tables_patched += patched as u64;
            }
        }

        debug!(
            offset = info.offset,
            size = info.size,
            delta,
            "Copying media data"
        );
        self.copy_verbatim(info)
    }

    fn rewrite_chunk_offset_box(&mut self, info: &BoxInfo) -> Result<i64> {
        let payload = self.cursors.read_payload(info.payload_size())?;
        let table = ChunkOffsetBox::decode(info.box_type, &payload)?;
        let write_offset = self.cursors.write_position()?;

        if !self.session.media_data_seen() {
            self.session.patcher.record(ChunkOffsetRecord {
                box_type: info.box_type,
                read_offset: info.offset,
                write_offset,
            });
        } else if self.session.media_data_delta() != 0 {
            self.ambiguous_layout(format!(
                "'{}' at offset {} follows an 'mdat' that moved by {:+} bytes",
                info.box_type,
                info.offset,
                self.session.media_data_delta()
            ))?;
        }

        let encoded = table.encode()?;
        let new_size = info.header_size + encoded.len() as u64;
        self.cursors.write_box_header(info, new_size)?;
        self.cursors.write_all(&encoded)?;

        debug!(
            box_type = %info.box_type,
            entries = table.offsets.len(),
            write_offset,
            "Wrote chunk offset table"
        );
        Ok(self.finalize(info, new_size, 0))
    }

    fn rewrite_container(&mut self, info: &BoxInfo, layout: ContainerLayout) -> Result<i64> {
        let base_len = layout.base_prefix_len() as u64;
        if info.payload_size() < base_len {
            return Err(Mp4Error::BoxTooSmall {
                box_type: info.box_type,
                size: info.size,
                header_size: info.header_size + base_len,
            }
            .into());
        }

        let mut prefix = self.cursors.read_payload(base_len)?;
        let extra_len = layout.extra_prefix_len(info.box_type, &prefix)? as u64;
        if info.payload_size() < base_len + extra_len {
            return Err(Mp4Error::BoxTooSmall {
                box_type: info.box_type,
                size: info.size,
                header_size: info.header_size + base_len + extra_len,
            }
            .into());
        }
        prefix.extend(self.cursors.read_payload(extra_len)?);

        let write_offset = self.cursors.write_position()?;
        self.cursors.write_placeholder_header(info)?;
        self.cursors.write_all(&prefix)?;

        let end = info.end();
        let mut children = 0;
        self.parents.push(info.box_type);
        loop {
            let remaining = end.saturating_sub(self.cursors.read_position()?);
            if remaining == 0 {
                break;
            }
            if remaining < COMPACT_HEADER_SIZE {
                trace!(
                    box_type = %info.box_type,
                    len = remaining,
                    "Copying container tail verbatim"
                );
                self.cursors.copy_bytes(remaining)?;
                break;
            }
            children += self.rewrite_box(end)?;
        }
        self.parents.pop();

        let new_size = self.cursors.write_position()? - write_offset;
        self.cursors.patch_box_size(info, write_offset, new_size)?;

        debug!(
            box_type = %info.box_type,
            old_size = info.size,
            new_size,
            "Rewrote container"
        );
        Ok(self.finalize(info, new_size, children))
    }

    fn rewrite_transformed(&mut self, info: &BoxInfo, index: usize) -> Result<i64> {
        let payload = self.cursors.read_payload(info.payload_size())?;
        let replaced = self.transforms[index].apply(&payload, &mut self.session.stats)?;
        let body = replaced.as_deref().unwrap_or(payload.as_slice());

        let new_size = info.header_size + body.len() as u64;
        self.cursors.write_box_header(info, new_size)?;
        self.cursors.write_all(body)?;

        debug!(
            box_type = %info.box_type,
            old_size = info.size,
            new_size,
            "Rewrote box payload"
        );
        Ok(self.finalize(info, new_size, 0))
    }

    /// Records the direct part of a box's size change and returns the total.
    fn finalize(&mut self, info: &BoxInfo, new_size: u64, children: i64) -> i64 {
        let own = new_size as i64 - info.size as i64;
        self.session.record_box(own, children);
        own
    }

    fn ambiguous_layout(&self, message: String) -> Result<()> {
        if self.options.reject_ambiguous_layouts {
            return Err(RewriteError::UnsupportedLayout(message));
        }
        warn!("{message}; chunk offsets may be wrong");
        Ok(())
    }
}

/// Rewrites `input` into `output`, switching AAC-LC tracks to explicit SBR
/// signalling.
///
/// On failure the partially written output is left in place.
pub fn rewrite_file(input: &Path, output: &Path, options: RewriteOptions) -> Result<RewriteStats> {
    debug!(input = %input.display(), output = %output.display(), "Rewriting file");

    let reader = BufReader::with_capacity(DEFAULT_BUFFER_SIZE, fs::File::open(input)?);
    let writer = BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, fs::File::create(output)?);

    let (stats, writer) = Mp4Rewriter::new(reader, writer, options)?
        .with_transform(SbrSignallingTransform::new())
        .rewrite()?;
    writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;

    debug!("Rewrote {}: {stats}", input.display());
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use mp4::test_support::{
        AudioMovie, assert_tree_consistent, make_box, read_chunk_offsets,
        read_decoder_specific_info,
    };

    use super::*;

    fn rewrite(source: &[u8], options: RewriteOptions) -> Result<(RewriteStats, Vec<u8>)> {
        let (stats, writer) = Mp4Rewriter::new(
            Cursor::new(source.to_vec()),
            Cursor::new(Vec::new()),
            options,
        )?
        .with_transform(SbrSignallingTransform::new())
        .rewrite()?;
        Ok((stats, writer.into_inner()))
    }

    #[test]
    fn test_rewrite_box_reports_total_delta() {
        let movie = AudioMovie::default().build();
        let mut rewriter = Mp4Rewriter::new(
            Cursor::new(movie.bytes.clone()),
            Cursor::new(Vec::new()),
            RewriteOptions::default(),
        )
        .unwrap()
        .with_transform(SbrSignallingTransform::new());

        let limit = movie.bytes.len() as u64;
        // ftyp
        assert_eq!(rewriter.rewrite_box(limit).unwrap(), 0);
        // moov, grown by the esds edit deep inside it
        assert_eq!(rewriter.rewrite_box(limit).unwrap(), 2);
        assert_eq!(rewriter.session.size_diff(), 2);
        assert_eq!(rewriter.session.patcher.pending().len(), 1);
    }

    #[test]
    fn test_rewrite_grows_and_patches() {
        crate::init_test_tracing();
        let movie = AudioMovie::default().build();
        let (stats, output) = rewrite(&movie.bytes, RewriteOptions::default()).unwrap();

        assert_eq!(output.len(), movie.bytes.len() + 2);
        assert_tree_consistent(&output);
        assert_eq!(
            read_decoder_specific_info(&output),
            vec![0x2A, 0x12, 0x08, 0x00]
        );

        let expected: Vec<u64> = movie.chunk_offsets.iter().map(|o| o + 2).collect();
        assert_eq!(read_chunk_offsets(&output).offsets, expected);

        assert_eq!(stats.descriptors_rewritten, 1);
        assert_eq!(stats.chunk_offset_tables_patched, 1);
        assert_eq!(stats.size_delta, 2);
    }

    #[test]
    fn test_no_edit_is_byte_identical() {
        let movie = AudioMovie {
            dsi: vec![0x0A, 0x10],
            ..Default::default()
        }
        .build();
        let (stats, output) = rewrite(&movie.bytes, RewriteOptions::default()).unwrap();

        assert_eq!(output, movie.bytes);
        assert_eq!(stats.descriptors_skipped, 1);
        assert_eq!(stats.chunk_offset_tables_patched, 0);
        assert_eq!(stats.size_delta, 0);
    }

    #[test]
    fn test_table_after_shifted_mdat_is_rejected() {
        // moov first, then mdat, then a stray moov-like container holding a table
        let movie = AudioMovie::default().build();
        let stray = make_box(
            b"moov",
            &make_box(b"stco", &mp4::test_support::make_stco_payload(&[1])),
        );
        let source = [movie.bytes.clone(), stray].concat();

        let err = rewrite(&source, RewriteOptions::default()).unwrap_err();
        assert!(matches!(err, RewriteError::UnsupportedLayout(_)));

        let options = RewriteOptions {
            reject_ambiguous_layouts: false,
        };
        let (_, output) = rewrite(&source, options).unwrap();
        assert_eq!(output.len(), source.len() + 2);
    }

    #[test]
    fn test_second_mdat_after_growth_is_rejected() {
        let movie = AudioMovie::default().build();
        let source = [movie.bytes.clone(), make_box(b"mdat", &[0u8; 4])].concat();
        let err = rewrite(&source, RewriteOptions::default()).unwrap_err();
        assert!(matches!(err, RewriteError::UnsupportedLayout(_)));
    }

    #[test]
    fn test_short_container_tail_is_copied() {
        let movie = AudioMovie {
            moov_extra: vec![0u8; 4],
            ..Default::default()
        }
        .build();
        let (stats, output) = rewrite(&movie.bytes, RewriteOptions::default()).unwrap();

        assert_eq!(output.len(), movie.bytes.len() + 2);
        assert_tree_consistent(&output);
        assert_eq!(stats.descriptors_rewritten, 1);

        let expected: Vec<u64> = movie.chunk_offsets.iter().map(|o| o + 2).collect();
        assert_eq!(read_chunk_offsets(&output).offsets, expected);
    }

    #[test]
    fn test_sample_entry_outside_stsd_is_copied() {
        // a bare mp4a at the top level is not a sample entry and is too short for one
        let source = make_box(b"mp4a", &[0u8; 4]);
        let (stats, output) = rewrite(&source, RewriteOptions::default()).unwrap();
        assert_eq!(output, source);
        assert_eq!(stats.boxes_copied, 1);
    }

    #[test]
    fn test_truncated_box_fails() {
        let movie = AudioMovie::default().build();
        let source = &movie.bytes[..movie.bytes.len() - 1];
        let err = rewrite(source, RewriteOptions::default()).unwrap_err();
        assert!(matches!(err, RewriteError::Mp4(Mp4Error::BoxOverrun { .. })));
    }

    #[test]
    fn test_container_shorter_than_prefix_fails() {
        let source = make_box(b"stsd", &[0u8; 4]);
        let err = rewrite(&source, RewriteOptions::default()).unwrap_err();
        assert!(matches!(err, RewriteError::Mp4(Mp4Error::BoxTooSmall { .. })));
    }
}

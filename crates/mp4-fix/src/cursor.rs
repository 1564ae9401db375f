use std::io::{self, Read, Seek, SeekFrom, Write};

use mp4::BoxInfo;

use crate::error::Result;

/// Paired read cursor over the source and write cursor over the destination.
///
/// All positions are absolute offsets from the start of each stream. Apart
/// from a single box payload, nothing is buffered here; bulk data moves
/// through [`BoxCursors::copy_bytes`].
pub struct BoxCursors<R, W> {
    reader: R,
    writer: W,
    source_len: u64,
}

impl<R: Read + Seek, W: Write + Seek> BoxCursors<R, W> {
    /// Wraps both streams and rewinds them to the start.
    pub fn new(mut reader: R, mut writer: W) -> Result<Self> {
        let source_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        writer.seek(SeekFrom::Start(0))?;

        Ok(Self {
            reader,
            writer,
            source_len,
        })
    }

    pub fn source_len(&self) -> u64 {
        self.source_len
    }

    pub fn read_position(&mut self) -> Result<u64> {
        Ok(self.reader.stream_position()?)
    }

    pub fn write_position(&mut self) -> Result<u64> {
        Ok(self.writer.stream_position()?)
    }

    pub fn seek_read(&mut self, offset: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    pub fn seek_write(&mut self, offset: u64) -> Result<()> {
        self.writer.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Streams `len` bytes from the read cursor to the write cursor.
    pub fn copy_bytes(&mut self, len: u64) -> Result<()> {
        let copied = io::copy(&mut self.reader.by_ref().take(len), &mut self.writer)?;
        if copied != len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("source ended after {copied} of {len} bytes"),
            )
            .into());
        }
        Ok(())
    }

    /// Reads the box header at the read cursor, leaving it at the payload.
    pub fn read_box_info(&mut self, limit: u64) -> Result<BoxInfo> {
        let offset = self.read_position()?;
        Ok(BoxInfo::read(&mut self.reader, offset, limit)?)
    }

    /// Reads exactly `len` bytes of box payload.
    pub fn read_payload(&mut self, len: u64) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        self.reader.by_ref().take(len).read_to_end(&mut payload)?;
        if payload.len() as u64 != len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("box payload truncated at {} of {len} bytes", payload.len()),
            )
            .into());
        }
        Ok(payload)
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        Ok(())
    }

    /// Writes `info`'s header with its final size already known.
    pub fn write_box_header(&mut self, info: &BoxInfo, size: u64) -> Result<()> {
        info.write_header(&mut self.writer, size)?;
        Ok(())
    }

    /// Writes a header of the right shape whose size is patched later.
    pub fn write_placeholder_header(&mut self, info: &BoxInfo) -> Result<()> {
        self.write_box_header(info, 0)
    }

    /// Overwrites the size field of the header written at `header_offset`
    /// and returns the write cursor to where it was.
    pub fn patch_box_size(&mut self, info: &BoxInfo, header_offset: u64, size: u64) -> Result<()> {
        let (field_offset, field) = info.encode_size_field(size)?;
        let resume = self.write_position()?;
        self.seek_write(header_offset + field_offset)?;
        self.writer.write_all(&field)?;
        self.seek_write(resume)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

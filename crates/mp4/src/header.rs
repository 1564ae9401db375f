use std::{
    fmt,
    io::{Read, Write},
};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Mp4Error, Result};

/// Size of a compact box header: 32-bit size + FourCC.
pub const COMPACT_HEADER_SIZE: u64 = 8;

/// Extra bytes of a 64-bit `largesize` header.
const LARGE_SIZE_EXTRA: u64 = 8;

/// Extra bytes of the `uuid` extended type.
const USERTYPE_SIZE: u64 = 16;

/// Four-character box type code.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxType(pub [u8; 4]);

impl BoxType {
    pub const FTYP: BoxType = BoxType(*b"ftyp");
    pub const FREE: BoxType = BoxType(*b"free");
    pub const MDAT: BoxType = BoxType(*b"mdat");
    pub const MOOV: BoxType = BoxType(*b"moov");
    pub const MOOF: BoxType = BoxType(*b"moof");
    pub const TRAK: BoxType = BoxType(*b"trak");
    pub const MDIA: BoxType = BoxType(*b"mdia");
    pub const MINF: BoxType = BoxType(*b"minf");
    pub const STBL: BoxType = BoxType(*b"stbl");
    pub const STSD: BoxType = BoxType(*b"stsd");
    pub const STCO: BoxType = BoxType(*b"stco");
    pub const CO64: BoxType = BoxType(*b"co64");
    pub const MP4A: BoxType = BoxType(*b"mp4a");
    pub const ENCA: BoxType = BoxType(*b"enca");
    pub const ESDS: BoxType = BoxType(*b"esds");
    pub const WAVE: BoxType = BoxType(*b"wave");
    pub const UUID: BoxType = BoxType(*b"uuid");

    pub const fn new(fourcc: [u8; 4]) -> Self {
        Self(fourcc)
    }

    pub const fn fourcc(self) -> [u8; 4] {
        self.0
    }
}

impl fmt::Display for BoxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&fourcc_to_string(&self.0))
    }
}

impl fmt::Debug for BoxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoxType({self})")
    }
}

/// Renders a FourCC, replacing non-printable bytes with `?`.
pub fn fourcc_to_string(fourcc: &[u8; 4]) -> String {
    fourcc
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '?'
            }
        })
        .collect()
}

/// How the box size was encoded in the source header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeField {
    /// 32-bit size.
    Compact,
    /// `size == 1` followed by a 64-bit `largesize`.
    Large,
    /// `size == 0`: the box extends to the end of its enclosing region.
    ToEnd,
}

/// Immutable snapshot of one box header as read from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxInfo {
    pub box_type: BoxType,
    /// Absolute offset of the first header byte.
    pub offset: u64,
    /// Total box size including the header, with `size == 0` already resolved.
    pub size: u64,
    pub header_size: u64,
    pub size_field: SizeField,
    /// Extended type of `uuid` boxes.
    pub usertype: Option<[u8; 16]>,
}

impl BoxInfo {
    /// Reads a box header located at `offset`.
    ///
    /// `limit` is the absolute end of the enclosing region (parent payload end
    /// or file length); it resolves `size == 0` and bounds every box.
    pub fn read<R: Read>(reader: &mut R, offset: u64, limit: u64) -> Result<Self> {
        let size32 = reader.read_u32::<BigEndian>()?;
        let mut fourcc = [0u8; 4];
        reader.read_exact(&mut fourcc)?;
        let box_type = BoxType(fourcc);

        let mut header_size = COMPACT_HEADER_SIZE;
        let (size_field, declared) = match size32 {
            0 => (SizeField::ToEnd, None),
            1 => {
                header_size += LARGE_SIZE_EXTRA;
                (SizeField::Large, Some(reader.read_u64::<BigEndian>()?))
            }
            size => (SizeField::Compact, Some(size as u64)),
        };

        let usertype = if box_type == BoxType::UUID {
            let mut usertype = [0u8; 16];
            reader.read_exact(&mut usertype)?;
            header_size += USERTYPE_SIZE;
            Some(usertype)
        } else {
            None
        };

        let size = match declared {
            Some(size) => size,
            None => limit.saturating_sub(offset),
        };

        if size < header_size {
            return Err(Mp4Error::BoxTooSmall {
                box_type,
                size,
                header_size,
            });
        }

        if offset.checked_add(size).is_none_or(|end| end > limit) {
            return Err(Mp4Error::BoxOverrun {
                box_type,
                offset,
                size,
                limit,
            });
        }

        Ok(Self {
            box_type,
            offset,
            size,
            header_size,
            size_field,
            usertype,
        })
    }

    pub fn payload_size(&self) -> u64 {
        self.size - self.header_size
    }

    /// Absolute offset one past the last byte of the box.
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    /// The header form used when this box is re-encoded.
    ///
    /// A size-0 header cannot carry a known size, so rewritten boxes fall back
    /// to the compact form, which has the same header length.
    pub fn rewritten_size_field(&self) -> SizeField {
        match self.size_field {
            SizeField::ToEnd => SizeField::Compact,
            other => other,
        }
    }

    /// Writes a header of the same shape as the source header, declaring `size`.
    pub fn write_header<W: Write>(&self, writer: &mut W, size: u64) -> Result<()> {
        match self.rewritten_size_field() {
            SizeField::Large => {
                writer.write_u32::<BigEndian>(1)?;
                writer.write_all(&self.box_type.0)?;
                writer.write_u64::<BigEndian>(size)?;
            }
            _ => {
                let size32 = u32::try_from(size).map_err(|_| Mp4Error::HeaderOverflow {
                    box_type: self.box_type,
                    size,
                })?;
                writer.write_u32::<BigEndian>(size32)?;
                writer.write_all(&self.box_type.0)?;
            }
        }

        if let Some(usertype) = &self.usertype {
            writer.write_all(usertype)?;
        }
        Ok(())
    }

    /// Encodes only the size field for an in-place size patch.
    ///
    /// Returns the bytes together with their offset relative to the header start.
    pub fn encode_size_field(&self, size: u64) -> Result<(u64, Vec<u8>)> {
        match self.rewritten_size_field() {
            SizeField::Large => Ok((COMPACT_HEADER_SIZE, size.to_be_bytes().to_vec())),
            _ => {
                let size32 = u32::try_from(size).map_err(|_| Mp4Error::HeaderOverflow {
                    box_type: self.box_type,
                    size,
                })?;
                Ok((0, size32.to_be_bytes().to_vec()))
            }
        }
    }
}

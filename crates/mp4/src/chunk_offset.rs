use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    BoxType,
    error::{Mp4Error, Result},
};

/// version (1) + flags (3) + entry_count (4)
const CHUNK_OFFSET_PREFIX: u64 = 8;

/// Decoded `stco` (32-bit) or `co64` (64-bit) chunk offset table.
///
/// Offsets are kept as `u64` for both variants; the width only matters when
/// decoding, shifting (overflow range) and encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOffsetBox {
    pub box_type: BoxType,
    pub version: u8,
    pub flags: u32,
    pub offsets: Vec<u64>,
}

impl ChunkOffsetBox {
    pub fn is_chunk_offset_box(box_type: BoxType) -> bool {
        box_type == BoxType::STCO || box_type == BoxType::CO64
    }

    fn entry_size(box_type: BoxType) -> Result<u64> {
        match box_type {
            BoxType::STCO => Ok(4),
            BoxType::CO64 => Ok(8),
            other => Err(Mp4Error::UnknownChunkOffsetBox(other)),
        }
    }

    fn max_offset(&self) -> u64 {
        if self.box_type == BoxType::STCO {
            u32::MAX as u64
        } else {
            u64::MAX
        }
    }

    /// Decodes the payload (everything after the box header).
    ///
    /// The payload must hold exactly `entry_count` entries of the variant's width.
    pub fn decode(box_type: BoxType, payload: &[u8]) -> Result<Self> {
        let entry_size = Self::entry_size(box_type)?;
        let actual = payload.len() as u64;
        if actual < CHUNK_OFFSET_PREFIX {
            return Err(Mp4Error::PayloadSizeMismatch {
                box_type,
                expected: CHUNK_OFFSET_PREFIX,
                actual,
            });
        }

        let mut buf = payload;
        let version_and_flags = buf.get_u32();
        let entry_count = buf.get_u32() as u64;

        let expected = CHUNK_OFFSET_PREFIX + entry_count * entry_size;
        if expected != actual {
            return Err(Mp4Error::PayloadSizeMismatch {
                box_type,
                expected,
                actual,
            });
        }

        let offsets = (0..entry_count)
            .map(|_| {
                if entry_size == 4 {
                    buf.get_u32() as u64
                } else {
                    buf.get_u64()
                }
            })
            .collect();

        Ok(Self {
            box_type,
            version: (version_and_flags >> 24) as u8,
            flags: version_and_flags & 0x00FF_FFFF,
            offsets,
        })
    }

    /// Encoded payload length; shifting never changes it.
    pub fn encoded_len(&self) -> Result<u64> {
        Ok(CHUNK_OFFSET_PREFIX + self.offsets.len() as u64 * Self::entry_size(self.box_type)?)
    }

    pub fn encode(&self) -> Result<Bytes> {
        let entry_size = Self::entry_size(self.box_type)?;
        let mut out = BytesMut::with_capacity(self.encoded_len()? as usize);
        out.put_u32(((self.version as u32) << 24) | (self.flags & 0x00FF_FFFF));
        out.put_u32(self.offsets.len() as u32);

        for &offset in &self.offsets {
            if entry_size == 4 {
                let offset = u32::try_from(offset).map_err(|_| Mp4Error::OffsetOverflow {
                    box_type: self.box_type,
                    offset,
                    delta: 0,
                })?;
                out.put_u32(offset);
            } else {
                out.put_u64(offset);
            }
        }

        Ok(out.freeze())
    }

    /// Adds `delta` to every offset.
    ///
    /// Fails without modifying the table if any entry would leave the
    /// variant's range.
    pub fn shift(&mut self, delta: i64) -> Result<()> {
        let max = self.max_offset();
        let shifted = self
            .offsets
            .iter()
            .map(|&offset| {
                offset
                    .checked_add_signed(delta)
                    .filter(|&shifted| shifted <= max)
                    .ok_or(Mp4Error::OffsetOverflow {
                        box_type: self.box_type,
                        offset,
                        delta,
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        self.offsets = shifted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{make_co64_payload, make_stco_payload};

    #[test]
    fn test_decode_stco() {
        let payload = make_stco_payload(&[100, 500, 900]);
        let table = ChunkOffsetBox::decode(BoxType::STCO, &payload).unwrap();
        assert_eq!(table.offsets, vec![100, 500, 900]);
        assert_eq!(table.version, 0);
        assert_eq!(table.encoded_len().unwrap(), payload.len() as u64);
        assert_eq!(&table.encode().unwrap()[..], &payload[..]);
    }

    #[test]
    fn test_decode_co64() {
        let payload = make_co64_payload(&[0x1_0000_0000, 42]);
        let table = ChunkOffsetBox::decode(BoxType::CO64, &payload).unwrap();
        assert_eq!(table.offsets, vec![0x1_0000_0000, 42]);
        assert_eq!(&table.encode().unwrap()[..], &payload[..]);
    }

    #[test]
    fn test_decode_rejects_size_mismatch() {
        let mut payload = make_stco_payload(&[1, 2]);
        payload.extend_from_slice(&[0, 0]);
        let err = ChunkOffsetBox::decode(BoxType::STCO, &payload).unwrap_err();
        assert!(matches!(
            err,
            Mp4Error::PayloadSizeMismatch {
                expected: 16,
                actual: 18,
                ..
            }
        ));

        let payload = make_stco_payload(&[1, 2]);
        let err = ChunkOffsetBox::decode(BoxType::CO64, &payload).unwrap_err();
        assert!(matches!(err, Mp4Error::PayloadSizeMismatch { .. }));
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let payload = make_stco_payload(&[1]);
        let err = ChunkOffsetBox::decode(BoxType(*b"stsz"), &payload).unwrap_err();
        assert!(matches!(err, Mp4Error::UnknownChunkOffsetBox(_)));
    }

    #[test]
    fn test_shift_both_directions() {
        let mut table =
            ChunkOffsetBox::decode(BoxType::STCO, &make_stco_payload(&[100, 500, 900])).unwrap();
        table.shift(2).unwrap();
        assert_eq!(table.offsets, vec![102, 502, 902]);
        table.shift(-2).unwrap();
        assert_eq!(table.offsets, vec![100, 500, 900]);
    }

    #[test]
    fn test_shift_stco_overflow_leaves_table_untouched() {
        let mut table = ChunkOffsetBox::decode(
            BoxType::STCO,
            &make_stco_payload(&[10, u32::MAX - 1]),
        )
        .unwrap();
        let err = table.shift(5).unwrap_err();
        assert!(matches!(err, Mp4Error::OffsetOverflow { delta: 5, .. }));
        assert_eq!(table.offsets, vec![10, u32::MAX as u64 - 1]);

        let err = table.shift(-11).unwrap_err();
        assert!(matches!(err, Mp4Error::OffsetOverflow { offset: 10, .. }));
    }

    #[test]
    fn test_shift_co64_past_32_bits() {
        let mut table =
            ChunkOffsetBox::decode(BoxType::CO64, &make_co64_payload(&[u32::MAX as u64])).unwrap();
        table.shift(1).unwrap();
        assert_eq!(table.offsets, vec![u32::MAX as u64 + 1]);
    }
}

//! Shared MP4 test builders.
//!
//! This module is available for local mp4 tests and optionally for downstream
//! crate tests when the `test-utils` feature is enabled.

use bytes::Bytes;

use crate::{
    BoxType, ChunkOffsetBox, EsdsBox,
    box_utils::{BoxView, find_first_box, visit_boxes},
};

/// Fixed fields of an audio sample entry before its child boxes.
const AUDIO_SAMPLE_ENTRY_HEADER: usize = 28;

/// `AudioSpecificConfig` for AAC LC, 44.1 kHz, stereo.
pub const AAC_LC_44100_STEREO: [u8; 2] = [0x12, 0x10];

/// Distance between the chunks of the first and second track of an [`AudioMovie`].
pub const SECOND_TRACK_CHUNK_SHIFT: u64 = 32;

pub fn make_box(fourcc: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let size = (8 + body.len()) as u32;
    let mut out = Vec::with_capacity(size as usize);
    out.extend_from_slice(&size.to_be_bytes());
    out.extend_from_slice(fourcc);
    out.extend_from_slice(body);
    out
}

/// Box with a `size == 1` header and a 64-bit `largesize`.
pub fn make_large_box(fourcc: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let size = (16 + body.len()) as u64;
    let mut out = Vec::with_capacity(size as usize);
    out.extend_from_slice(&1u32.to_be_bytes());
    out.extend_from_slice(fourcc);
    out.extend_from_slice(&size.to_be_bytes());
    out.extend_from_slice(body);
    out
}

/// Box with a `size == 0` header, extending to the end of the file.
pub fn make_box_to_end(fourcc: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + body.len());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(fourcc);
    out.extend_from_slice(body);
    out
}

pub fn make_full_box(fourcc: &[u8; 4], version: u8, flags: u32, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + payload.len());
    body.push(version);
    body.push(((flags >> 16) & 0xFF) as u8);
    body.push(((flags >> 8) & 0xFF) as u8);
    body.push((flags & 0xFF) as u8);
    body.extend_from_slice(payload);
    make_box(fourcc, &body)
}

pub fn make_stco_payload(offsets: &[u32]) -> Vec<u8> {
    let mut out = vec![0u8; 4];
    out.extend_from_slice(&(offsets.len() as u32).to_be_bytes());
    for offset in offsets {
        out.extend_from_slice(&offset.to_be_bytes());
    }
    out
}

pub fn make_co64_payload(offsets: &[u64]) -> Vec<u8> {
    let mut out = vec![0u8; 4];
    out.extend_from_slice(&(offsets.len() as u32).to_be_bytes());
    for offset in offsets {
        out.extend_from_slice(&offset.to_be_bytes());
    }
    out
}

/// Encodes a descriptor with its size field padded to `size_field_len` bytes.
pub fn make_descriptor(tag: u8, payload: &[u8], size_field_len: u8) -> Vec<u8> {
    let mut out = vec![tag];
    for i in (0..size_field_len).rev() {
        let mut b = ((payload.len() >> (7 * i as usize)) & 0x7F) as u8;
        if i > 0 {
            b |= 0x80;
        }
        out.push(b);
    }
    out.extend_from_slice(payload);
    out
}

/// `esds` payload carrying an AAC elementary stream with the given
/// `DecoderSpecificInfo` bytes.
pub fn make_esds_payload(dsi: &[u8], size_field_len: u8) -> Vec<u8> {
    let dsi = make_descriptor(0x05, dsi, size_field_len);

    // objectTypeIndication, streamType, bufferSizeDB, maxBitrate, avgBitrate
    let mut decoder_config = vec![0x40, 0x15, 0x00, 0x18, 0x00];
    decoder_config.extend_from_slice(&128_000u32.to_be_bytes());
    decoder_config.extend_from_slice(&128_000u32.to_be_bytes());
    decoder_config.extend_from_slice(&dsi);
    let decoder_config = make_descriptor(0x04, &decoder_config, size_field_len);

    let sl_config = make_descriptor(0x06, &[0x02], size_field_len);

    // ES_ID = 1, no optional fields
    let mut es = vec![0x00, 0x01, 0x00];
    es.extend_from_slice(&decoder_config);
    es.extend_from_slice(&sl_config);

    let mut out = vec![0u8; 4];
    out.extend_from_slice(&make_descriptor(0x03, &es, size_field_len));
    out
}

/// Audio sample entry with the QuickTime sound description `version`
/// (0, 1 or 2) and the matching amount of extension fields.
pub fn make_audio_sample_entry(fourcc: &[u8; 4], version: u16, children: &[u8]) -> Vec<u8> {
    let mut body = vec![0u8; AUDIO_SAMPLE_ENTRY_HEADER];
    body[7] = 1; // data_reference_index
    body[8..10].copy_from_slice(&version.to_be_bytes());
    body[16..18].copy_from_slice(&2u16.to_be_bytes());
    body[18..20].copy_from_slice(&16u16.to_be_bytes());
    body[24..28].copy_from_slice(&(44_100u32 << 16).to_be_bytes());

    let extension = match version {
        1 => 16,
        2 => 36,
        _ => 0,
    };
    body.extend(std::iter::repeat_n(0xEE, extension));
    body.extend_from_slice(children);
    make_box(fourcc, &body)
}

pub fn make_stsd(entries: &[Vec<u8>]) -> Vec<u8> {
    let mut payload = (entries.len() as u32).to_be_bytes().to_vec();
    for entry in entries {
        payload.extend_from_slice(entry);
    }
    make_full_box(b"stsd", 0, 0, &payload)
}

/// Builder for an AAC movie: `ftyp`, `moov`, optional `free` padding and
/// `mdat`, with the chunk offsets pointing into `mdat`.
#[derive(Debug, Clone)]
pub struct AudioMovie {
    pub dsi: Vec<u8>,
    pub size_field_len: u8,
    pub sound_version: u16,
    /// Nests `esds` in a QuickTime `wave` box, as `.mov` files do.
    pub quicktime_wave: bool,
    /// Adds a second audio track with this config after the first one. Its
    /// chunks sit [`SECOND_TRACK_CHUNK_SHIFT`] bytes after the first track's.
    pub second_track_dsi: Option<Vec<u8>>,
    /// Raw bytes appended to the `moov` payload after the tracks.
    pub moov_extra: Vec<u8>,
    pub use_co64: bool,
    /// Chunk positions relative to the first `mdat` payload byte.
    pub chunk_positions: Vec<u64>,
    /// Absolute chunk offsets; overrides `chunk_positions`.
    pub chunk_offsets: Option<Vec<u64>>,
    /// Pads with a `free` box so that `mdat` starts at this offset.
    pub mdat_offset: Option<u64>,
    pub mdat_payload: Vec<u8>,
    pub large_mdat: bool,
    pub mdat_to_end: bool,
    pub moov_after_mdat: bool,
}

impl Default for AudioMovie {
    fn default() -> Self {
        Self {
            dsi: AAC_LC_44100_STEREO.to_vec(),
            size_field_len: 1,
            sound_version: 0,
            quicktime_wave: false,
            second_track_dsi: None,
            moov_extra: Vec::new(),
            use_co64: false,
            chunk_positions: vec![0, 64, 128],
            chunk_offsets: None,
            mdat_offset: None,
            mdat_payload: (0..=255u8).cycle().take(192).collect(),
            large_mdat: false,
            mdat_to_end: false,
            moov_after_mdat: false,
        }
    }
}

/// Output of [`AudioMovie::build`].
#[derive(Debug, Clone)]
pub struct BuiltMovie {
    pub bytes: Vec<u8>,
    pub mdat_offset: u64,
    /// Chunk offsets of the first track.
    pub chunk_offsets: Vec<u64>,
}

impl AudioMovie {
    fn ftyp() -> Vec<u8> {
        let mut body = b"isom".to_vec();
        body.extend_from_slice(&0x200u32.to_be_bytes());
        body.extend_from_slice(b"isommp41");
        make_box(b"ftyp", &body)
    }

    fn esds(&self, dsi: &[u8]) -> Vec<u8> {
        let esds = make_box(b"esds", &make_esds_payload(dsi, self.size_field_len));
        if !self.quicktime_wave {
            return esds;
        }

        let frma = make_box(b"frma", b"mp4a");
        let format = make_box(b"mp4a", &[0u8; 4]);
        let terminator = 8u32.to_be_bytes().into_iter().chain([0u8; 4]).collect();
        make_box(b"wave", &[frma, format, esds, terminator].concat())
    }

    fn trak(&self, dsi: &[u8], offsets: &[u64]) -> Vec<u8> {
        let mp4a = make_audio_sample_entry(b"mp4a", self.sound_version, &self.esds(dsi));
        let stsd = make_stsd(&[mp4a]);

        let stsz = make_full_box(b"stsz", 0, 0, &[0, 0, 0, 64, 0, 0, 0, 3]);
        let chunk_offsets = if self.use_co64 {
            make_box(b"co64", &make_co64_payload(offsets))
        } else {
            let offsets: Vec<u32> = offsets.iter().map(|&o| o as u32).collect();
            make_box(b"stco", &make_stco_payload(&offsets))
        };
        let stbl = make_box(b"stbl", &[stsd, stsz, chunk_offsets].concat());

        let smhd = make_full_box(b"smhd", 0, 0, &[0u8; 4]);
        let minf = make_box(b"minf", &[smhd, stbl].concat());
        let mdhd = make_full_box(b"mdhd", 0, 0, &[0u8; 20]);
        let mdia = make_box(b"mdia", &[mdhd, minf].concat());
        let tkhd = make_full_box(b"tkhd", 0, 3, &[0u8; 80]);
        make_box(b"trak", &[tkhd, mdia].concat())
    }

    fn moov(&self, offsets: &[u64]) -> Vec<u8> {
        let mvhd = make_full_box(b"mvhd", 0, 0, &[0u8; 96]);
        let mut payload = [mvhd, self.trak(&self.dsi, offsets)].concat();
        if let Some(dsi) = &self.second_track_dsi {
            let shifted: Vec<u64> = offsets
                .iter()
                .map(|o| o + SECOND_TRACK_CHUNK_SHIFT)
                .collect();
            payload.extend(self.trak(dsi, &shifted));
        }
        payload.extend_from_slice(&self.moov_extra);
        make_box(b"moov", &payload)
    }

    fn mdat(&self) -> Vec<u8> {
        if self.mdat_to_end {
            make_box_to_end(b"mdat", &self.mdat_payload)
        } else if self.large_mdat {
            make_large_box(b"mdat", &self.mdat_payload)
        } else {
            make_box(b"mdat", &self.mdat_payload)
        }
    }

    fn mdat_header_size(&self) -> u64 {
        if self.large_mdat && !self.mdat_to_end {
            16
        } else {
            8
        }
    }

    pub fn build(&self) -> BuiltMovie {
        let ftyp = Self::ftyp();
        let placeholder_count = self
            .chunk_offsets
            .as_ref()
            .map_or(self.chunk_positions.len(), Vec::len);
        let moov_len = self.moov(&vec![0; placeholder_count]).len() as u64;

        let natural = if self.moov_after_mdat {
            ftyp.len() as u64
        } else {
            ftyp.len() as u64 + moov_len
        };
        let mdat_offset = self.mdat_offset.unwrap_or(natural);
        let padding = mdat_offset
            .checked_sub(natural)
            .expect("mdat offset lies before the end of the preceding boxes");
        let free = match padding {
            0 => Vec::new(),
            n => {
                assert!(n >= 8, "padding must fit a free box header");
                make_box(b"free", &vec![0u8; (n - 8) as usize])
            }
        };

        let mdat_payload_start = mdat_offset + self.mdat_header_size();
        let chunk_offsets = self.chunk_offsets.clone().unwrap_or_else(|| {
            self.chunk_positions
                .iter()
                .map(|pos| mdat_payload_start + pos)
                .collect()
        });
        let moov = self.moov(&chunk_offsets);
        let mdat = self.mdat();

        let bytes = if self.moov_after_mdat {
            [ftyp, free, mdat, moov].concat()
        } else {
            [ftyp, moov, free, mdat].concat()
        };

        BuiltMovie {
            bytes,
            mdat_offset,
            chunk_offsets,
        }
    }
}

/// Panics unless every box size in the tree exactly tiles its parent.
pub fn assert_tree_consistent(data: &[u8]) {
    let data = Bytes::copy_from_slice(data);
    assert!(
        visit_boxes(&data, 0, data.len(), &mut |_, _| {}),
        "box sizes do not tile the file"
    );
}

pub fn find_mdat(data: &[u8]) -> BoxView {
    let data = Bytes::copy_from_slice(data);
    find_first_box(&data, 0, data.len(), BoxType::MDAT.0).expect("mdat present")
}

/// Decodes every `stco` and `co64` table in file order.
pub fn read_all_chunk_offsets(data: &[u8]) -> Vec<ChunkOffsetBox> {
    let data = Bytes::copy_from_slice(data);
    let mut tables = Vec::new();
    visit_boxes(&data, 0, data.len(), &mut |view, _| {
        if ChunkOffsetBox::is_chunk_offset_box(view.box_type()) {
            tables.push(
                ChunkOffsetBox::decode(view.box_type(), &data[view.body_start..view.body_end])
                    .expect("valid chunk offset table"),
            );
        }
    });
    tables
}

/// Decodes the first `stco` or `co64` table.
pub fn read_chunk_offsets(data: &[u8]) -> ChunkOffsetBox {
    read_all_chunk_offsets(data)
        .into_iter()
        .next()
        .expect("chunk offset table present")
}

/// Decodes every `esds` box in file order, wherever it is nested.
pub fn read_all_esds(data: &[u8]) -> Vec<EsdsBox> {
    let data = Bytes::copy_from_slice(data);
    let mut found = Vec::new();
    visit_boxes(&data, 0, data.len(), &mut |view, _| {
        if view.box_type() == BoxType::ESDS {
            found.push(
                EsdsBox::decode(&data[view.body_start..view.body_end]).expect("valid esds"),
            );
        }
    });
    found
}

pub fn read_esds(data: &[u8]) -> EsdsBox {
    read_all_esds(data)
        .into_iter()
        .next()
        .expect("esds present")
}

/// Returns the `DecoderSpecificInfo` bytes of every `esds`, in file order.
pub fn read_all_decoder_specific_info(data: &[u8]) -> Vec<Vec<u8>> {
    read_all_esds(data)
        .into_iter()
        .map(|mut esds| {
            let mut found = None;
            esds.visit_descriptors_mut(|d| {
                if d.tag == crate::DECODER_SPECIFIC_INFO_TAG && found.is_none() {
                    found = d.data().map(|b| b.to_vec());
                }
            });
            found.expect("DecoderSpecificInfo present")
        })
        .collect()
}

/// Returns the `DecoderSpecificInfo` bytes of the first `esds`.
pub fn read_decoder_specific_info(data: &[u8]) -> Vec<u8> {
    read_all_decoder_specific_info(data)
        .into_iter()
        .next()
        .expect("esds present")
}

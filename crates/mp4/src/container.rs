use byteorder::{BigEndian, ByteOrder};

use crate::{
    BoxType,
    error::{Mp4Error, Result},
};

/// Container boxes whose payload is nothing but child boxes, limited to the
/// ones on the way to `stco`/`co64` and `esds`.
const PLAIN_CONTAINERS: &[BoxType] = &[
    BoxType::MOOV,
    BoxType::TRAK,
    BoxType::MDIA,
    BoxType::MINF,
    BoxType::STBL,
    BoxType::WAVE,
];

/// `AudioSampleEntry` fields before the child boxes (ISO 14496-12 §12.2.3):
/// 6 reserved + 2 data_reference_index + 8 reserved + 2 channelcount +
/// 2 samplesize + 2 pre_defined + 2 reserved + 4 samplerate.
const AUDIO_SAMPLE_ENTRY_PREFIX: usize = 28;

/// Offset of the QuickTime sound description version inside the prefix.
const AUDIO_SAMPLE_ENTRY_VERSION_OFFSET: usize = 8;

/// `stsd` is a FullBox (4 bytes) followed by a 32-bit entry count.
const STSD_PREFIX: usize = 8;

/// How the payload of a container box is split between fixed fields and children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerLayout {
    /// Children start right after the header.
    Plain,
    /// `stsd`: version/flags and entry count, then sample entries.
    SampleDescription,
    /// `mp4a`/`enca`: the sound sample entry fields, then child boxes.
    AudioSampleEntry,
}

impl ContainerLayout {
    /// Returns the layout for container boxes this crate descends into.
    ///
    /// `parent` is the enclosing box, `None` at the top level. Audio sample
    /// entries are only containers directly inside `stsd`; the `mp4a` found
    /// inside a QuickTime `wave` box is a plain format marker.
    pub fn of(box_type: BoxType, parent: Option<BoxType>) -> Option<Self> {
        if PLAIN_CONTAINERS.contains(&box_type) {
            Some(ContainerLayout::Plain)
        } else if box_type == BoxType::STSD {
            Some(ContainerLayout::SampleDescription)
        } else if (box_type == BoxType::MP4A || box_type == BoxType::ENCA)
            && parent == Some(BoxType::STSD)
        {
            Some(ContainerLayout::AudioSampleEntry)
        } else {
            None
        }
    }

    /// Number of prefix bytes that must be read before the full prefix length is known.
    pub const fn base_prefix_len(self) -> usize {
        match self {
            ContainerLayout::Plain => 0,
            ContainerLayout::SampleDescription => STSD_PREFIX,
            ContainerLayout::AudioSampleEntry => AUDIO_SAMPLE_ENTRY_PREFIX,
        }
    }

    /// Additional prefix bytes implied by the base prefix.
    ///
    /// Only QuickTime sound descriptions grow: version 1 adds four 32-bit
    /// sample/packet/frame/byte fields, version 2 adds 36 bytes of extended
    /// format fields.
    pub fn extra_prefix_len(self, box_type: BoxType, base_prefix: &[u8]) -> Result<usize> {
        match self {
            ContainerLayout::AudioSampleEntry => {
                let version = BigEndian::read_u16(
                    &base_prefix
                        [AUDIO_SAMPLE_ENTRY_VERSION_OFFSET..AUDIO_SAMPLE_ENTRY_VERSION_OFFSET + 2],
                );
                match version {
                    0 => Ok(0),
                    1 => Ok(16),
                    2 => Ok(36),
                    version => Err(Mp4Error::UnsupportedVersion { box_type, version }),
                }
            }
            _ => Ok(0),
        }
    }
}

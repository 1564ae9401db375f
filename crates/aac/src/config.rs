use std::io;

use bytes_util::{BitReader, BitWriter};

use crate::error::{AacError, Result};

/// Sampling frequencies addressed by the 4-bit `samplingFrequencyIndex`.
///
/// Indices 13 and 14 are reserved; 15 is the escape value that signals an
/// explicit 24-bit frequency.
pub const SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Highest `samplingFrequencyIndex` that maps to a table entry.
const MAX_TABLE_FREQUENCY_INDEX: u8 = 12;

/// `samplingFrequencyIndex` escape value.
const EXPLICIT_FREQUENCY_INDEX: u8 = 0xF;

/// `audioObjectType` escape value.
const OBJECT_TYPE_ESCAPE: u8 = 31;

/// Returns the sampling frequency for a table index, if the index is not
/// reserved or the escape value.
pub fn sampling_frequency(index: u8) -> Option<u32> {
    SAMPLING_FREQUENCIES.get(index as usize).copied()
}

/// MPEG-4 Audio Object Type
///
/// <https://wiki.multimedia.cx/index.php/MPEG-4_Audio#Audio_Object_Types>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioObjectType {
    /// AAC Main
    AacMain,
    /// AAC Low Complexity
    AacLowComplexity,
    /// AAC Scalable Sample Rate
    AacScalableSampleRate,
    /// AAC Long Term Prediction
    AacLongTermPrediction,
    /// Spectral Band Replication (HE-AAC)
    SpectralBandReplication,
    /// Parametric Stereo (HE-AAC v2)
    ParametricStereo,
    /// Any other object type
    Unknown(u16),
}

impl AudioObjectType {
    /// Returns the numeric object type.
    pub const fn value(self) -> u16 {
        match self {
            AudioObjectType::AacMain => 1,
            AudioObjectType::AacLowComplexity => 2,
            AudioObjectType::AacScalableSampleRate => 3,
            AudioObjectType::AacLongTermPrediction => 4,
            AudioObjectType::SpectralBandReplication => 5,
            AudioObjectType::ParametricStereo => 29,
            AudioObjectType::Unknown(value) => value,
        }
    }
}

impl From<u16> for AudioObjectType {
    fn from(value: u16) -> Self {
        match value {
            1 => AudioObjectType::AacMain,
            2 => AudioObjectType::AacLowComplexity,
            3 => AudioObjectType::AacScalableSampleRate,
            4 => AudioObjectType::AacLongTermPrediction,
            5 => AudioObjectType::SpectralBandReplication,
            29 => AudioObjectType::ParametricStereo,
            _ => AudioObjectType::Unknown(value),
        }
    }
}

/// The leading fields of an MPEG-4 `AudioSpecificConfig`.
///
/// ISO/IEC 14496-3 - 1.6.2.1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    /// The audio object type.
    ///
    /// 5 bits, or 5 + 6 bits when escaped.
    pub audio_object_type: AudioObjectType,
    /// Index into [`SAMPLING_FREQUENCIES`], or `0xF` for an explicit frequency.
    ///
    /// 4 bits
    pub sampling_frequency_index: u8,
    /// The explicit 24-bit frequency that follows an escaped index.
    pub explicit_sampling_frequency: Option<u32>,
    /// Channel configuration; `0` means the layout is carried in a program
    /// config element instead.
    ///
    /// 4 bits
    pub channel_configuration: u8,
}

impl AudioSpecificConfig {
    /// Parses the object type, frequency and channel fields.
    ///
    /// Any trailing, object-type specific data is ignored.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 2 {
            return Err(AacError::TooShort { len: data.len() });
        }

        let mut reader = BitReader::new(io::Cursor::new(data));

        let mut object_type = reader.read_bits(5)? as u16;
        if object_type == OBJECT_TYPE_ESCAPE as u16 {
            object_type = 32 + reader.read_bits(6)? as u16;
        }

        let sampling_frequency_index = reader.read_bits(4)? as u8;
        let explicit_sampling_frequency = if sampling_frequency_index == EXPLICIT_FREQUENCY_INDEX
        {
            Some(reader.read_bits(24)? as u32)
        } else {
            None
        };

        let channel_configuration = reader.read_bits(4)? as u8;

        Ok(Self {
            audio_object_type: AudioObjectType::from(object_type),
            sampling_frequency_index,
            explicit_sampling_frequency,
            channel_configuration,
        })
    }

    /// Returns the sampling frequency in Hz, if known.
    pub fn sampling_frequency(&self) -> Option<u32> {
        self.explicit_sampling_frequency
            .or_else(|| sampling_frequency(self.sampling_frequency_index))
    }

    /// Returns `true` if the frequency is addressed through the index table.
    pub fn has_table_frequency(&self) -> bool {
        self.sampling_frequency_index <= MAX_TABLE_FREQUENCY_INDEX
    }

    /// Encodes this config using explicit hierarchical SBR signalling.
    ///
    /// The result announces an SBR object type wrapping the same AAC-LC core:
    ///
    /// ```text
    /// audioObjectType                  5 bits  = 5 (SBR)
    /// samplingFrequencyIndex           4 bits
    /// channelConfiguration             4 bits
    /// extensionSamplingFrequencyIndex  4 bits  = samplingFrequencyIndex
    /// audioObjectType                  5 bits  = 2 (AAC LC)
    /// zero padding up to 4 bytes
    /// ```
    ///
    /// Only table frequencies and explicit channel configurations can be
    /// expressed this way.
    pub fn explicit_sbr_config(&self) -> Result<[u8; 4]> {
        if !self.has_table_frequency() {
            return Err(AacError::Unsupported(
                "explicit sampling frequencies cannot be SBR-signalled",
            ));
        }
        if self.channel_configuration == 0 || self.channel_configuration > 0xF {
            return Err(AacError::Unsupported(
                "channel configuration must be an explicit 4-bit layout",
            ));
        }

        let mut out = [0u8; 4];
        let mut writer = BitWriter::new(&mut out[..]);
        writer.write_bits(AudioObjectType::SpectralBandReplication.value() as u64, 5)?;
        writer.write_bits(self.sampling_frequency_index as u64, 4)?;
        writer.write_bits(self.channel_configuration as u64, 4)?;
        writer.write_bits(self.sampling_frequency_index as u64, 4)?;
        writer.write_bits(AudioObjectType::AacLowComplexity.value() as u64, 5)?;
        // 22 bits written; finishing pads the third byte, the fourth stays zero.
        writer.finish()?;

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lc_stereo_44100() {
        // AOT 2, index 4, channels 2
        let config = AudioSpecificConfig::parse(&[0x12, 0x10]).unwrap();
        assert_eq!(config.audio_object_type, AudioObjectType::AacLowComplexity);
        assert_eq!(config.sampling_frequency_index, 4);
        assert_eq!(config.channel_configuration, 2);
        assert_eq!(config.sampling_frequency(), Some(44100));
        assert!(config.has_table_frequency());
    }

    #[test]
    fn test_parse_too_short() {
        let err = AudioSpecificConfig::parse(&[0x12]).unwrap_err();
        assert!(matches!(err, AacError::TooShort { len: 1 }));
    }

    #[test]
    fn test_parse_explicit_frequency() {
        // AOT 2, index 15, 24-bit frequency 44100, channels 1, in the top 37 of 40 bits
        let bits: u64 = (2 << 35) | (0xF << 31) | (44100 << 7) | (1 << 3);
        let bytes = bits.to_be_bytes();
        let config = AudioSpecificConfig::parse(&bytes[3..]).unwrap();
        assert_eq!(config.sampling_frequency_index, 0xF);
        assert_eq!(config.explicit_sampling_frequency, Some(44100));
        assert_eq!(config.channel_configuration, 1);
        assert!(!config.has_table_frequency());
    }

    #[test]
    fn test_parse_escaped_object_type() {
        // 11111 000010 (AOT 34) 0011 0001
        let config = AudioSpecificConfig::parse(&[0xF8, 0x46, 0x20]).unwrap();
        assert_eq!(config.audio_object_type, AudioObjectType::Unknown(34));
        assert_eq!(config.sampling_frequency_index, 3);
        assert_eq!(config.channel_configuration, 1);
    }

    #[test]
    fn test_explicit_sbr_config_layout() {
        let config = AudioSpecificConfig::parse(&[0x12, 0x10]).unwrap();
        assert_eq!(config.explicit_sbr_config().unwrap(), [0x2A, 0x12, 0x08, 0x00]);
    }

    #[test]
    fn test_explicit_sbr_config_odd_index_spans_bytes() {
        // AOT 2, index 3 (48000), channels 1
        let config = AudioSpecificConfig {
            audio_object_type: AudioObjectType::AacLowComplexity,
            sampling_frequency_index: 3,
            explicit_sampling_frequency: None,
            channel_configuration: 1,
        };
        // 00101 0011 0001 0011 00010 00
        assert_eq!(config.explicit_sbr_config().unwrap(), [0x29, 0x89, 0x88, 0x00]);

        let reparsed = AudioSpecificConfig::parse(&config.explicit_sbr_config().unwrap()).unwrap();
        assert_eq!(
            reparsed.audio_object_type,
            AudioObjectType::SpectralBandReplication
        );
        assert_eq!(reparsed.sampling_frequency_index, 3);
        assert_eq!(reparsed.channel_configuration, 1);
    }

    #[test]
    fn test_explicit_sbr_config_rejects_implicit_channels() {
        let config = AudioSpecificConfig {
            audio_object_type: AudioObjectType::AacLowComplexity,
            sampling_frequency_index: 4,
            explicit_sampling_frequency: None,
            channel_configuration: 0,
        };
        assert!(matches!(
            config.explicit_sbr_config(),
            Err(AacError::Unsupported(_))
        ));
    }
}

//! Payload edits applied to leaf boxes during a rewrite.

use aac::{AudioObjectType, AudioSpecificConfig};
use bytes::Bytes;
use mp4::{BoxType, DECODER_SPECIFIC_INFO_TAG, EsdsBox};
use tracing::{debug, warn};

use crate::{error::Result, session::RewriteStats};

/// An edit of one box type's payload.
///
/// The rewriter hands over the payload of every box of [`box_type`] and
/// writes the returned bytes in its place. The box header and all ancestor
/// sizes and chunk offsets are fixed up by the rewriter.
///
/// [`box_type`]: PayloadTransform::box_type
pub trait PayloadTransform {
    fn box_type(&self) -> BoxType;

    /// Returns the new payload, or `None` to keep the original bytes.
    fn apply(&mut self, payload: &[u8], stats: &mut RewriteStats) -> Result<Option<Bytes>>;
}

/// Switches AAC-LC `esds` descriptors to explicit hierarchical SBR signalling.
///
/// Descriptors that are not plain AAC-LC with a table sampling frequency and
/// an explicit channel configuration are left untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct SbrSignallingTransform;

impl SbrSignallingTransform {
    pub fn new() -> Self {
        Self
    }

    /// Returns the parsed config with its replacement, or the reason it has
    /// to be skipped.
    fn convert(data: &[u8]) -> std::result::Result<(AudioSpecificConfig, [u8; 4]), String> {
        let config = AudioSpecificConfig::parse(data).map_err(|e| e.to_string())?;

        if config.audio_object_type != AudioObjectType::AacLowComplexity {
            return Err(format!(
                "audio object type {} is not AAC LC",
                config.audio_object_type.value()
            ));
        }
        if !config.has_table_frequency() {
            return Err(format!(
                "sampling frequency index {} is not a table index",
                config.sampling_frequency_index
            ));
        }
        if config.channel_configuration == 0 {
            return Err("channel configuration 0 is not an explicit layout".to_string());
        }

        let sbr = config.explicit_sbr_config().map_err(|e| e.to_string())?;
        Ok((config, sbr))
    }
}

impl PayloadTransform for SbrSignallingTransform {
    fn box_type(&self) -> BoxType {
        BoxType::ESDS
    }

    fn apply(&mut self, payload: &[u8], stats: &mut RewriteStats) -> Result<Option<Bytes>> {
        let mut esds = EsdsBox::decode(payload)?;
        let mut changed = false;
        let mut failure = None;

        esds.visit_descriptors_mut(|descriptor| {
            if descriptor.tag != DECODER_SPECIFIC_INFO_TAG || failure.is_some() {
                return;
            }
            let Some(data) = descriptor.data() else {
                return;
            };

            match Self::convert(data) {
                Ok((config, sbr)) => {
                    debug!(
                        from = ?data,
                        to = ?sbr,
                        sample_rate = ?config.sampling_frequency(),
                        channels = config.channel_configuration,
                        "Rewriting AudioSpecificConfig with explicit SBR signalling"
                    );
                    match descriptor.set_data(sbr.to_vec()) {
                        Ok(()) => {
                            changed = true;
                            stats.descriptors_rewritten += 1;
                        }
                        Err(e) => failure = Some(e),
                    }
                }
                Err(reason) => {
                    warn!(config = ?data, "Skipping AudioSpecificConfig: {reason}");
                    stats.descriptors_skipped += 1;
                }
            }
        });

        if let Some(e) = failure {
            return Err(e.into());
        }
        if !changed {
            return Ok(None);
        }
        Ok(Some(esds.encode()?))
    }
}

#[cfg(test)]
mod tests {
    use mp4::test_support::make_esds_payload;

    use super::*;

    fn apply(dsi: &[u8]) -> (Option<Bytes>, RewriteStats) {
        let mut stats = RewriteStats::default();
        let out = SbrSignallingTransform::new()
            .apply(&make_esds_payload(dsi, 1), &mut stats)
            .unwrap();
        (out, stats)
    }

    fn dsi_of(payload: &[u8]) -> Vec<u8> {
        let esds = EsdsBox::decode(payload).unwrap();
        esds.descriptors[0].children()[0].children()[0]
            .data()
            .unwrap()
            .to_vec()
    }

    #[test]
    fn test_lc_stereo_44100_is_rewritten() {
        let (out, stats) = apply(&[0x12, 0x10]);
        let out = out.expect("payload rewritten");
        assert_eq!(dsi_of(&out), vec![0x2A, 0x12, 0x08, 0x00]);
        assert_eq!(out.len(), make_esds_payload(&[0x12, 0x10], 1).len() + 2);
        assert_eq!(stats.descriptors_rewritten, 1);
        assert_eq!(stats.descriptors_skipped, 0);
    }

    #[test]
    fn test_lc_mono_48000_is_rewritten() {
        // LC, index 3, mono
        let (out, _) = apply(&[0x11, 0x88]);
        assert_eq!(dsi_of(&out.unwrap()), vec![0x29, 0x89, 0x88, 0x00]);
    }

    #[test]
    fn test_convert_keeps_parsed_config() {
        let (config, sbr) = SbrSignallingTransform::convert(&[0x11, 0x88]).unwrap();
        assert_eq!(config.sampling_frequency(), Some(48000));
        assert_eq!(config.channel_configuration, 1);
        assert_eq!(sbr, [0x29, 0x89, 0x88, 0x00]);
    }

    #[test]
    fn test_non_lc_is_left_alone() {
        // AAC Main, index 4, stereo
        let (out, stats) = apply(&[0x0A, 0x10]);
        assert!(out.is_none());
        assert_eq!(stats.descriptors_skipped, 1);

        // already SBR-signalled
        let (out, stats) = apply(&[0x2A, 0x12, 0x08, 0x00]);
        assert!(out.is_none());
        assert_eq!(stats.descriptors_skipped, 1);
    }

    #[test]
    fn test_explicit_frequency_is_left_alone() {
        // LC, index 15, 24-bit 44100, stereo
        let (out, stats) = apply(&[0x17, 0x80, 0x56, 0x22, 0x10]);
        assert!(out.is_none());
        assert_eq!(stats.descriptors_skipped, 1);
    }

    #[test]
    fn test_channel_config_zero_is_left_alone() {
        // LC, index 4, channel configuration 0
        let (out, stats) = apply(&[0x12, 0x00]);
        assert!(out.is_none());
        assert_eq!(stats.descriptors_skipped, 1);
    }

    #[test]
    fn test_truncated_config_is_skipped() {
        let (out, stats) = apply(&[0x12]);
        assert!(out.is_none());
        assert_eq!(stats.descriptors_skipped, 1);
    }

    #[test]
    fn test_malformed_esds_is_an_error() {
        let mut stats = RewriteStats::default();
        let err = SbrSignallingTransform::new()
            .apply(&[0, 0, 0, 0, 0x03, 0x7F], &mut stats)
            .unwrap_err();
        assert!(matches!(err, crate::RewriteError::Mp4(_)));
    }
}

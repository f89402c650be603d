use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::api::constants::{
    DEFAULT_CHANNELS, DEFAULT_FRAME_SIZE, DEFAULT_SAMPLE_BITS, DEFAULT_SAMPLE_RATE,
};
use crate::api::error::{ErrorKind, Result};

/// Who a piece of speech is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SpeechTarget {
    #[default]
    Normal,
    Whisper,
    Shout,
    ServerLoopback,
}

/// Raw PCM addressed to one destination
#[derive(Debug, Clone)]
pub(crate) struct Speech {
    pub(crate) pcm: Bytes,
    pub(crate) target: SpeechTarget,
    pub(crate) target_id: u32,
}

impl Speech {
    pub(crate) fn label(&self) -> (SpeechTarget, u32) {
        (self.target, self.target_id)
    }
}

/// A single item on the producer queue
#[derive(Debug)]
pub(crate) enum Submission {
    Speech(Speech),
    /// the producer stopped talking
    Stop,
}

/// One encoded frame along with the destination its PCM was recorded for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedSpeech {
    pub encoded: Bytes,
    pub target: SpeechTarget,
    pub target_id: u32,
}

/// Audio format of the PCM submitted to an encoding buffer, fixed for its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    /// Samples per second
    pub sample_rate: u32,
    /// Bits per sample
    pub sample_bits: u8,
    /// 1 for mono, 2 for stereo
    pub channels: u8,
    /// Nominal frame size in samples
    pub frame_size: u16,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            sample_bits: DEFAULT_SAMPLE_BITS,
            channels: DEFAULT_CHANNELS,
            frame_size: DEFAULT_FRAME_SIZE,
        }
    }
}

impl EncodingConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(ErrorKind::InvalidConfig("sample_rate must be non-zero").into());
        }

        if self.sample_bits != 16 {
            return Err(ErrorKind::InvalidConfig("sample_bits must be 16").into());
        }

        if !(1..=2).contains(&self.channels) {
            return Err(ErrorKind::InvalidConfig("channels must be 1 or 2").into());
        }

        if self.frame_size == 0 {
            return Err(ErrorKind::InvalidConfig("frame_size must be non-zero").into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(EncodingConfig::default().validate().is_ok());

        let config = EncodingConfig {
            sample_bits: 8,
            ..Default::default()
        };
        assert!(matches!(
            config.validate().unwrap_err().kind,
            ErrorKind::InvalidConfig(_)
        ));

        let config = EncodingConfig {
            channels: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EncodingConfig {
            frame_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_json() {
        let config: EncodingConfig =
            serde_json::from_str(r#"{ "sample_rate": 16000, "channels": 2 }"#).unwrap();

        assert_eq!(config.sample_rate, 16_000);
        assert_eq!(config.channels, 2);
        assert_eq!(config.sample_bits, 16);
        assert_eq!(config.frame_size, 480);
    }

    #[test]
    fn test_submission_label() {
        let speech = Speech {
            pcm: Bytes::from_static(&[0, 1]),
            target: SpeechTarget::Whisper,
            target_id: 7,
        };

        assert_eq!(speech.label(), (SpeechTarget::Whisper, 7));
        assert_eq!(SpeechTarget::default(), SpeechTarget::Normal);
    }
}

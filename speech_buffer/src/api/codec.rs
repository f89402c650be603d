use std::collections::hash_map::Entry;
use std::collections::HashMap;

use bytes::Bytes;
use log::{debug, warn};
use sea_codec::encoder::{EncoderSettings, SeaEncoder};
use serde::{Deserialize, Serialize};

use crate::api::constants::{
    FRAME_MULTIPLIERS, SAMPLE_BYTES, SEA_RESIDUAL_BITS, SEA_SCALE_FACTOR_FRAMES,
};
use crate::api::error::{ErrorKind, Result};
use crate::api::items::EncodingConfig;

/// Identifies a codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodecKind {
    /// Uncompressed 16-bit PCM
    Pcm,
    Sea,
    /// No built-in encoder, register a binding with [`CodecSet::register`]
    Opus,
}

/// An encoder the encoding buffer can hand frames to
pub trait SpeechCodec: Send {
    /// The frame sizes this codec accepts in samples, ascending
    fn permitted_frame_sizes(&self) -> &[usize];

    /// Encodes exactly one frame of 16-bit little endian PCM
    fn encode(&mut self, pcm: &[u8]) -> Result<Bytes>;

    fn bitrate(&self) -> i32;

    fn set_bitrate(&mut self, bitrate: i32);
}

/// Supplies codec instances by kind
pub trait CodecProvider: Send {
    fn codec(&mut self, kind: CodecKind) -> Result<&mut dyn SpeechCodec>;

    /// The bitrate of the active codec, 0 when no codec exists yet
    fn bitrate(&self) -> i32;

    fn set_bitrate(&mut self, bitrate: i32);
}

type CodecFactory = Box<dyn Fn(&EncodingConfig) -> Result<Box<dyn SpeechCodec>> + Send>;

/// The default codec provider
///
/// Codecs are created on first use from their registered factory and kept
/// for the lifetime of the set. The bitrate setting is remembered so that
/// codecs created later start with it.
pub struct CodecSet {
    config: EncodingConfig,
    factories: HashMap<CodecKind, CodecFactory>,
    codecs: HashMap<CodecKind, Box<dyn SpeechCodec>>,
    /// the codec used by the most recent request
    active: Option<CodecKind>,
    bitrate: Option<i32>,
}

impl CodecSet {
    /// A set offering the built-in PCM and SEA codecs
    pub fn new(config: EncodingConfig) -> Result<Self> {
        let mut set = Self::empty(config)?;

        set.register(CodecKind::Pcm, |config| Ok(Box::new(PcmCodec::new(config))));
        set.register(CodecKind::Sea, |config| Ok(Box::new(SeaCodec::new(config))));

        Ok(set)
    }

    /// A set without any codecs, factories only ever see a validated config
    pub fn empty(config: EncodingConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            factories: HashMap::new(),
            codecs: HashMap::new(),
            active: None,
            bitrate: None,
        })
    }

    /// Registers or replaces the factory for `kind`
    ///
    /// An instance already created for `kind` is discarded.
    pub fn register<F>(&mut self, kind: CodecKind, factory: F)
    where
        F: Fn(&EncodingConfig) -> Result<Box<dyn SpeechCodec>> + Send + 'static,
    {
        self.factories.insert(kind, Box::new(factory));
        self.codecs.remove(&kind);

        if self.active == Some(kind) {
            self.active = None;
        }
    }

    pub fn config(&self) -> &EncodingConfig {
        &self.config
    }
}

impl CodecProvider for CodecSet {
    fn codec(&mut self, kind: CodecKind) -> Result<&mut dyn SpeechCodec> {
        let codec = match self.codecs.entry(kind) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let factory = self
                    .factories
                    .get(&kind)
                    .ok_or(ErrorKind::UnsupportedCodec(kind))?;

                let mut codec = factory(&self.config)?;

                if let Some(bitrate) = self.bitrate {
                    codec.set_bitrate(bitrate);
                }

                debug!(
                    "created {:?} codec with frame sizes {:?}",
                    kind,
                    codec.permitted_frame_sizes()
                );
                entry.insert(codec)
            }
        };

        self.active = Some(kind);
        Ok(codec.as_mut())
    }

    fn bitrate(&self) -> i32 {
        self.active
            .and_then(|kind| self.codecs.get(&kind))
            .map(|codec| codec.bitrate())
            .unwrap_or(0)
    }

    fn set_bitrate(&mut self, bitrate: i32) {
        self.bitrate = Some(bitrate);

        for codec in self.codecs.values_mut() {
            codec.set_bitrate(bitrate);
        }
    }
}

/// the nominal frame size and its multiples, in samples
fn nominal_frame_sizes(config: &EncodingConfig) -> Vec<usize> {
    FRAME_MULTIPLIERS
        .iter()
        .map(|multiplier| config.frame_size as usize * multiplier)
        .collect()
}

/// Passes PCM through untouched
pub struct PcmCodec {
    frame_sizes: Vec<usize>,
    bitrate: i32,
}

impl PcmCodec {
    pub fn new(config: &EncodingConfig) -> Self {
        Self::with_frame_sizes(config, nominal_frame_sizes(config))
    }

    /// A codec accepting `frame_sizes` samples per frame
    pub fn with_frame_sizes(config: &EncodingConfig, mut frame_sizes: Vec<usize>) -> Self {
        frame_sizes.sort_unstable();
        frame_sizes.dedup();

        Self {
            frame_sizes,
            bitrate: config.sample_rate as i32
                * config.sample_bits as i32
                * config.channels as i32,
        }
    }
}

impl SpeechCodec for PcmCodec {
    fn permitted_frame_sizes(&self) -> &[usize] {
        &self.frame_sizes
    }

    fn encode(&mut self, pcm: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(pcm))
    }

    fn bitrate(&self) -> i32 {
        self.bitrate
    }

    fn set_bitrate(&mut self, bitrate: i32) {
        warn!(
            "ignoring bitrate {} for uncompressed pcm, fixed at {}",
            bitrate, self.bitrate
        );
    }
}

/// Encodes each frame as a standalone SEA stream
pub struct SeaCodec {
    sample_rate: u32,
    channels: u8,
    frame_sizes: Vec<usize>,
    residual_bits: f32,
}

impl SeaCodec {
    pub fn new(config: &EncodingConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            channels: config.channels,
            frame_sizes: nominal_frame_sizes(config),
            residual_bits: SEA_RESIDUAL_BITS,
        }
    }

    /// bits per second carried by one residual bit per sample
    fn bits_per_residual(&self) -> f32 {
        self.sample_rate as f32 * self.channels as f32
    }
}

impl SpeechCodec for SeaCodec {
    fn permitted_frame_sizes(&self) -> &[usize] {
        &self.frame_sizes
    }

    fn encode(&mut self, pcm: &[u8]) -> Result<Bytes> {
        let frames = (pcm.len() / SAMPLE_BYTES)
            .checked_div(self.channels as usize)
            .ok_or_else(|| ErrorKind::Encode("SEA codec has no channels".to_string()))?;
        let frames_per_chunk = u16::try_from(frames)
            .map_err(|_| ErrorKind::Encode(format!("{} frames do not fit a SEA chunk", frames)))?;

        let settings = EncoderSettings {
            frames_per_chunk,
            scale_factor_frames: SEA_SCALE_FACTOR_FRAMES,
            residual_bits: self.residual_bits,
            vbr: false,
            ..Default::default()
        };

        let mut encoded = Vec::new();

        let mut encoder = SeaEncoder::new(
            self.channels,
            self.sample_rate,
            None,
            settings,
            pcm,
            &mut encoded,
        )
        .map_err(|error| ErrorKind::Encode(format!("{:?}", error)))?;

        while encoder.encode_frame().is_ok() {}
        drop(encoder);

        if encoded.is_empty() {
            return Err(ErrorKind::Encode("SEA encoder produced no output".to_string()).into());
        }

        Ok(Bytes::from(encoded))
    }

    fn bitrate(&self) -> i32 {
        (self.bits_per_residual() * self.residual_bits) as i32
    }

    fn set_bitrate(&mut self, bitrate: i32) {
        self.residual_bits = (bitrate as f32 / self.bits_per_residual()).clamp(1_f32, 8_f32);
        debug!("sea residual bits set to {}", self.residual_bits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_frame(samples: usize) -> Vec<u8> {
        (0..samples)
            .map(|i| ((i as f32 * 0.05).sin() * 8_000_f32) as i16)
            .flat_map(|sample| sample.to_le_bytes())
            .collect()
    }

    #[test]
    fn test_lazy_codecs() {
        let mut set = CodecSet::new(EncodingConfig::default()).unwrap();
        assert_eq!(set.bitrate(), 0);

        let codec = set.codec(CodecKind::Pcm).unwrap();
        assert_eq!(codec.permitted_frame_sizes(), &[480, 960, 1920]);
        assert_eq!(set.bitrate(), 48_000 * 16);
    }

    #[test]
    fn test_unsupported_codec() {
        let mut set = CodecSet::new(EncodingConfig::default()).unwrap();

        let error = set.codec(CodecKind::Opus).err().unwrap();
        assert!(matches!(
            error.kind,
            ErrorKind::UnsupportedCodec(CodecKind::Opus)
        ));
    }

    #[test]
    fn test_register() {
        let mut set = CodecSet::empty(EncodingConfig::default()).unwrap();
        assert!(set.codec(CodecKind::Pcm).is_err());

        set.register(CodecKind::Opus, |config| {
            Ok(Box::new(PcmCodec::with_frame_sizes(config, vec![960, 120, 480])))
        });

        let codec = set.codec(CodecKind::Opus).unwrap();
        assert_eq!(codec.permitted_frame_sizes(), &[120, 480, 960]);
    }

    #[test]
    fn test_bitrate_forwarding() {
        let mut set = CodecSet::new(EncodingConfig::default()).unwrap();

        // remembered until the codec exists
        set.set_bitrate(48_000 * 5);
        assert_eq!(set.bitrate(), 0);

        set.codec(CodecKind::Sea).unwrap();
        assert_eq!(set.bitrate(), 48_000 * 5);

        set.set_bitrate(48_000 * 2);
        assert_eq!(set.bitrate(), 48_000 * 2);

        // clamped to the residual range of the codec
        set.set_bitrate(i32::MAX);
        assert_eq!(set.bitrate(), 48_000 * 8);
    }

    #[test]
    fn test_set_rejects_invalid_config() {
        let config = EncodingConfig {
            channels: 0,
            ..Default::default()
        };

        let error = CodecSet::new(config).err().unwrap();
        assert!(matches!(error.kind, ErrorKind::InvalidConfig(_)));
        assert!(CodecSet::empty(config).is_err());
    }

    #[test]
    fn test_sea_without_channels() {
        let config = EncodingConfig {
            channels: 0,
            ..Default::default()
        };

        let mut codec = SeaCodec::new(&config);
        let error = codec.encode(&sine_frame(480)).unwrap_err();
        assert!(matches!(error.kind, ErrorKind::Encode(_)));
    }

    #[test]
    fn test_pcm_passthrough() {
        let mut codec = PcmCodec::new(&EncodingConfig::default());
        let frame = sine_frame(480);

        assert_eq!(codec.encode(&frame).unwrap(), Bytes::from(frame));
    }

    #[test]
    fn test_sea_encode() {
        let mut codec = SeaCodec::new(&EncodingConfig::default());

        let sizes = codec.permitted_frame_sizes().to_vec();

        for size in sizes {
            let frame = sine_frame(size);
            let encoded = codec.encode(&frame).unwrap();

            assert!(!encoded.is_empty());
            assert!(encoded.len() < frame.len());
            assert_eq!(&encoded[..4], b"seac");
        }
    }
}

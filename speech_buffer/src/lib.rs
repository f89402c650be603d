pub mod api;

pub use api::codec::{CodecKind, CodecProvider, CodecSet, PcmCodec, SeaCodec, SpeechCodec};
pub use api::encoding_buffer::{EncodingBuffer, SpeechSender};
pub use api::error::{Error, ErrorKind, Result};
pub use api::items::{EncodedSpeech, EncodingConfig, SpeechTarget};
pub use api::pump::EncoderPump;

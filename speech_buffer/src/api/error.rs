use std::collections::TryReserveError;
use std::fmt::{Display, Formatter};

use crate::api::codec::CodecKind;

pub type Result<T> = std::result::Result<T, Error>;

/// generic error type for the speech buffer
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
}

#[derive(Debug)]
pub enum ErrorKind {
    UnsupportedCodec(CodecKind),
    NoFrameSizes(CodecKind),
    InvalidFrameSizes(CodecKind),
    InvalidConfig(&'static str),
    Allocation(TryReserveError),
    KanalSend(kanal::SendError),
    Encode(String),
    PumpPanicked,
}

impl From<TryReserveError> for Error {
    fn from(err: TryReserveError) -> Self {
        Self {
            kind: ErrorKind::Allocation(err),
        }
    }
}

impl From<kanal::SendError> for Error {
    fn from(err: kanal::SendError) -> Self {
        Self {
            kind: ErrorKind::KanalSend(err),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self { kind }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self.kind {
                ErrorKind::UnsupportedCodec(kind) => format!("Unsupported codec: {:?}", kind),
                ErrorKind::NoFrameSizes(kind) =>
                    format!("Codec {:?} reported no permitted frame sizes", kind),
                ErrorKind::InvalidFrameSizes(kind) => format!(
                    "Codec {:?} reported a zero or unordered frame size",
                    kind
                ),
                ErrorKind::InvalidConfig(reason) => format!("Invalid config: {}", reason),
                ErrorKind::Allocation(ref err) => format!("Allocation error: {}", err),
                ErrorKind::KanalSend(ref err) => format!("Kanal send error: {}", err),
                ErrorKind::Encode(ref message) => format!("Encode error: {}", message),
                ErrorKind::PumpPanicked => "Encoder pump panicked".to_string(),
            }
        )
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let error = Error::from(ErrorKind::UnsupportedCodec(CodecKind::Opus));
        assert_eq!(error.to_string(), "Unsupported codec: Opus");

        let error = Error::from(ErrorKind::InvalidConfig("sample_bits must be 16"));
        assert_eq!(error.to_string(), "Invalid config: sample_bits must be 16");

        let error = Error::from(ErrorKind::InvalidFrameSizes(CodecKind::Pcm));
        assert_eq!(
            error.to_string(),
            "Codec Pcm reported a zero or unordered frame size"
        );
    }
}

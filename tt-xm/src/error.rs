//! XM loading error types

use thiserror::Error;
use tt_shared::{IoError, MemoryError};

/// Errors raised while loading, compressing or decoding XM data
///
/// Everything except `Io` and `Memory` is a format error: the asset is
/// rejected as a whole and never partially played.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum XmError {
    #[error("file too small to contain XM header")]
    TooSmall,
    #[error("invalid XM magic string")]
    InvalidMagic,
    #[error("unsupported XM version: 0x{0:04X}")]
    UnsupportedVersion(u16),
    #[error("invalid channel count: {0} (1-{max})", max = crate::MAX_CHANNELS)]
    InvalidChannelCount(u16),
    #[error("too many patterns: {0} (max {max})", max = crate::MAX_PATTERNS)]
    TooManyPatterns(u16),
    #[error("too many instruments: {0} (max {max})", max = crate::MAX_INSTRUMENTS)]
    TooManyInstruments(u16),
    #[error("order {order} references pattern {pattern} of {count}")]
    InvalidOrder { order: u16, pattern: u8, count: u16 },
    #[error("invalid pattern data at index {0}")]
    InvalidPattern(u16),
    #[error("malformed compressed pattern data at offset {0}")]
    MalformedPatternData(usize),
    #[error("pattern buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },
    #[error("invalid instrument at index {0}")]
    InvalidInstrument(u16),
    #[error("invalid envelope on instrument {0}")]
    InvalidEnvelope(u16),
    #[error("instrument {instrument} maps a note to sample {sample} of {count}")]
    InvalidKeymap { instrument: u16, sample: u8, count: u16 },
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(XmError::TooSmall.to_string(), "file too small to contain XM header");
        assert_eq!(
            XmError::UnsupportedVersion(0x0103).to_string(),
            "unsupported XM version: 0x0103"
        );
        assert_eq!(
            XmError::InvalidChannelCount(64).to_string(),
            "invalid channel count: 64 (1-32)"
        );
        assert_eq!(
            XmError::TooManyPatterns(300).to_string(),
            "too many patterns: 300 (max 256)"
        );
        assert_eq!(
            XmError::TooManyInstruments(200).to_string(),
            "too many instruments: 200 (max 128)"
        );
        assert_eq!(
            XmError::from(IoError::InUse).to_string(),
            "I/O error: file handle already in use"
        );
    }
}

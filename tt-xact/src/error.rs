//! Bank loading and cue lookup errors

use thiserror::Error;
use tt_shared::{IoError, MemoryError};

/// Errors raised while loading banks or resolving cues
///
/// Bank errors are load-time fatal: a bank that fails validation is never
/// handed to the engine. Runtime cue controls do not return errors; they
/// report no-ops as `false`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum XactError {
    #[error("invalid bank magic {found:?}, expected {expected:?}")]
    InvalidMagic { expected: [u8; 4], found: [u8; 4] },
    #[error("unsupported bank version {0}")]
    UnsupportedVersion(u16),
    #[error("invalid string in bank: {0}")]
    InvalidString(String),
    #[error("unknown wave format {0}")]
    InvalidWaveFormat(u8),
    #[error("unknown event kind {0}")]
    InvalidEventKind(u8),
    #[error("unknown variation mode {0}")]
    InvalidVariationMode(u8),
    #[error("unknown RPC parameter {0}")]
    InvalidRpcParameter(u8),
    #[error("wave {wave}: {reason}")]
    InvalidWave { wave: usize, reason: String },
    #[error("cue {0} has no variations")]
    EmptyCue(usize),
    #[error("cue {cue} references sound {sound} of {count}")]
    InvalidSoundIndex { cue: usize, sound: u16, count: usize },
    #[error("sound {sound} references category {category} of {count}")]
    InvalidCategory {
        sound: usize,
        category: u16,
        count: usize,
    },
    #[error("sound {sound} track {track} event {event} references wave {wave} of {count}")]
    InvalidWaveIndex {
        sound: usize,
        track: usize,
        event: usize,
        wave: u16,
        count: usize,
    },
    #[error("unknown cue '{0}'")]
    UnknownCue(String),
    #[error("cue index {0} out of range")]
    InvalidCueIndex(usize),
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),
}

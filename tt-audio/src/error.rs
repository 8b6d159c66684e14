//! Audio front-door error types

use thiserror::Error;
use tt_shared::IoError;
use tt_xact::XactError;
use tt_xm::XmError;

/// Errors surfaced by loading, configuration and thread setup
///
/// Playback itself never fails: controls on a player with nothing loaded
/// are no-ops and the mixer renders silence.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AudioError {
    #[error("XM error: {0}")]
    Xm(#[from] XmError),
    #[error("bank error: {0}")]
    Xact(#[from] XactError),
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
    #[error("failed to read config {path}: {reason}")]
    ConfigRead { path: String, reason: String },
    #[error("invalid config: {0}")]
    ConfigParse(String),
    #[error("failed to write config {path}: {reason}")]
    ConfigWrite { path: String, reason: String },
    #[error("failed to spawn mixer thread: {0}")]
    ThreadSpawn(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            AudioError::from(XmError::InvalidMagic).to_string(),
            "XM error: invalid XM magic string"
        );
        assert_eq!(
            AudioError::from(XactError::EmptyCue(2)).to_string(),
            "bank error: cue 2 has no variations"
        );
        assert_eq!(
            AudioError::ThreadSpawn("out of handles".to_string()).to_string(),
            "failed to spawn mixer thread: out of handles"
        );
    }
}

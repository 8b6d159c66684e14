//! Error types for file I/O and memory accounting

use thiserror::Error;

use crate::AllocType;

/// File I/O errors
///
/// `CantOpen` and `InUse` are the recoverable open failures; the rest are
/// reported while reading an already-open stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IoError {
    /// The path could not be opened (missing, permissions, not in archive)
    #[error("can't open file: {0}")]
    CantOpen(String),
    /// `open` was called on a handle that already has a file open
    #[error("file handle already in use")]
    InUse,
    /// A read or seek was attempted with no file open
    #[error("no file is open")]
    NotOpen,
    /// Read past the end of the stream
    #[error("unexpected end of file at offset {0}")]
    UnexpectedEof(u64),
    /// Seek target lies beyond the end of the stream
    #[error("seek to {offset} past end of file (length {len})")]
    SeekOutOfRange { offset: u64, len: u64 },
    /// The container looked compressed but could not be inflated
    #[error("decompression failed: {0}")]
    Decompress(String),
    /// `decompress` must run before any other read
    #[error("decompress called after reading from the stream")]
    DecompressAfterRead,
    /// Underlying OS error
    #[error("I/O error: {0}")]
    Os(String),
}

impl From<std::io::Error> for IoError {
    fn from(e: std::io::Error) -> Self {
        IoError::Os(e.to_string())
    }
}

/// Memory accounting errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// The per-kind budget configured on a [`crate::TrackingMemoryManager`] would be exceeded
    #[error("{kind:?} budget exceeded: requested {requested} bytes with {in_use} of {budget} in use")]
    BudgetExceeded {
        kind: AllocType,
        requested: usize,
        in_use: usize,
        budget: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            IoError::CantOpen("song.xm".into()).to_string(),
            "can't open file: song.xm"
        );
        assert_eq!(IoError::InUse.to_string(), "file handle already in use");
        assert_eq!(
            IoError::UnexpectedEof(12).to_string(),
            "unexpected end of file at offset 12"
        );
        assert_eq!(
            MemoryError::BudgetExceeded {
                kind: AllocType::Sample,
                requested: 10,
                in_use: 95,
                budget: 100
            }
            .to_string(),
            "Sample budget exceeded: requested 10 bytes with 95 of 100 in use"
        );
    }
}

//! Shared services for the tt audio core
//!
//! The audio core never touches storage or the global allocator directly.
//! Everything it loads goes through two collaborator seams defined here:
//!
//! - [`XmFileIo`] - an endian-aware byte reader over a file handle
//!   ([`DiskFile`]) or an already-loaded blob ([`MemoryFile`]), with optional
//!   in-place decompression of gzip/zlib wrapped containers.
//! - [`MemoryManager`] - a pluggable allocation accounting interface keyed by
//!   [`AllocType`], so a host can budget or pool sample, pattern and mixer
//!   memory separately. [`Allocation`] is the typed buffer that reports to it.

mod error;
mod io;
mod memory;

pub use error::{IoError, MemoryError};
pub use io::{DiskFile, MemoryFile, XmFileIo, inflate_container};
pub use memory::{
    AllocType, Allocation, HeapMemoryManager, MemoryManager, SharedMemoryManager,
    TrackingMemoryManager,
};

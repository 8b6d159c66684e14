//! Byte-stream readers over module and bank files
//!
//! Endianness is chosen when a file is opened and applies to every multi-byte
//! read that follows. Both readers keep their own position so `position()`
//! never needs mutable access.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::read::{GzDecoder, ZlibDecoder};
use hashbrown::HashMap;
use tracing::{debug, trace};

use crate::IoError;

/// Abstract reader used by every loader in the audio core
///
/// Implementors provide raw byte access; the endian-aware integer readers are
/// provided on top of [`XmFileIo::read_bytes`].
pub trait XmFileIo: Send {
    /// Open `path` for reading. Fails with [`IoError::InUse`] if a file is
    /// already open on this handle.
    fn open(&mut self, path: &str, big_endian: bool) -> Result<(), IoError>;

    /// Whether a file is currently open
    fn is_open(&self) -> bool;

    /// Byte order fixed at open time
    fn big_endian(&self) -> bool;

    /// Fill `dst` completely from the current position
    fn read_bytes(&mut self, dst: &mut [u8]) -> Result<(), IoError>;

    /// Seek to an absolute offset
    fn seek(&mut self, offset: u64) -> Result<(), IoError>;

    /// Current absolute offset
    fn position(&self) -> u64;

    /// Length of the stream (decompressed length after [`XmFileIo::decompress`])
    fn len(&self) -> u64;

    /// Close the file; the handle may be reopened afterwards
    fn close(&mut self);

    /// Inflate a gzip/zlib wrapped container in place.
    ///
    /// Must be called before any other read. Raw payloads are left untouched.
    fn decompress(&mut self) -> Result<(), IoError>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes left between the current position and the end
    fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.position())
    }

    fn skip(&mut self, count: u64) -> Result<(), IoError> {
        let target = self.position() + count;
        self.seek(target)
    }

    fn read_u8(&mut self) -> Result<u8, IoError> {
        let mut buf = [0u8; 1];
        self.read_bytes(&mut buf)?;
        Ok(buf[0])
    }

    fn read_i8(&mut self) -> Result<i8, IoError> {
        Ok(self.read_u8()? as i8)
    }

    fn read_u16(&mut self) -> Result<u16, IoError> {
        let mut buf = [0u8; 2];
        self.read_bytes(&mut buf)?;
        Ok(if self.big_endian() {
            BigEndian::read_u16(&buf)
        } else {
            LittleEndian::read_u16(&buf)
        })
    }

    fn read_i16(&mut self) -> Result<i16, IoError> {
        Ok(self.read_u16()? as i16)
    }

    fn read_u32(&mut self) -> Result<u32, IoError> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(if self.big_endian() {
            BigEndian::read_u32(&buf)
        } else {
            LittleEndian::read_u32(&buf)
        })
    }

    fn read_f32(&mut self) -> Result<f32, IoError> {
        Ok(f32::from_bits(self.read_u32()?))
    }
}

/// Inflate `data` if it carries a gzip or zlib header.
///
/// Returns `Ok(None)` for payloads that are not compressed.
pub fn inflate_container(data: &[u8]) -> Result<Option<Vec<u8>>, IoError> {
    let mut out = Vec::new();
    if data.len() >= 2 && data[0] == 0x1F && data[1] == 0x8B {
        GzDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| IoError::Decompress(e.to_string()))?;
        return Ok(Some(out));
    }
    // zlib: CM=8 in the low nibble and the header checksum divides by 31
    if data.len() >= 2
        && data[0] & 0x0F == 8
        && (u16::from(data[0]) << 8 | u16::from(data[1])) % 31 == 0
    {
        ZlibDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| IoError::Decompress(e.to_string()))?;
        return Ok(Some(out));
    }
    Ok(None)
}

// =============================================================================
// Disk files
// =============================================================================

enum DiskBacking {
    File(BufReader<File>),
    Inflated(Vec<u8>),
}

struct OpenDiskFile {
    backing: DiskBacking,
    len: u64,
    pos: u64,
    big_endian: bool,
}

/// Reader over a file on the local file system
///
/// Paths are resolved relative to an optional root directory so a host can
/// point the loader at an asset folder.
#[derive(Default)]
pub struct DiskFile {
    root: Option<PathBuf>,
    open: Option<OpenDiskFile>,
}

impl DiskFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative paths against `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            open: None,
        }
    }

    fn open_file(&mut self) -> Result<&mut OpenDiskFile, IoError> {
        self.open.as_mut().ok_or(IoError::NotOpen)
    }
}

impl XmFileIo for DiskFile {
    fn open(&mut self, path: &str, big_endian: bool) -> Result<(), IoError> {
        if self.open.is_some() {
            return Err(IoError::InUse);
        }
        let full = match &self.root {
            Some(root) => root.join(path),
            None => PathBuf::from(path),
        };
        let file = File::open(&full).map_err(|e| {
            debug!("open {} failed: {}", full.display(), e);
            IoError::CantOpen(full.display().to_string())
        })?;
        let len = file.metadata()?.len();
        trace!("opened {} ({} bytes)", full.display(), len);
        self.open = Some(OpenDiskFile {
            backing: DiskBacking::File(BufReader::new(file)),
            len,
            pos: 0,
            big_endian,
        });
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.is_some()
    }

    fn big_endian(&self) -> bool {
        self.open.as_ref().is_some_and(|f| f.big_endian)
    }

    fn read_bytes(&mut self, dst: &mut [u8]) -> Result<(), IoError> {
        let file = self.open_file()?;
        if file.pos + dst.len() as u64 > file.len {
            return Err(IoError::UnexpectedEof(file.pos));
        }
        match &mut file.backing {
            DiskBacking::File(reader) => reader.read_exact(dst)?,
            DiskBacking::Inflated(data) => {
                let start = file.pos as usize;
                dst.copy_from_slice(&data[start..start + dst.len()]);
            }
        }
        file.pos += dst.len() as u64;
        Ok(())
    }

    fn seek(&mut self, offset: u64) -> Result<(), IoError> {
        let file = self.open_file()?;
        if offset > file.len {
            return Err(IoError::SeekOutOfRange {
                offset,
                len: file.len,
            });
        }
        if let DiskBacking::File(reader) = &mut file.backing {
            reader.seek(SeekFrom::Start(offset))?;
        }
        file.pos = offset;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.open.as_ref().map_or(0, |f| f.pos)
    }

    fn len(&self) -> u64 {
        self.open.as_ref().map_or(0, |f| f.len)
    }

    fn close(&mut self) {
        self.open = None;
    }

    fn decompress(&mut self) -> Result<(), IoError> {
        let file = self.open_file()?;
        if file.pos != 0 {
            return Err(IoError::DecompressAfterRead);
        }
        let raw = match &mut file.backing {
            DiskBacking::File(reader) => {
                let mut raw = Vec::with_capacity(file.len as usize);
                reader.read_to_end(&mut raw)?;
                raw
            }
            DiskBacking::Inflated(_) => return Ok(()),
        };
        let data = match inflate_container(&raw)? {
            Some(inflated) => {
                debug!("inflated container {} -> {} bytes", raw.len(), inflated.len());
                inflated
            }
            None => raw,
        };
        file.len = data.len() as u64;
        file.backing = DiskBacking::Inflated(data);
        Ok(())
    }
}

// =============================================================================
// In-memory files
// =============================================================================

struct OpenMemoryFile {
    data: Arc<[u8]>,
    pos: u64,
    big_endian: bool,
}

/// Reader over named blobs that are already resident in memory
///
/// Acts as a tiny virtual file system: a packed archive can register each of
/// its entries and the loaders open them by name like files on disk.
#[derive(Default)]
pub struct MemoryFile {
    files: HashMap<String, Arc<[u8]>>,
    open: Option<OpenMemoryFile>,
}

impl MemoryFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor for a single named blob
    pub fn single(name: &str, data: impl Into<Arc<[u8]>>) -> Self {
        let mut io = Self::new();
        io.insert(name, data);
        io
    }

    /// Register (or replace) a blob under `name`
    pub fn insert(&mut self, name: &str, data: impl Into<Arc<[u8]>>) {
        self.files.insert(name.to_string(), data.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    fn open_file(&mut self) -> Result<&mut OpenMemoryFile, IoError> {
        self.open.as_mut().ok_or(IoError::NotOpen)
    }
}

impl XmFileIo for MemoryFile {
    fn open(&mut self, path: &str, big_endian: bool) -> Result<(), IoError> {
        if self.open.is_some() {
            return Err(IoError::InUse);
        }
        let data = self
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| IoError::CantOpen(path.to_string()))?;
        self.open = Some(OpenMemoryFile {
            data,
            pos: 0,
            big_endian,
        });
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.is_some()
    }

    fn big_endian(&self) -> bool {
        self.open.as_ref().is_some_and(|f| f.big_endian)
    }

    fn read_bytes(&mut self, dst: &mut [u8]) -> Result<(), IoError> {
        let file = self.open_file()?;
        let start = file.pos as usize;
        let end = start + dst.len();
        if end > file.data.len() {
            return Err(IoError::UnexpectedEof(file.pos));
        }
        dst.copy_from_slice(&file.data[start..end]);
        file.pos = end as u64;
        Ok(())
    }

    fn seek(&mut self, offset: u64) -> Result<(), IoError> {
        let file = self.open_file()?;
        let len = file.data.len() as u64;
        if offset > len {
            return Err(IoError::SeekOutOfRange { offset, len });
        }
        file.pos = offset;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.open.as_ref().map_or(0, |f| f.pos)
    }

    fn len(&self) -> u64 {
        self.open.as_ref().map_or(0, |f| f.data.len() as u64)
    }

    fn close(&mut self) {
        self.open = None;
    }

    fn decompress(&mut self) -> Result<(), IoError> {
        let file = self.open_file()?;
        if file.pos != 0 {
            return Err(IoError::DecompressAfterRead);
        }
        if let Some(inflated) = inflate_container(&file.data)? {
            debug!(
                "inflated container {} -> {} bytes",
                file.data.len(),
                inflated.len()
            );
            file.data = inflated.into();
        }
        Ok(())
    }
}

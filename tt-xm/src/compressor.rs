//! FT2 packed-note pattern compression
//!
//! Each cell is written either as five raw bytes (note, instrument, volume,
//! effect, parameter) or as a control byte with the high bit set followed by
//! only the fields that are non-zero:
//!
//! - Bit 0 (0x01): note
//! - Bit 1 (0x02): instrument
//! - Bit 2 (0x04): volume column
//! - Bit 3 (0x08): effect
//! - Bit 4 (0x10): effect parameter
//!
//! An empty cell is the single byte 0x80. A cell with all five fields set is
//! stored raw, since packing would only add the control byte. This is the
//! layout FastTracker 2 writes, so compressed patterns byte-match real files.

use crate::error::XmError;
use crate::module::XmNote;

const PACKED: u8 = 0x80;
const HAS_NOTE: u8 = 0x01;
const HAS_INSTRUMENT: u8 = 0x02;
const HAS_VOLUME: u8 = 0x04;
const HAS_EFFECT: u8 = 0x08;
const HAS_PARAM: u8 = 0x10;

/// Control byte mask for a cell, or `None` if all fields are present
fn cell_mask(note: &XmNote) -> Option<u8> {
    let mut mask = 0u8;
    if note.note != 0 {
        mask |= HAS_NOTE;
    }
    if note.instrument != 0 {
        mask |= HAS_INSTRUMENT;
    }
    if note.volume != 0 {
        mask |= HAS_VOLUME;
    }
    if note.effect != 0 {
        mask |= HAS_EFFECT;
    }
    if note.effect_param != 0 {
        mask |= HAS_PARAM;
    }
    (mask != 0x1F).then_some(mask)
}

fn cell_size(note: &XmNote) -> usize {
    match cell_mask(note) {
        Some(mask) => 1 + mask.count_ones() as usize,
        None => 5,
    }
}

/// Compress `rows * channels` row-major cells
///
/// With `dest == None` nothing is written and only the compressed size is
/// returned. Callers size their buffer with a dry run and then compress for
/// real; both calls return the same length for the same input.
pub fn compress_pattern(
    rows: u16,
    channels: u8,
    src: &[XmNote],
    dest: Option<&mut [u8]>,
) -> Result<usize, XmError> {
    let cells = rows as usize * channels as usize;
    if src.len() != cells {
        return Err(XmError::InvalidPattern(rows));
    }

    let Some(dest) = dest else {
        return Ok(src.iter().map(cell_size).sum());
    };

    let needed: usize = src.iter().map(cell_size).sum();
    if dest.len() < needed {
        return Err(XmError::BufferTooSmall {
            needed,
            available: dest.len(),
        });
    }

    let mut pos = 0;
    for note in src {
        match cell_mask(note) {
            None => {
                dest[pos..pos + 5].copy_from_slice(&[
                    note.note,
                    note.instrument,
                    note.volume,
                    note.effect,
                    note.effect_param,
                ]);
                pos += 5;
            }
            Some(mask) => {
                dest[pos] = PACKED | mask;
                pos += 1;
                for (bit, value) in [
                    (HAS_NOTE, note.note),
                    (HAS_INSTRUMENT, note.instrument),
                    (HAS_VOLUME, note.volume),
                    (HAS_EFFECT, note.effect),
                    (HAS_PARAM, note.effect_param),
                ] {
                    if mask & bit != 0 {
                        dest[pos] = value;
                        pos += 1;
                    }
                }
            }
        }
    }

    Ok(pos)
}

/// Decode one cell starting at `*pos`, advancing past it
pub fn unpack_note(data: &[u8], pos: &mut usize) -> Result<XmNote, XmError> {
    let start = *pos;
    let mut next = || -> Result<u8, XmError> {
        let byte = *data.get(*pos).ok_or(XmError::MalformedPatternData(start))?;
        *pos += 1;
        Ok(byte)
    };

    let first = next()?;
    if first & PACKED == 0 {
        return Ok(XmNote {
            note: first,
            instrument: next()?,
            volume: next()?,
            effect: next()?,
            effect_param: next()?,
        });
    }

    let mut note = XmNote::default();
    if first & HAS_NOTE != 0 {
        note.note = next()?;
    }
    if first & HAS_INSTRUMENT != 0 {
        note.instrument = next()?;
    }
    if first & HAS_VOLUME != 0 {
        note.volume = next()?;
    }
    if first & HAS_EFFECT != 0 {
        note.effect = next()?;
    }
    if first & HAS_PARAM != 0 {
        note.effect_param = next()?;
    }
    Ok(note)
}

/// Streaming row decoder over compressed pattern data
#[derive(Debug, Clone)]
pub struct PatternReader<'a> {
    data: &'a [u8],
    rows: u16,
    channels: u8,
    row: u16,
    offset: usize,
}

impl<'a> PatternReader<'a> {
    pub fn new(data: &'a [u8], rows: u16, channels: u8) -> Self {
        Self {
            data,
            rows,
            channels,
            row: 0,
            offset: 0,
        }
    }

    /// Index of the row the next call to [`Self::next_row`] decodes
    pub fn row(&self) -> u16 {
        self.row
    }

    /// Byte offset of the next row
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Resume at a `(row, offset)` pair previously taken from a reader over
    /// the same data
    pub fn resume(&mut self, row: u16, offset: usize) {
        self.row = row.min(self.rows);
        self.offset = offset.min(self.data.len());
    }

    /// Restart at the first row
    pub fn rewind(&mut self) {
        self.row = 0;
        self.offset = 0;
    }

    /// Position the reader on `row`, decoding and discarding earlier rows
    pub fn seek_row(&mut self, row: u16) -> Result<(), XmError> {
        if row < self.row {
            self.rewind();
        }
        let cells = (row.min(self.rows) - self.row) as usize * self.channels as usize;
        for _ in 0..cells {
            unpack_note(self.data, &mut self.offset)?;
        }
        self.row = row.min(self.rows);
        Ok(())
    }

    /// Decode the next row into `out`, returning `false` past the last row
    ///
    /// `out` receives `min(out.len(), channels)` cells; extra channels in the
    /// data are skipped.
    pub fn next_row(&mut self, out: &mut [XmNote]) -> Result<bool, XmError> {
        if self.row >= self.rows {
            return Ok(false);
        }
        for ch in 0..self.channels as usize {
            let note = unpack_note(self.data, &mut self.offset)?;
            if let Some(slot) = out.get_mut(ch) {
                *slot = note;
            }
        }
        self.row += 1;
        Ok(true)
    }
}

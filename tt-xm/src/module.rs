//! XM module data structures
//!
//! Everything here is immutable once loaded. Players share a module through an
//! `Arc<XmModule>` and keep their own mutable state.

use tt_shared::{AllocType, Allocation, SharedMemoryManager};

use crate::compressor::{PatternReader, compress_pattern};
use crate::envelope::XmEnvelope;
use crate::error::XmError;
use crate::{KEYMAP_SIZE, NOTE_MAX, NOTE_MIN, NOTE_OFF};

/// Parsed XM module
#[derive(Debug)]
pub struct XmModule {
    /// Module name (max 20 chars)
    pub name: String,
    /// Tracker that saved the file
    pub tracker_name: String,
    /// Number of channels (1-32)
    pub num_channels: u8,
    /// Order to resume from when the song loops
    pub restart_position: u16,
    /// Initial ticks per row
    pub default_speed: u16,
    /// Initial BPM
    pub default_bpm: u16,
    /// Linear frequency table (otherwise Amiga periods)
    pub linear_frequency_table: bool,
    /// Pattern index for each song position, `song_length` entries
    pub order_table: Allocation<u8>,
    pub patterns: Vec<XmPattern>,
    pub instruments: Vec<XmInstrument>,
}

impl XmModule {
    /// Get the pattern at the given order position
    pub fn pattern_at_order(&self, order: u16) -> Option<&XmPattern> {
        let pattern_idx = *self.order_table.get(order as usize)? as usize;
        self.patterns.get(pattern_idx)
    }

    /// Number of entries in the order table
    pub fn song_length(&self) -> u16 {
        self.order_table.len() as u16
    }

    /// Instrument by its 1-based pattern number
    pub fn instrument(&self, number: u8) -> Option<&XmInstrument> {
        self.instruments.get((number as usize).checked_sub(1)?)
    }

    /// Total bytes of decoded sample data
    pub fn sample_bytes(&self) -> usize {
        self.instruments
            .iter()
            .flat_map(|i| &i.samples)
            .map(|s| s.data.byte_len())
            .sum()
    }
}

/// Pattern held in compressed form
#[derive(Debug)]
pub struct XmPattern {
    /// Number of rows (1-256)
    pub num_rows: u16,
    pub num_channels: u8,
    /// Packed cells, see [`compress_pattern`]
    pub data: Allocation<u8>,
}

impl XmPattern {
    /// Compress a row-major cell array into a new pattern buffer
    ///
    /// The buffer is sized by a dry run of the compressor before it is
    /// allocated, so the manager sees exactly the bytes that are kept.
    pub fn from_notes(
        memory: &SharedMemoryManager,
        num_rows: u16,
        num_channels: u8,
        notes: &[XmNote],
    ) -> Result<Self, XmError> {
        let size = compress_pattern(num_rows, num_channels, notes, None)?;
        let mut data = Allocation::zeroed(memory, size, AllocType::Pattern)?;
        compress_pattern(num_rows, num_channels, notes, Some(&mut data))?;
        Ok(Self {
            num_rows,
            num_channels,
            data,
        })
    }

    /// Row-by-row decoder over the packed data
    pub fn reader(&self) -> PatternReader<'_> {
        PatternReader::new(&self.data, self.num_rows, self.num_channels)
    }

    /// Decode the whole pattern, row-major
    pub fn unpack(&self) -> Result<Vec<XmNote>, XmError> {
        let mut reader = self.reader();
        let mut notes = Vec::with_capacity(self.num_rows as usize * self.num_channels as usize);
        let mut row = vec![XmNote::default(); self.num_channels as usize];
        while reader.next_row(&mut row)? {
            notes.extend_from_slice(&row);
        }
        Ok(notes)
    }
}

/// Single cell of a pattern
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XmNote {
    /// 0=none, 1-96=C-0..B-7, 97=note-off
    pub note: u8,
    /// 0=none, 1-128=instrument
    pub instrument: u8,
    /// Volume column: 0=none, 0x10-0x50=set volume, others=effects
    pub volume: u8,
    pub effect: u8,
    pub effect_param: u8,
}

impl XmNote {
    #[inline]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    #[inline]
    pub fn is_note_off(&self) -> bool {
        self.note == NOTE_OFF
    }

    /// Check if this cell triggers a new note
    #[inline]
    pub fn has_note(&self) -> bool {
        (NOTE_MIN..=NOTE_MAX).contains(&self.note)
    }

    #[inline]
    pub fn has_instrument(&self) -> bool {
        self.instrument > 0
    }

    #[inline]
    pub fn has_effect(&self) -> bool {
        self.effect != 0 || self.effect_param != 0
    }

    /// Volume if the volume column holds a set-volume (0x10-0x50)
    #[inline]
    pub fn get_volume(&self) -> Option<u8> {
        (0x10..=0x50)
            .contains(&self.volume)
            .then(|| self.volume - 0x10)
    }

    /// Volume column effect as `(kind, parameter)`
    ///
    /// - 0x6: volume slide down
    /// - 0x7: volume slide up
    /// - 0x8: fine volume slide down
    /// - 0x9: fine volume slide up
    /// - 0xA: vibrato speed
    /// - 0xB: vibrato depth
    /// - 0xC: set panning
    /// - 0xD: panning slide left
    /// - 0xE: panning slide right
    /// - 0xF: tone portamento
    pub fn get_volume_effect(&self) -> Option<(u8, u8)> {
        (self.volume >= 0x60).then(|| (self.volume >> 4, self.volume & 0x0F))
    }
}

/// Sample loop mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoopType {
    #[default]
    None,
    Forward,
    PingPong,
}

impl LoopType {
    /// Decode the low two bits of the XM sample type byte
    pub fn from_flags(flags: u8) -> Self {
        match flags & 0x03 {
            1 => LoopType::Forward,
            2 | 3 => LoopType::PingPong,
            _ => LoopType::None,
        }
    }

    pub fn to_flags(self) -> u8 {
        match self {
            LoopType::None => 0,
            LoopType::Forward => 1,
            LoopType::PingPong => 2,
        }
    }
}

/// Decoded sample, loop points in frames
#[derive(Debug)]
pub struct XmSample {
    pub name: String,
    pub data: Allocation<i16>,
    pub loop_start: u32,
    pub loop_length: u32,
    pub loop_type: LoopType,
    /// Default volume (0-64)
    pub volume: u8,
    /// Finetune in 1/128 semitone
    pub finetune: i8,
    /// Default panning (0-255, 128 centre)
    pub panning: u8,
    /// Semitone offset relative to C-4
    pub relative_note: i8,
}

impl XmSample {
    /// A non-looping sample at full volume, centred
    pub fn new(
        memory: &SharedMemoryManager,
        name: &str,
        frames: Vec<i16>,
    ) -> Result<Self, XmError> {
        Ok(Self {
            name: name.to_string(),
            data: Allocation::from_vec(memory, frames, AllocType::Sample)?,
            loop_start: 0,
            loop_length: 0,
            loop_type: LoopType::None,
            volume: 64,
            finetune: 0,
            panning: 128,
            relative_note: 0,
        })
    }

    pub fn with_loop(mut self, start: u32, length: u32, loop_type: LoopType) -> Self {
        self.loop_start = start;
        self.loop_length = length;
        self.loop_type = loop_type;
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn loop_end(&self) -> u32 {
        self.loop_start.saturating_add(self.loop_length)
    }

    /// True if the sample loops over a non-empty region
    pub fn is_looping(&self) -> bool {
        self.loop_type != LoopType::None && self.loop_length > 0
    }
}

/// Instrument with its samples
#[derive(Debug)]
pub struct XmInstrument {
    pub name: String,
    /// Sample index for each of the 96 notes
    pub keymap: Allocation<u8>,
    pub volume_envelope: XmEnvelope,
    pub panning_envelope: XmEnvelope,
    /// Auto-vibrato type (0=sine, 1=square, 2=ramp down, 3=ramp up)
    pub vibrato_type: u8,
    pub vibrato_sweep: u8,
    pub vibrato_depth: u8,
    pub vibrato_rate: u8,
    /// Volume fadeout per tick after key-off (0-4095)
    pub volume_fadeout: u16,
    pub samples: Vec<XmSample>,
}

impl XmInstrument {
    /// Instrument with every note mapped to sample 0 and no envelopes
    pub fn new(
        memory: &SharedMemoryManager,
        name: &str,
        samples: Vec<XmSample>,
    ) -> Result<Self, XmError> {
        Ok(Self {
            name: name.to_string(),
            keymap: Allocation::zeroed(memory, KEYMAP_SIZE, AllocType::Instrument)?,
            volume_envelope: XmEnvelope::default(),
            panning_envelope: XmEnvelope::default(),
            vibrato_type: 0,
            vibrato_sweep: 0,
            vibrato_depth: 0,
            vibrato_rate: 0,
            volume_fadeout: 0,
            samples,
        })
    }

    /// Sample played for a 1-based note
    pub fn sample_for_note(&self, note: u8) -> Option<&XmSample> {
        let index = *self.keymap.get((note as usize).checked_sub(1)?)?;
        self.samples.get(index as usize)
    }

    /// Sample index played for a 1-based note
    pub fn sample_index_for_note(&self, note: u8) -> Option<usize> {
        let index = *self.keymap.get((note as usize).checked_sub(1)?)? as usize;
        (index < self.samples.len()).then_some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tt_shared::{HeapMemoryManager, TrackingMemoryManager};

    #[test]
    fn test_note_helpers() {
        let note = XmNote {
            note: 49,
            instrument: 1,
            volume: 0x30,
            effect: 0,
            effect_param: 0,
        };
        assert!(note.has_note());
        assert!(note.has_instrument());
        assert!(!note.has_effect());
        assert_eq!(note.get_volume(), Some(0x20));
        assert_eq!(note.get_volume_effect(), None);

        let off = XmNote {
            note: NOTE_OFF,
            volume: 0xC8,
            ..Default::default()
        };
        assert!(off.is_note_off());
        assert!(!off.has_note());
        assert_eq!(off.get_volume_effect(), Some((0xC, 0x8)));
        assert!(XmNote::default().is_empty());
    }

    #[test]
    fn test_loop_type_flags() {
        assert_eq!(LoopType::from_flags(0x10), LoopType::None);
        assert_eq!(LoopType::from_flags(0x11), LoopType::Forward);
        assert_eq!(LoopType::from_flags(0x12), LoopType::PingPong);
        assert_eq!(LoopType::PingPong.to_flags(), 2);
    }

    #[test]
    fn test_pattern_accounting() {
        let tracker = Arc::new(TrackingMemoryManager::new());
        let memory: SharedMemoryManager = tracker.clone();

        let mut notes = vec![XmNote::default(); 4 * 2];
        notes[0].note = 49;
        let pattern = XmPattern::from_notes(&memory, 4, 2, &notes).unwrap();
        // 1 flag + 1 note, then seven empty cells
        assert_eq!(pattern.data.len(), 2 + 7);
        assert_eq!(tracker.in_use(AllocType::Pattern), 9);
        assert_eq!(pattern.unpack().unwrap(), notes);

        drop(pattern);
        assert_eq!(tracker.in_use(AllocType::Pattern), 0);
    }

    #[test]
    fn test_keymap_lookup() {
        let memory = HeapMemoryManager::shared();
        let a = XmSample::new(&memory, "a", vec![0; 4]).unwrap();
        let b = XmSample::new(&memory, "b", vec![0; 8]).unwrap();
        let mut inst = XmInstrument::new(&memory, "inst", vec![a, b]).unwrap();
        inst.keymap[60] = 1;

        assert_eq!(inst.sample_for_note(61).map(|s| s.name.as_str()), Some("b"));
        assert_eq!(inst.sample_for_note(1).map(|s| s.name.as_str()), Some("a"));
        assert!(inst.sample_for_note(0).is_none());
        assert_eq!(inst.sample_index_for_note(61), Some(1));
    }
}

//! tt-xm: XM (Extended Module) support for the tt audio core
//!
//! Loads FastTracker 2 modules through the [`tt_shared::XmFileIo`] seam and
//! accounts every buffer against a [`tt_shared::MemoryManager`]. Pattern data
//! stays compressed in memory using the FT2 packed-note scheme
//! ([`compress_pattern`]) and is decoded one row at a time during playback
//! with [`PatternReader`].
//!
//! # Usage
//!
//! ```ignore
//! use tt_shared::{DiskFile, HeapMemoryManager};
//! use tt_xm::load_module;
//!
//! let mut io = DiskFile::with_root("assets/music");
//! let module = load_module(&mut io, "title.xm", &HeapMemoryManager::shared())?;
//! println!("{}: {} channels, {} orders", module.name, module.num_channels, module.song_length());
//! ```
//!
//! # Format Reference
//!
//! - FastTracker 2 XM format specification v0104

mod compressor;
mod envelope;
mod error;
mod module;
mod parser;

pub use compressor::{PatternReader, compress_pattern, unpack_note};
pub use envelope::{
    ENV_FLAG_ENABLED, ENV_FLAG_LOOP, ENV_FLAG_SUSTAIN, ENV_POINT_COUNT_MASK, EnvelopeCursor,
    MAX_ENVELOPE_POINTS, XmEnvelope, get_offset, get_value, pack_point,
};
pub use error::XmError;
pub use module::{LoopType, XmInstrument, XmModule, XmNote, XmPattern, XmSample};
pub use parser::{load_module, load_module_from_bytes, write_module};

// =============================================================================
// Format Constants
// =============================================================================

/// XM file magic
pub const XM_MAGIC: &[u8; 17] = b"Extended Module: ";

/// The only XM version in circulation
pub const XM_VERSION: u16 = 0x0104;

pub const MAX_CHANNELS: u8 = 32;

pub const MAX_PATTERNS: u16 = 256;

pub const MAX_PATTERN_ROWS: u16 = 256;

pub const MAX_INSTRUMENTS: u16 = 128;

pub const MAX_SAMPLES_PER_INSTRUMENT: u16 = 16;

/// Entries in an instrument's note-to-sample map
pub const KEYMAP_SIZE: usize = 96;

// =============================================================================
// Note Constants
// =============================================================================

/// Key-off pseudo note
pub const NOTE_OFF: u8 = 97;

/// C-0
pub const NOTE_MIN: u8 = 1;

/// B-7
pub const NOTE_MAX: u8 = 96;

/// Effect command numbers as stored in the effect column
pub mod effects {
    pub const ARPEGGIO: u8 = 0x00;
    pub const PORTA_UP: u8 = 0x01;
    pub const PORTA_DOWN: u8 = 0x02;
    pub const TONE_PORTA: u8 = 0x03;
    pub const VIBRATO: u8 = 0x04;
    pub const TONE_PORTA_VOL_SLIDE: u8 = 0x05;
    pub const VIBRATO_VOL_SLIDE: u8 = 0x06;
    pub const TREMOLO: u8 = 0x07;
    pub const SET_PANNING: u8 = 0x08;
    pub const SAMPLE_OFFSET: u8 = 0x09;
    pub const VOLUME_SLIDE: u8 = 0x0A;
    pub const POSITION_JUMP: u8 = 0x0B;
    pub const SET_VOLUME: u8 = 0x0C;
    pub const PATTERN_BREAK: u8 = 0x0D;
    /// Exy, sub-command in the high nibble
    pub const EXTENDED: u8 = 0x0E;
    /// Fxx: below 0x20 sets ticks per row, otherwise BPM
    pub const SET_SPEED_TEMPO: u8 = 0x0F;
    pub const SET_GLOBAL_VOLUME: u8 = 0x10;
    pub const GLOBAL_VOLUME_SLIDE: u8 = 0x11;
    pub const KEY_OFF: u8 = 0x14;

    /// Sub-commands of [`EXTENDED`]
    pub mod extended {
        pub const FINE_PORTA_UP: u8 = 0x1;
        pub const FINE_PORTA_DOWN: u8 = 0x2;
        pub const PATTERN_LOOP: u8 = 0x6;
        pub const RETRIG: u8 = 0x9;
        pub const FINE_VOLUME_UP: u8 = 0xA;
        pub const FINE_VOLUME_DOWN: u8 = 0xB;
        pub const NOTE_CUT: u8 = 0xC;
        pub const NOTE_DELAY: u8 = 0xD;
        pub const PATTERN_DELAY: u8 = 0xE;
    }
}

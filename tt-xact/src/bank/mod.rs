//! Sound bank and wave bank definitions
//!
//! Banks are static data: loaded once, validated against each other, then
//! shared read-only (`Arc`) by the engine and every cue instance.
//!
//! # Binary layout
//!
//! Both bank files share the same primitives. Byte order is chosen when the
//! file is opened and applies to every multi-byte value except the magic.
//!
//! ```text
//! string  : u16 byte length, UTF-8 bytes
//! f32     : IEEE-754 bits as u32
//! ranged  : min f32, max f32, random u8 (0 = fixed at min)
//! loops   : u16 extra fires, 0xFFFF = infinite
//! ```
//!
//! Sound bank (`.ttsb`):
//!
//! ```text
//! "TTSB" | version u16 = 1 | name string
//! category_count u16 | category_count * name string
//! cue_count u16 | cue_count * {
//!     name string | mode u8 (0 ordered, 1 random, 2 shuffle)
//!     variation_count u16 | variation_count * { sound u16, weight f32 }
//! }
//! sound_count u16 | sound_count * {
//!     name string | volume f32 | pitch f32 | category u16
//!     rpc_count u8 | rpc_count * {
//!         variable string | parameter u8 (0 volume, 1 pitch)
//!         point_count u8 | point_count * { x f32, y f32 }
//!     }
//!     track_count u16 | track_count * {
//!         volume f32 | event_count u16 | event_count * {
//!             kind u8 | timestamp ranged | loops
//!             kind 0 play wave : wave u16, volume ranged, pitch ranged, looping u8
//!             kind 1 stop      : immediate u8
//!             kind 2 volume    : value ranged, relative u8
//!             kind 3 pitch     : value ranged, relative u8
//!         }
//!     }
//! }
//! ```
//!
//! Wave bank (`.ttwb`):
//!
//! ```text
//! "TTWB" | version u16 = 1 | name string
//! wave_count u16 | wave_count * {
//!     name string | format u8 (0 pcm8, 1 pcm16, 2 adpcm) | sample_rate u32
//!     frames u32 | loop_start u32 | loop_length u32 (0 = no loop)
//!     data_len u32 | data
//! }
//! ```
//!
//! PCM16 data uses the file's byte order. ADPCM data is a raw IMA nibble
//! stream (low nibble first) starting from a zeroed codec state.

mod read;
mod write;

#[cfg(test)]
mod tests;

use hashbrown::HashMap;
use tt_adpcm::AdpcmState;
use tt_shared::{AllocType, Allocation, SharedMemoryManager};

use crate::error::XactError;
use crate::random::XactRandom;

pub use read::{
    load_sound_bank, load_wave_bank, sound_bank_from_bytes, wave_bank_from_bytes,
};
pub use write::{write_sound_bank, write_wave_bank};

pub const SOUND_BANK_MAGIC: [u8; 4] = *b"TTSB";
pub const WAVE_BANK_MAGIC: [u8; 4] = *b"TTWB";
pub const BANK_VERSION: u16 = 1;

/// On-disk loop count meaning "repeat forever"
pub const INFINITE_LOOPS: u16 = 0xFFFF;

// =============================================================================
// Values
// =============================================================================

/// A value that is either fixed or drawn uniformly from `[min, max)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangedValue {
    pub min: f32,
    pub max: f32,
    pub random: bool,
}

impl RangedValue {
    pub const fn fixed(value: f32) -> Self {
        Self {
            min: value,
            max: value,
            random: false,
        }
    }

    pub const fn range(min: f32, max: f32) -> Self {
        Self {
            min,
            max,
            random: true,
        }
    }

    /// Draw a value. Fixed values never touch the generator.
    pub fn sample(&self, rng: &dyn XactRandom) -> f32 {
        if self.random {
            rng.range(self.min, self.max)
        } else {
            self.min
        }
    }
}

impl Default for RangedValue {
    fn default() -> Self {
        Self::fixed(0.0)
    }
}

/// How many times an event repeats after its first fire
///
/// `Finite(0)` fires exactly once, `Finite(n)` fires `n + 1` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCount {
    Finite(u16),
    Infinite,
}

impl LoopCount {
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            INFINITE_LOOPS => LoopCount::Infinite,
            n => LoopCount::Finite(n),
        }
    }

    pub fn to_raw(self) -> u16 {
        match self {
            LoopCount::Finite(n) => n.min(INFINITE_LOOPS - 1),
            LoopCount::Infinite => INFINITE_LOOPS,
        }
    }

    /// Total number of fires, `None` for infinite
    pub fn total_fires(self) -> Option<u32> {
        match self {
            LoopCount::Finite(n) => Some(n as u32 + 1),
            LoopCount::Infinite => None,
        }
    }
}

impl Default for LoopCount {
    fn default() -> Self {
        LoopCount::Finite(0)
    }
}

// =============================================================================
// Sound bank
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VariationMode {
    /// Cycle through variations in order
    #[default]
    Ordered,
    /// Weighted random pick on every trigger
    Random,
    /// Random order without repeats until every variation has played
    Shuffle,
}

impl VariationMode {
    pub fn from_raw(raw: u8) -> Result<Self, XactError> {
        match raw {
            0 => Ok(VariationMode::Ordered),
            1 => Ok(VariationMode::Random),
            2 => Ok(VariationMode::Shuffle),
            other => Err(XactError::InvalidVariationMode(other)),
        }
    }

    pub fn to_raw(self) -> u8 {
        match self {
            VariationMode::Ordered => 0,
            VariationMode::Random => 1,
            VariationMode::Shuffle => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Variation {
    /// Index into [`SoundBank::sounds`]
    pub sound: u16,
    /// Relative weight for [`VariationMode::Random`]
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CueDef {
    pub name: String,
    pub mode: VariationMode,
    pub variations: Vec<Variation>,
}

impl CueDef {
    /// Cue that always plays one sound
    pub fn single(name: &str, sound: u16) -> Self {
        Self {
            name: name.to_string(),
            mode: VariationMode::Ordered,
            variations: vec![Variation { sound, weight: 1.0 }],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcParameter {
    Volume,
    Pitch,
}

impl RpcParameter {
    pub fn from_raw(raw: u8) -> Result<Self, XactError> {
        match raw {
            0 => Ok(RpcParameter::Volume),
            1 => Ok(RpcParameter::Pitch),
            other => Err(XactError::InvalidRpcParameter(other)),
        }
    }

    pub fn to_raw(self) -> u8 {
        match self {
            RpcParameter::Volume => 0,
            RpcParameter::Pitch => 1,
        }
    }
}

/// Piecewise-linear mapping from a cue variable to a volume or pitch factor
#[derive(Debug, Clone, PartialEq)]
pub struct RpcCurve {
    pub variable: String,
    pub parameter: RpcParameter,
    /// `(variable value, factor)` pairs sorted by variable value
    pub points: Vec<(f32, f32)>,
}

impl RpcCurve {
    /// Factor at `x`, holding the end values outside the curve
    pub fn evaluate(&self, x: f32) -> f32 {
        let Some(&(first_x, first_y)) = self.points.first() else {
            return 1.0;
        };
        if x <= first_x {
            return first_y;
        }
        for pair in self.points.windows(2) {
            let (x0, y0) = pair[0];
            let (x1, y1) = pair[1];
            if x < x1 {
                if x1 <= x0 {
                    return y1;
                }
                return y0 + (y1 - y0) * (x - x0) / (x1 - x0);
            }
        }
        self.points.last().map_or(1.0, |&(_, y)| y)
    }
}

/// Event payload
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    PlayWave {
        /// Index into [`WaveBank::waves`]
        wave: u16,
        volume: RangedValue,
        /// Playback rate ratio (1.0 = original pitch)
        pitch: RangedValue,
        looping: bool,
    },
    Stop {
        immediate: bool,
    },
    Volume {
        value: RangedValue,
        /// Multiply the current volume instead of replacing it
        relative: bool,
    },
    Pitch {
        value: RangedValue,
        relative: bool,
    },
}

impl EventKind {
    pub fn tag(&self) -> u8 {
        match self {
            EventKind::PlayWave { .. } => 0,
            EventKind::Stop { .. } => 1,
            EventKind::Volume { .. } => 2,
            EventKind::Pitch { .. } => 3,
        }
    }
}

/// Timeline entry of a track
#[derive(Debug, Clone, PartialEq)]
pub struct EventDef {
    /// Delay before the first fire, and between repeats, in seconds
    pub timestamp: RangedValue,
    pub loop_count: LoopCount,
    pub kind: EventKind,
}

impl EventDef {
    /// Fixed-volume, fixed-pitch wave trigger at time zero
    pub fn play_wave(wave: u16, volume: f32, pitch: f32) -> Self {
        Self {
            timestamp: RangedValue::fixed(0.0),
            loop_count: LoopCount::Finite(0),
            kind: EventKind::PlayWave {
                wave,
                volume: RangedValue::fixed(volume),
                pitch: RangedValue::fixed(pitch),
                looping: false,
            },
        }
    }

    pub fn at(mut self, timestamp: RangedValue) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn looped(mut self, loop_count: LoopCount) -> Self {
        self.loop_count = loop_count;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackDef {
    pub volume: f32,
    pub events: Vec<EventDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoundDef {
    pub name: String,
    pub volume: f32,
    pub pitch: f32,
    /// Index into [`SoundBank::categories`]
    pub category: u16,
    pub rpcs: Vec<RpcCurve>,
    pub tracks: Vec<TrackDef>,
}

impl SoundDef {
    pub fn new(name: &str, tracks: Vec<TrackDef>) -> Self {
        Self {
            name: name.to_string(),
            volume: 1.0,
            pitch: 1.0,
            category: 0,
            rpcs: Vec::new(),
            tracks,
        }
    }
}

/// Cues, sounds and categories of one bank file
#[derive(Debug, Clone)]
pub struct SoundBank {
    pub name: String,
    pub categories: Vec<String>,
    pub cues: Vec<CueDef>,
    pub sounds: Vec<SoundDef>,
    cue_lookup: HashMap<String, usize>,
}

impl SoundBank {
    pub fn new(
        name: &str,
        categories: Vec<String>,
        cues: Vec<CueDef>,
        sounds: Vec<SoundDef>,
    ) -> Self {
        let cue_lookup = cues
            .iter()
            .enumerate()
            .map(|(i, cue)| (cue.name.clone(), i))
            .collect();
        Self {
            name: name.to_string(),
            categories,
            cues,
            sounds,
            cue_lookup,
        }
    }

    pub fn cue_index(&self, name: &str) -> Option<usize> {
        self.cue_lookup.get(name).copied()
    }

    pub fn category_index(&self, name: &str) -> Option<usize> {
        self.categories.iter().position(|c| c == name)
    }

    /// Check internal references: cue sounds and sound categories
    pub fn validate(&self) -> Result<(), XactError> {
        for (cue_index, cue) in self.cues.iter().enumerate() {
            if cue.variations.is_empty() {
                return Err(XactError::EmptyCue(cue_index));
            }
            if let Some(v) = cue
                .variations
                .iter()
                .find(|v| v.sound as usize >= self.sounds.len())
            {
                return Err(XactError::InvalidSoundIndex {
                    cue: cue_index,
                    sound: v.sound,
                    count: self.sounds.len(),
                });
            }
        }
        for (sound_index, sound) in self.sounds.iter().enumerate() {
            if sound.category as usize >= self.categories.len() {
                return Err(XactError::InvalidCategory {
                    sound: sound_index,
                    category: sound.category,
                    count: self.categories.len(),
                });
            }
        }
        Ok(())
    }

    /// Check every wave reference against the paired wave bank
    pub fn validate_against(&self, waves: &WaveBank) -> Result<(), XactError> {
        self.validate()?;
        for (sound_index, sound) in self.sounds.iter().enumerate() {
            for (track_index, track) in sound.tracks.iter().enumerate() {
                for (event_index, event) in track.events.iter().enumerate() {
                    if let EventKind::PlayWave { wave, .. } = event.kind
                        && wave as usize >= waves.waves.len()
                    {
                        return Err(XactError::InvalidWaveIndex {
                            sound: sound_index,
                            track: track_index,
                            event: event_index,
                            wave,
                            count: waves.waves.len(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Wave bank
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveFormat {
    /// Signed 8-bit PCM
    Pcm8,
    /// Signed 16-bit PCM
    Pcm16,
    /// IMA-ADPCM nibbles
    Adpcm,
}

impl WaveFormat {
    pub fn from_raw(raw: u8) -> Result<Self, XactError> {
        match raw {
            0 => Ok(WaveFormat::Pcm8),
            1 => Ok(WaveFormat::Pcm16),
            2 => Ok(WaveFormat::Adpcm),
            other => Err(XactError::InvalidWaveFormat(other)),
        }
    }

    pub fn to_raw(self) -> u8 {
        match self {
            WaveFormat::Pcm8 => 0,
            WaveFormat::Pcm16 => 1,
            WaveFormat::Adpcm => 2,
        }
    }

    /// Bytes needed to hold `frames` frames
    pub fn data_len(self, frames: u32) -> usize {
        match self {
            WaveFormat::Pcm8 => frames as usize,
            WaveFormat::Pcm16 => frames as usize * 2,
            WaveFormat::Adpcm => (frames as usize).div_ceil(2),
        }
    }
}

/// Loop region in frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopRegion {
    pub start: u32,
    pub length: u32,
}

impl LoopRegion {
    /// One past the last loop frame, `None` if it does not fit in a `u32`
    pub fn end(&self) -> Option<u32> {
        self.start.checked_add(self.length)
    }
}

/// Mono waveform
///
/// PCM16 data is held little-endian once loaded whatever the file's byte
/// order.
#[derive(Debug)]
pub struct Wave {
    pub name: String,
    pub format: WaveFormat,
    pub sample_rate: u32,
    pub frames: u32,
    pub data: Allocation<u8>,
    pub loop_region: Option<LoopRegion>,
}

impl Wave {
    /// 16-bit PCM wave from samples
    pub fn from_pcm16(
        memory: &SharedMemoryManager,
        name: &str,
        sample_rate: u32,
        samples: &[i16],
    ) -> Result<Self, XactError> {
        let bytes = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::from_bytes(memory, name, WaveFormat::Pcm16, sample_rate, samples.len(), bytes)
    }

    /// 8-bit PCM wave from samples
    pub fn from_pcm8(
        memory: &SharedMemoryManager,
        name: &str,
        sample_rate: u32,
        samples: &[i8],
    ) -> Result<Self, XactError> {
        let bytes = samples.iter().map(|&s| s as u8).collect();
        Self::from_bytes(memory, name, WaveFormat::Pcm8, sample_rate, samples.len(), bytes)
    }

    /// ADPCM wave encoded from 16-bit samples
    pub fn from_adpcm(
        memory: &SharedMemoryManager,
        name: &str,
        sample_rate: u32,
        samples: &[i16],
    ) -> Result<Self, XactError> {
        let bytes = tt_adpcm::encode_block(&mut AdpcmState::new(), samples);
        Self::from_bytes(memory, name, WaveFormat::Adpcm, sample_rate, samples.len(), bytes)
    }

    fn from_bytes(
        memory: &SharedMemoryManager,
        name: &str,
        format: WaveFormat,
        sample_rate: u32,
        frames: usize,
        bytes: Vec<u8>,
    ) -> Result<Self, XactError> {
        Ok(Self {
            name: name.to_string(),
            format,
            sample_rate,
            frames: frames as u32,
            data: Allocation::from_vec(memory, bytes, AllocType::Sample)?,
            loop_region: None,
        })
    }

    pub fn with_loop(mut self, start: u32, length: u32) -> Self {
        self.loop_region = Some(LoopRegion { start, length });
        self
    }

    /// Check the data length and loop region against the frame count
    pub fn validate(&self, index: usize) -> Result<(), XactError> {
        let invalid = |reason: String| XactError::InvalidWave {
            wave: index,
            reason,
        };
        if self.sample_rate == 0 {
            return Err(invalid("sample rate is zero".to_string()));
        }
        let needed = self.format.data_len(self.frames);
        if self.data.len() < needed {
            return Err(invalid(format!(
                "{} frames need {} bytes, have {}",
                self.frames,
                needed,
                self.data.len()
            )));
        }
        if let Some(region) = self.loop_region
            && (region.length == 0 || region.end().is_none_or(|end| end > self.frames))
        {
            return Err(invalid(format!(
                "loop {}+{} outside {} frames",
                region.start, region.length, self.frames
            )));
        }
        Ok(())
    }

    /// Duration at the native sample rate
    pub fn duration_seconds(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }
}

#[derive(Debug)]
pub struct WaveBank {
    pub name: String,
    pub waves: Vec<Wave>,
}

impl WaveBank {
    pub fn wave_index(&self, name: &str) -> Option<usize> {
        self.waves.iter().position(|w| w.name == name)
    }
}

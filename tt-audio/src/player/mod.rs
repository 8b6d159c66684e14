//! XM tracker player
//!
//! Plays an [`XmModule`] shared through an `Arc`. All mutable state lives in
//! the player, so one module can drive several players.
//!
//! Playback advances in ticks. Tick 0 of each row triggers the row's notes
//! and first-tick effects; later ticks run continuous effects (slides,
//! vibrato, retrigger). `speed` is ticks per row and `bpm` sets the tick
//! length to `2.5 / bpm` seconds. Speed and BPM changes, from the pattern or
//! the API, are held pending and take effect at the next tick boundary.
//!
//! - `row` - pattern decoding, note triggers and first-tick effects
//! - `tick` - per-tick effects, position advance and song flow
//! - `channel` - voice state and resampling
//! - `utils` - pitch tables and waveforms

mod channel;
mod row;
mod tick;
mod utils;


use std::sync::Arc;

use tracing::{debug, warn};
use tt_xm::{XmModule, XmNote};

use crate::source::AudioSource;
use channel::Channel;

pub use utils::{note_to_period, period_to_frequency, samples_per_tick};

// ============================================================================
// Tracker Constants
// ============================================================================

/// Peak value of a volume envelope
pub(crate) const VOLUME_ENVELOPE_MAX: f32 = 64.0;

/// Fadeout level of a fresh note
pub(crate) const VOLUME_FADEOUT_MAX: u32 = 65535;

/// Panning envelope value that leaves the channel pan unchanged
pub(crate) const PAN_ENVELOPE_CENTER: f32 = 32.0;

pub(crate) const GLOBAL_VOLUME_MAX: u8 = 64;

pub const MIN_BPM: u16 = 32;
pub const MAX_BPM: u16 = 255;
pub const MAX_SPEED: u16 = 31;

/// Transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// The tick the player will process next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackPosition {
    pub order: u16,
    pub row: u16,
    pub tick: u16,
}

/// Where the compressed pattern reader left off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReaderCursor {
    order: u16,
    row: u16,
    offset: usize,
}

/// Song flow requested by the row being played, applied when it ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RowFlow {
    /// Bxx
    jump: Option<u16>,
    /// Dxx
    break_row: Option<u16>,
    /// E6x: repeat from this row within the current pattern
    loop_row: Option<u16>,
}

/// XM module player
pub struct XmPlayer {
    module: Arc<XmModule>,
    sample_rate: u32,
    state: PlayerState,
    looping: bool,

    channels: Vec<Channel>,
    row_notes: Vec<XmNote>,
    cursor: Option<ReaderCursor>,

    order: u16,
    row: u16,
    tick: u16,
    speed: u16,
    bpm: u16,
    pending_speed: Option<u16>,
    pending_bpm: Option<u16>,
    global_volume: u8,

    flow: RowFlow,
    /// Extra passes of the current row still to play (EEx)
    row_repeats: Option<u8>,
    /// The current pass is an EEx repeat: notes are not retriggered
    repeat_pass: bool,

    /// Frames left in the tick being mixed
    frames_left: u32,
    loop_count: u32,

    volume: f32,
    fade: Option<VolumeFade>,
    scratch: Vec<f32>,
}

/// Linear ramp of the player volume
#[derive(Debug, Clone, Copy, PartialEq)]
struct VolumeFade {
    target: f32,
    /// Volume change per output frame
    step: f32,
}

impl std::fmt::Debug for XmPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmPlayer")
            .field("module", &self.module.name)
            .field("state", &self.state)
            .field("position", &self.position())
            .field("speed", &self.speed)
            .field("bpm", &self.bpm)
            .finish()
    }
}

impl XmPlayer {
    pub fn new(module: Arc<XmModule>, sample_rate: u32) -> Self {
        let channels = module.num_channels as usize;
        let mut player = Self {
            sample_rate,
            state: PlayerState::Stopped,
            looping: true,
            channels: vec![Channel::default(); channels],
            row_notes: vec![XmNote::default(); channels],
            cursor: None,
            order: 0,
            row: 0,
            tick: 0,
            speed: 6,
            bpm: 125,
            pending_speed: None,
            pending_bpm: None,
            global_volume: GLOBAL_VOLUME_MAX,
            flow: RowFlow::default(),
            row_repeats: None,
            repeat_pass: false,
            frames_left: 0,
            loop_count: 0,
            volume: 1.0,
            fade: None,
            scratch: Vec::new(),
            module,
        };
        player.reset();
        player
    }

    pub fn module(&self) -> &Arc<XmModule> {
        &self.module
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayerState::Playing
    }

    /// Playing, or still mixing the last tick of a song that just ended
    pub fn is_sounding(&self) -> bool {
        match self.state {
            PlayerState::Playing => true,
            PlayerState::Stopped => self.frames_left > 0,
            PlayerState::Paused => false,
        }
    }

    /// Rewind to the start of the song with the module's default tempo
    fn reset(&mut self) {
        self.channels.fill(Channel::default());
        self.cursor = None;
        self.order = 0;
        self.row = 0;
        self.tick = 0;
        self.speed = self.module.default_speed.clamp(1, MAX_SPEED);
        self.bpm = self.module.default_bpm.clamp(MIN_BPM, MAX_BPM);
        self.pending_speed = None;
        self.pending_bpm = None;
        self.global_volume = GLOBAL_VOLUME_MAX;
        self.flow = RowFlow::default();
        self.row_repeats = None;
        self.repeat_pass = false;
        self.frames_left = 0;
        self.loop_count = 0;
    }

    /// Start from the top of the song
    ///
    /// Returns `false` if the module has no orders to play.
    pub fn play(&mut self) -> bool {
        if self.module.song_length() == 0 {
            warn!("module '{}' has an empty order table", self.module.name);
            return false;
        }
        self.reset();
        self.state = PlayerState::Playing;
        debug!(
            "playing '{}' at speed {} bpm {}",
            self.module.name, self.speed, self.bpm
        );
        true
    }

    pub fn stop(&mut self) {
        self.state = PlayerState::Stopped;
        for ch in &mut self.channels {
            ch.cut();
        }
        self.frames_left = 0;
    }

    pub fn pause(&mut self) -> bool {
        if self.state != PlayerState::Playing {
            return false;
        }
        self.state = PlayerState::Paused;
        true
    }

    pub fn resume(&mut self) -> bool {
        if self.state != PlayerState::Paused {
            return false;
        }
        self.state = PlayerState::Playing;
        true
    }

    /// Whether the song restarts at the module's restart position when it ends
    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Times the song has wrapped back to its restart position
    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    pub fn position(&self) -> PlaybackPosition {
        PlaybackPosition {
            order: self.order,
            row: self.row,
            tick: self.tick,
        }
    }

    /// Jump to a row, clamped to the song and pattern
    ///
    /// Sounding notes keep playing; the new row triggers on the next tick.
    pub fn set_position(&mut self, order: u16, row: u16) {
        let last_order = self.module.song_length().saturating_sub(1);
        self.order = order.min(last_order);
        let rows = self.rows_at(self.order);
        self.row = row.min(rows.saturating_sub(1));
        self.tick = 0;
        self.flow = RowFlow::default();
        self.row_repeats = None;
        self.repeat_pass = false;
        self.frames_left = 0;
    }

    /// Ticks per row, applied at the next tick boundary
    pub fn set_speed(&mut self, speed: u16) {
        self.pending_speed = Some(speed.clamp(1, MAX_SPEED));
    }

    /// BPM, applied at the next tick boundary
    pub fn set_tempo(&mut self, bpm: u16) {
        self.pending_bpm = Some(bpm.clamp(MIN_BPM, MAX_BPM));
    }

    pub fn speed(&self) -> u16 {
        self.speed
    }

    pub fn bpm(&self) -> u16 {
        self.bpm
    }

    pub fn global_volume(&self) -> u8 {
        self.global_volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        self.fade = None;
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Ramp the player volume to `target` over `seconds`
    pub fn fade_to(&mut self, target: f32, seconds: f32) {
        let target = target.clamp(0.0, 1.0);
        let frames = seconds.max(0.0) * self.sample_rate as f32;
        if frames < 1.0 {
            self.set_volume(target);
            return;
        }
        self.fade = Some(VolumeFade {
            target,
            step: (target - self.volume) / frames,
        });
    }

    pub fn is_fading(&self) -> bool {
        self.fade.is_some()
    }

    /// Process one tick without mixing
    ///
    /// Returns `false` if the player is not playing.
    pub fn tick(&mut self) -> bool {
        if self.state != PlayerState::Playing {
            return false;
        }
        self.step_tick();
        self.frames_left = 0;
        true
    }

    fn rows_at(&self, order: u16) -> u16 {
        self.module
            .pattern_at_order(order)
            .map_or(64, |p| p.num_rows)
            .max(1)
    }

    /// Process the current tick and advance position
    ///
    /// Returns the length of the processed tick in frames.
    fn step_tick(&mut self) -> u32 {
        let frames = samples_per_tick(self.bpm, self.sample_rate);
        if self.tick == 0 && !self.repeat_pass {
            self.process_row();
        } else {
            self.process_tick_effects();
        }
        self.update_channel_mix();
        self.advance();
        frames
    }

    fn update_channel_mix(&mut self) {
        let module = &self.module;
        for ch in &mut self.channels {
            let instrument = module.instrument(ch.instrument);
            ch.update_mix(
                instrument,
                self.global_volume,
                module.linear_frequency_table,
                self.sample_rate,
            );
            if !ch.key_on && ch.fadeout == 0 {
                ch.cut();
            }
        }
    }

    fn mix_channels(&mut self, out: &mut [f32]) {
        let module = &self.module;
        for ch in &mut self.channels {
            if !ch.active {
                continue;
            }
            let sample = module
                .instrument(ch.instrument)
                .and_then(|i| ch.sample.and_then(|s| i.samples.get(s)));
            match sample {
                Some(sample) => ch.render(sample, out),
                None => ch.cut(),
            }
        }
    }

    fn apply_volume(&mut self, out: &[f32], dst: &mut [f32]) {
        for (src, dst) in out.chunks_exact(2).zip(dst.chunks_exact_mut(2)) {
            if let Some(fade) = self.fade {
                self.volume += fade.step;
                let done = if fade.step >= 0.0 {
                    self.volume >= fade.target
                } else {
                    self.volume <= fade.target
                };
                if done {
                    self.volume = fade.target;
                    self.fade = None;
                }
            }
            dst[0] += src[0] * self.volume;
            dst[1] += src[1] * self.volume;
        }
    }
}

impl AudioSource for XmPlayer {
    /// Mix interleaved stereo f32, adding to `out`
    fn render(&mut self, out: &mut [f32]) {
        if self.state == PlayerState::Paused {
            return;
        }
        let frames = out.len() / 2;
        if self.scratch.len() < frames * 2 {
            self.scratch.resize(frames * 2, 0.0);
        }
        let mut scratch = std::mem::take(&mut self.scratch);

        let mut done = 0;
        while done < frames {
            if self.frames_left == 0 {
                // A song that ended mid-block stays silent from here
                if self.state != PlayerState::Playing {
                    break;
                }
                self.frames_left = self.step_tick().max(1);
            }
            let n = (self.frames_left as usize).min(frames - done);
            let block = &mut scratch[..n * 2];
            block.fill(0.0);
            self.mix_channels(block);
            self.apply_volume(&scratch[..n * 2], &mut out[done * 2..(done + n) * 2]);
            self.frames_left -= n as u32;
            done += n;
        }

        self.scratch = scratch;
    }

    fn is_active(&self) -> bool {
        self.state == PlayerState::Playing
    }
}

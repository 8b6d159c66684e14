//! Playback cursor over one wave

use tt_adpcm::{AdpcmState, decode_nibble};

use crate::bank::{LoopRegion, Wave, WaveFormat};

/// Playback cursor over a [`Wave`]
///
/// Frames are fetched strictly in order so ADPCM data can be decoded on the
/// fly. The codec state is stored when the cursor first reaches the loop
/// start and restored on every wrap, so each pass decodes the same samples.
/// Resampling interpolates linearly between the two most recent frames.
#[derive(Debug, Clone)]
pub struct WaveInstance {
    wave: usize,
    looping: bool,
    next_frame: u32,
    adpcm: AdpcmState,
    loop_state: Option<AdpcmState>,
    current: f32,
    next: Option<f32>,
    frac: f64,
    finished: bool,
}

impl WaveInstance {
    pub fn new(index: usize, wave: &Wave, looping: bool) -> Self {
        let mut instance = Self {
            wave: index,
            looping,
            next_frame: 0,
            adpcm: AdpcmState::new(),
            loop_state: None,
            current: 0.0,
            next: None,
            frac: 0.0,
            finished: false,
        };
        match instance.fetch(wave) {
            Some(first) => {
                instance.current = first;
                instance.next = instance.fetch(wave);
            }
            None => instance.finished = true,
        }
        instance
    }

    /// Index of the wave in its bank
    pub fn wave_index(&self) -> usize {
        self.wave
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Let the wave run to its end instead of wrapping
    pub fn release_loop(&mut self) {
        self.looping = false;
    }

    /// Frame the next fetch will read
    pub fn next_frame(&self) -> u32 {
        self.next_frame
    }

    fn loop_region(&self, wave: &Wave) -> Option<LoopRegion> {
        if !self.looping || wave.frames == 0 {
            return None;
        }
        Some(wave.loop_region.unwrap_or(LoopRegion {
            start: 0,
            length: wave.frames,
        }))
    }

    fn fetch(&mut self, wave: &Wave) -> Option<f32> {
        let region = self.loop_region(wave);
        if let Some(region) = region
            && region.end().is_some_and(|end| self.next_frame >= end)
        {
            self.next_frame = region.start;
            if let Some(state) = self.loop_state {
                self.adpcm = state;
            }
        }
        if self.next_frame >= wave.frames {
            return None;
        }

        let i = self.next_frame as usize;
        let sample = match wave.format {
            WaveFormat::Pcm8 => *wave.data.get(i)? as i8 as f32 / 128.0,
            WaveFormat::Pcm16 => {
                let lo = *wave.data.get(i * 2)?;
                let hi = *wave.data.get(i * 2 + 1)?;
                i16::from_le_bytes([lo, hi]) as f32 / 32768.0
            }
            WaveFormat::Adpcm => {
                if let Some(region) = region
                    && region.start == self.next_frame
                    && self.loop_state.is_none()
                {
                    self.loop_state = Some(self.adpcm);
                }
                let byte = *wave.data.get(i / 2)?;
                let nibble = if i % 2 == 0 { byte & 0x0F } else { byte >> 4 };
                decode_nibble(&mut self.adpcm, nibble) as f32 / 32768.0
            }
        };
        self.next_frame += 1;
        Some(sample)
    }

    /// Mix into interleaved stereo `out`, advancing `step` source frames per
    /// output frame
    ///
    /// Gains ramp linearly from `gain_from` to `gain_to` across the block.
    pub fn render(
        &mut self,
        wave: &Wave,
        out: &mut [f32],
        step: f64,
        gain_from: (f32, f32),
        gain_to: (f32, f32),
    ) {
        let frames = out.len() / 2;
        if frames == 0 {
            return;
        }
        let step = step.max(0.0);
        let inv = 1.0 / frames as f32;

        for (k, frame) in out.chunks_exact_mut(2).enumerate() {
            if self.finished {
                break;
            }
            let t = k as f32 * inv;
            let left = gain_from.0 + (gain_to.0 - gain_from.0) * t;
            let right = gain_from.1 + (gain_to.1 - gain_from.1) * t;

            let next = self.next.unwrap_or(0.0);
            let sample = self.current + (next - self.current) * self.frac as f32;
            frame[0] += sample * left;
            frame[1] += sample * right;

            self.frac += step;
            while self.frac >= 1.0 {
                self.frac -= 1.0;
                match self.next {
                    Some(next) => {
                        self.current = next;
                        self.next = self.fetch(wave);
                    }
                    None => {
                        self.finished = true;
                        break;
                    }
                }
            }
        }
    }
}

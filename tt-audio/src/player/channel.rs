//! Per-channel voice state and sample resampling

use tt_xm::{EnvelopeCursor, LoopType, XmInstrument, XmNote, XmSample};

use super::utils::{
    MAX_PERIOD, MIN_PERIOD, get_waveform_value, period_to_frequency, semitone_ratio,
};
use super::{PAN_ENVELOPE_CENTER, VOLUME_ENVELOPE_MAX, VOLUME_FADEOUT_MAX};
use crate::mixing::{pan_from_xm, pan_gains};

/// One tracker channel: the voice it is playing and its effect memory
#[derive(Debug, Clone)]
pub(crate) struct Channel {
    // Voice
    /// 1-based instrument number, 0 for none
    pub instrument: u8,
    /// Sample index within the instrument
    pub sample: Option<usize>,
    /// Last triggered 1-based note
    pub note: u8,
    pub active: bool,
    pub position: f64,
    /// Ping-pong direction
    pub forward: bool,
    pub period: f32,
    pub target_period: f32,
    pub finetune: i8,
    pub relative_note: i8,
    /// 0-64
    pub volume: u8,
    /// 0-255, 128 centre
    pub panning: u8,
    pub key_on: bool,
    pub fadeout: u32,
    pub volume_env: EnvelopeCursor,
    pub panning_env: EnvelopeCursor,

    // Current row
    pub effect: u8,
    pub param: u8,
    pub volume_column: u8,
    /// Note held back by a note delay
    pub delayed: Option<XmNote>,

    // Effect memory
    pub porta_up: u8,
    pub porta_down: u8,
    pub fine_porta_up: u8,
    pub fine_porta_down: u8,
    pub tone_porta_speed: u8,
    pub volume_slide: u8,
    pub fine_volume_up: u8,
    pub fine_volume_down: u8,
    pub global_volume_slide: u8,
    pub sample_offset: u8,
    pub vibrato_speed: u8,
    pub vibrato_depth: u8,
    pub vibrato_pos: u8,
    pub vibrato_waveform: u8,
    pub tremolo_speed: u8,
    pub tremolo_depth: u8,
    pub tremolo_pos: u8,
    pub tremolo_waveform: u8,
    pub loop_row: u16,
    pub loop_remaining: u8,

    // Per-tick modulation, cleared on every tick
    pub vibrato_period: f32,
    pub tremolo_volume: i16,
    pub arpeggio: u8,

    // Mix parameters for the frames of the current tick
    pub step: f64,
    pub gains: (f32, f32),
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            instrument: 0,
            sample: None,
            note: 0,
            active: false,
            position: 0.0,
            forward: true,
            period: 0.0,
            target_period: 0.0,
            finetune: 0,
            relative_note: 0,
            volume: 0,
            panning: 128,
            key_on: false,
            fadeout: VOLUME_FADEOUT_MAX,
            volume_env: EnvelopeCursor::default(),
            panning_env: EnvelopeCursor::default(),
            effect: 0,
            param: 0,
            volume_column: 0,
            delayed: None,
            porta_up: 0,
            porta_down: 0,
            fine_porta_up: 0,
            fine_porta_down: 0,
            tone_porta_speed: 0,
            volume_slide: 0,
            fine_volume_up: 0,
            fine_volume_down: 0,
            global_volume_slide: 0,
            sample_offset: 0,
            vibrato_speed: 0,
            vibrato_depth: 0,
            vibrato_pos: 0,
            vibrato_waveform: 0,
            tremolo_speed: 0,
            tremolo_depth: 0,
            tremolo_pos: 0,
            tremolo_waveform: 0,
            loop_row: 0,
            loop_remaining: 0,
            vibrato_period: 0.0,
            tremolo_volume: 0,
            arpeggio: 0,
            step: 0.0,
            gains: (0.0, 0.0),
        }
    }
}

impl Channel {
    /// Silence the voice, keeping effect memory
    pub fn cut(&mut self) {
        self.active = false;
        self.gains = (0.0, 0.0);
        self.step = 0.0;
    }

    /// Release the key: envelopes leave sustain and fadeout starts
    ///
    /// Without a volume envelope the note is cut to silence.
    pub fn key_off(&mut self, instrument: Option<&XmInstrument>) {
        self.key_on = false;
        if !instrument.is_some_and(|i| i.volume_envelope.is_enabled()) {
            self.volume = 0;
        }
    }

    /// Restart envelopes and fadeout for a fresh note or instrument
    pub fn reset_envelopes(&mut self) {
        self.key_on = true;
        self.fadeout = VOLUME_FADEOUT_MAX;
        self.volume_env.reset();
        self.panning_env.reset();
    }

    pub fn slide_volume(&mut self, delta: i16) {
        self.volume = (self.volume as i16 + delta).clamp(0, 64) as u8;
    }

    pub fn slide_panning(&mut self, delta: i16) {
        self.panning = (self.panning as i16 + delta).clamp(0, 255) as u8;
    }

    /// Apply a vibrato step to this tick's pitch and advance its phase
    pub fn vibrato(&mut self) {
        let wave = get_waveform_value(self.vibrato_waveform, self.vibrato_pos);
        self.vibrato_period = wave * self.vibrato_depth as f32 * 8.0;
        self.vibrato_pos = self.vibrato_pos.wrapping_add(self.vibrato_speed.wrapping_mul(4));
    }

    pub fn tremolo(&mut self) {
        let wave = get_waveform_value(self.tremolo_waveform, self.tremolo_pos);
        self.tremolo_volume = (wave * self.tremolo_depth as f32 * 4.0) as i16;
        self.tremolo_pos = self.tremolo_pos.wrapping_add(self.tremolo_speed.wrapping_mul(4));
    }

    /// Slide the period towards the tone portamento target
    pub fn tone_portamento(&mut self) {
        if self.target_period <= 0.0 {
            return;
        }
        let speed = self.tone_porta_speed as f32 * 4.0;
        if self.period < self.target_period {
            self.period = (self.period + speed).min(self.target_period);
        } else if self.period > self.target_period {
            self.period = (self.period - speed).max(self.target_period);
        }
    }

    pub fn slide_period(&mut self, delta: f32) {
        self.period = (self.period + delta).clamp(MIN_PERIOD, MAX_PERIOD);
    }

    /// Compute this tick's resampling step and stereo gains, then advance
    /// the envelopes and fadeout by one tick
    pub fn update_mix(
        &mut self,
        instrument: Option<&XmInstrument>,
        global_volume: u8,
        linear: bool,
        sample_rate: u32,
    ) {
        if !self.active || sample_rate == 0 {
            self.gains = (0.0, 0.0);
            self.step = 0.0;
            return;
        }

        let frequency = period_to_frequency(self.period + self.vibrato_period, linear)
            * semitone_ratio(self.arpeggio);
        self.step = frequency as f64 / sample_rate as f64;

        let volume = (self.volume as i16 + self.tremolo_volume).clamp(0, 64) as f32 / 64.0;
        let mut envelope = 1.0;
        let mut panning = self.panning as f32;

        if let Some(instrument) = instrument {
            let vol_env = &instrument.volume_envelope;
            if vol_env.is_enabled() {
                envelope = self.volume_env.value(vol_env) as f32 / VOLUME_ENVELOPE_MAX;
                self.volume_env.advance(vol_env, self.key_on);
                if !self.key_on {
                    self.fadeout = self
                        .fadeout
                        .saturating_sub(instrument.volume_fadeout as u32);
                }
            }

            let pan_env = &instrument.panning_envelope;
            if pan_env.is_enabled() {
                let env = self.panning_env.value(pan_env) as f32 - PAN_ENVELOPE_CENTER;
                let room = 128.0 - (panning - 128.0).abs();
                panning += env * room / PAN_ENVELOPE_CENTER;
                self.panning_env.advance(pan_env, self.key_on);
            }
        }

        let fade = self.fadeout as f32 / VOLUME_FADEOUT_MAX as f32;
        let level = volume * envelope * fade * global_volume.min(64) as f32 / 64.0;
        let (left, right) = pan_gains(pan_from_xm(panning.clamp(0.0, 255.0) as u8));
        self.gains = (level * left, level * right);
    }

    /// Mix `frames` frames of the current sample into interleaved `out`
    pub fn render(&mut self, sample: &XmSample, out: &mut [f32]) {
        if !self.active || self.step <= 0.0 {
            return;
        }
        let data: &[i16] = &sample.data;
        let len = data.len();
        if len == 0 {
            self.cut();
            return;
        }

        let looping = sample.is_looping();
        let loop_start = (sample.loop_start as usize).min(len - 1);
        let loop_end = (sample.loop_end() as usize).clamp(loop_start + 1, len);
        let (left, right) = self.gains;

        for frame in out.chunks_exact_mut(2) {
            let pos = self.position as usize;
            if pos >= len {
                self.cut();
                return;
            }
            let frac = (self.position - pos as f64) as f32;
            let next = if self.forward {
                if looping && pos + 1 >= loop_end {
                    match sample.loop_type {
                        LoopType::PingPong => pos,
                        _ => loop_start,
                    }
                } else {
                    (pos + 1).min(len - 1)
                }
            } else {
                pos.saturating_sub(1).max(loop_start)
            };

            let s1 = data[pos] as f32 / 32768.0;
            let s2 = data[next] as f32 / 32768.0;
            let value = s1 + (s2 - s1) * frac;
            frame[0] += value * left;
            frame[1] += value * right;

            if self.forward {
                self.position += self.step;
            } else {
                self.position -= self.step;
            }

            if looping {
                self.wrap_loop(sample.loop_type, loop_start as f64, loop_end as f64);
            } else if self.position >= len as f64 {
                self.cut();
                return;
            }
        }
    }

    fn wrap_loop(&mut self, loop_type: LoopType, start: f64, end: f64) {
        let length = end - start;
        if length <= 1.0 {
            if self.position >= end || self.position < start {
                self.position = start;
            }
            return;
        }
        match loop_type {
            LoopType::PingPong => {
                // Reflect off the first and last loop frames until inside
                let last = end - 1.0;
                loop {
                    if self.forward && self.position >= end {
                        self.position = 2.0 * last - self.position;
                        self.forward = false;
                    } else if !self.forward && self.position < start {
                        self.position = 2.0 * start - self.position;
                        self.forward = true;
                    } else {
                        break;
                    }
                }
                self.position = self.position.clamp(start, last);
            }
            _ => {
                if self.position >= end {
                    self.position = start + (self.position - end) % length;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tt_shared::HeapMemoryManager;

    fn sample(frames: Vec<i16>) -> XmSample {
        XmSample::new(&HeapMemoryManager::shared(), "s", frames).unwrap()
    }

    fn playing(step: f64) -> Channel {
        Channel {
            active: true,
            step,
            gains: (1.0, 1.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_one_shot_ends() {
        let sample = sample(vec![16384, 16384, 16384]);
        let mut ch = playing(1.0);
        let mut out = vec![0.0; 10];
        ch.render(&sample, &mut out);
        assert_eq!(&out[..6], &[0.5; 6]);
        assert_eq!(&out[6..], &[0.0; 4]);
        assert!(!ch.active);
    }

    #[test]
    fn test_forward_loop() {
        let sample = sample(vec![0, 8192, 16384, 24576]).with_loop(2, 2, LoopType::Forward);
        let mut ch = playing(1.0);
        let mut out = vec![0.0; 12];
        ch.render(&sample, &mut out);
        let left: Vec<f32> = out.iter().step_by(2).copied().collect();
        assert_eq!(left, vec![0.0, 0.25, 0.5, 0.75, 0.5, 0.75]);
        assert!(ch.active);
    }

    #[test]
    fn test_ping_pong_loop() {
        let sample = sample(vec![0, 8192, 16384, 24576]).with_loop(1, 3, LoopType::PingPong);
        let mut ch = playing(1.0);
        let mut out = vec![0.0; 16];
        ch.render(&sample, &mut out);
        let left: Vec<f32> = out.iter().step_by(2).copied().collect();
        assert_eq!(left, vec![0.0, 0.25, 0.5, 0.75, 0.5, 0.25, 0.5, 0.75]);
    }

    #[test]
    fn test_half_step_interpolates() {
        let sample = sample(vec![0, 16384, 16384]);
        let mut ch = playing(0.5);
        let mut out = vec![0.0; 4];
        ch.render(&sample, &mut out);
        assert_eq!(out, vec![0.0, 0.0, 0.25, 0.25]);
    }

    #[test]
    fn test_key_off_without_envelope_cuts_volume() {
        let mut ch = Channel {
            volume: 40,
            key_on: true,
            ..Default::default()
        };
        ch.key_off(None);
        assert_eq!(ch.volume, 0);
        assert!(!ch.key_on);
    }

    #[test]
    fn test_slides_clamp() {
        let mut ch = Channel::default();
        ch.volume = 60;
        ch.slide_volume(10);
        assert_eq!(ch.volume, 64);
        ch.slide_volume(-100);
        assert_eq!(ch.volume, 0);
        ch.slide_panning(200);
        assert_eq!(ch.panning, 255);
    }

    #[test]
    fn test_tone_portamento_stops_at_target() {
        let mut ch = Channel {
            period: 4608.0,
            target_period: 4600.0,
            tone_porta_speed: 4,
            ..Default::default()
        };
        ch.tone_portamento();
        assert_eq!(ch.period, 4600.0);
        ch.tone_portamento();
        assert_eq!(ch.period, 4600.0);
    }
}

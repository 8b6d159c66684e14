//! Pitch tables, modulation waveforms and tick timing

/// Playback rate of an unmodified sample at C-4
pub const C4_FREQUENCY: f32 = 8363.0;

/// Linear period of C-4
pub const C4_LINEAR_PERIOD: f32 = 4608.0;

/// Amiga period of C-4 (FT2 scale, four times the hardware value)
pub const C4_AMIGA_PERIOD: f32 = 1712.0;

pub const MIN_PERIOD: f32 = 1.0;
pub const MAX_PERIOD: f32 = 32000.0;

/// sin(i * PI/128) * 127 for i = 0..63, mirrored to 256 positions
pub const SINE_LUT_64: [i8; 64] = [
    0, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 22, 24, 26, 28, 30, 32, 34, 36, 38, 40, 42, 44, 46, 48,
    50, 52, 54, 56, 58, 60, 62, 64, 66, 68, 70, 72, 74, 76, 78, 80, 82, 84, 86, 88, 89, 91, 93, 95,
    96, 98, 100, 101, 103, 104, 106, 107, 108, 110, 111, 112, 113, 114, 115,
];

/// 2^(i/768) for i = 0..=768, one octave of linear periods
pub const LINEAR_FREQ_TABLE: [f32; 769] = {
    let mut table = [0.0f32; 769];
    let mut i = 0;
    while i < 769 {
        // e^(x ln 2) by Taylor series, powf is not const
        let t = (i as f64 / 768.0) * std::f64::consts::LN_2;
        let e_t = 1.0
            + t * (1.0
                + t * (0.5
                    + t * (0.16666666666666666
                        + t * (0.041666666666666664
                            + t * (0.008333333333333333
                                + t * (0.001388888888888889 + t * 0.0001984126984126984))))));
        table[i] = e_t as f32;
        i += 1;
    }
    table
};

/// Output frames per tick: `sample_rate * 2.5 / bpm`
pub fn samples_per_tick(bpm: u16, sample_rate: u32) -> u32 {
    if bpm == 0 {
        return sample_rate;
    }
    (sample_rate * 5 / 2) / bpm as u32
}

/// Period of a 0-based semitone (0 = C-0, 48 = C-4) with finetune in
/// 1/128 semitone
pub fn note_to_period(note: i16, finetune: i8, linear: bool) -> f32 {
    let period = if linear {
        7680.0 - note as f32 * 64.0 - finetune as f32 / 2.0
    } else {
        let semitones = (note - 48) as f32 + finetune as f32 / 128.0;
        C4_AMIGA_PERIOD / (semitones / 12.0).exp2()
    };
    period.clamp(MIN_PERIOD, MAX_PERIOD)
}

/// Playback frequency in Hz for a period
#[inline]
pub fn period_to_frequency(period: f32, linear: bool) -> f32 {
    if period <= 0.0 {
        return 0.0;
    }
    if !linear {
        return C4_FREQUENCY * C4_AMIGA_PERIOD / period;
    }

    let diff = C4_LINEAR_PERIOD - period;
    let octaves = (diff / 768.0).floor();
    let frac = diff - octaves * 768.0;
    let idx = (frac as usize).min(767);
    let t = frac - idx as f32;
    let scale = LINEAR_FREQ_TABLE[idx] * (1.0 - t) + LINEAR_FREQ_TABLE[idx + 1] * t;

    C4_FREQUENCY * scale * octave_scale(octaves as i32)
}

#[inline]
fn octave_scale(octaves: i32) -> f32 {
    let shift = octaves.unsigned_abs().min(31);
    if octaves >= 0 {
        (1u32 << shift) as f32
    } else {
        1.0 / (1u32 << shift) as f32
    }
}

/// Vibrato/tremolo waveform at one of 256 positions, in [-1, 1]
///
/// - 0: sine
/// - 1: ramp down
/// - 2: square
/// - 3: pseudo-random, deterministic in the position
pub fn get_waveform_value(waveform: u8, position: u8) -> f32 {
    match waveform & 0x03 {
        0 => {
            let idx = (position & 0x3F) as usize;
            let val = match position >> 6 {
                0 => SINE_LUT_64[idx],
                1 => SINE_LUT_64[63 - idx],
                2 => -SINE_LUT_64[idx],
                _ => -SINE_LUT_64[63 - idx],
            };
            val as f32 / 115.0
        }
        1 => (128i16 - position as i16) as f32 / 128.0,
        2 => {
            if position < 128 {
                1.0
            } else {
                -1.0
            }
        }
        _ => {
            let x = position.wrapping_mul(0x9E) ^ 0x5C;
            (x as f32 / 127.5) - 1.0
        }
    }
}

/// Frequency ratio of a semitone offset
#[inline]
pub fn semitone_ratio(semitones: u8) -> f32 {
    (semitones as f32 / 12.0).exp2()
}

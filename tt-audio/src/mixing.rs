//! Panning and soft clipping shared by the tracker player and the mixer

/// cos(i * PI/32) for i = 0..=16, scaled to 0-255
const PAN_COS_LUT: [u8; 17] = [
    255, 254, 251, 245, 237, 226, 213, 198, 181, 162, 142, 121, 98, 75, 51, 26, 0,
];

/// Equal-power left/right gains for `pan` in [-1, 1]
#[inline]
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let pos = (pan.clamp(-1.0, 1.0) + 1.0) * 8.0;
    let idx = (pos as usize).min(15);
    let frac = pos - idx as f32;

    let left = PAN_COS_LUT[idx] as f32 * (1.0 - frac) + PAN_COS_LUT[idx + 1] as f32 * frac;
    let right =
        PAN_COS_LUT[16 - idx] as f32 * (1.0 - frac) + PAN_COS_LUT[15 - idx] as f32 * frac;

    (left / 255.0, right / 255.0)
}

/// Scale a mono sample and spread it across the stereo field
///
/// -1 is hard left, 0 is centre at -3dB per side, +1 is hard right.
#[inline]
pub fn apply_pan(sample: f32, pan: f32, volume: f32) -> (f32, f32) {
    let (left, right) = pan_gains(pan);
    let scaled = sample * volume;
    (scaled * left, scaled * right)
}

/// XM panning byte (0 left, 128 centre, 255 right) to [-1, 1]
#[inline]
pub fn pan_from_xm(panning: u8) -> f32 {
    (panning as f32 - 128.0) / 128.0
}

/// tanh(t) for t = 0.00, 0.25, ..., 7.00
const TANH_LUT: [f32; 29] = [
    0.0, 0.244919, 0.462117, 0.635149, 0.761594, 0.848284, 0.905148, 0.941389, 0.964028, 0.978034,
    0.986614, 0.991815, 0.995055, 0.997109, 0.998396, 0.999198, 0.999665, 0.999892, 0.999988,
    0.999998, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0,
];

/// Gentle limiter for the summed mix
///
/// [-1, 1] passes through. Beyond that the excess is compressed with tanh,
/// so output never exceeds +/-2.
#[inline]
pub fn soft_clip(x: f32) -> f32 {
    if x.abs() <= 1.0 {
        return x;
    }

    let pos = (x.abs() - 1.0).min(7.0) * 4.0;
    let idx = (pos as usize).min(27);
    let frac = pos - idx as f32;
    let tanh = TANH_LUT[idx] * (1.0 - frac) + TANH_LUT[idx + 1] * frac;

    x.signum() * (1.0 + tanh)
}

/// Apply a gain to a whole buffer, then soft clip it
pub fn finish_block(buffer: &mut [f32], gain: f32) {
    for sample in buffer {
        *sample = soft_clip(*sample * gain);
    }
}

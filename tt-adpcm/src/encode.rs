//! IMA-ADPCM encoder
//!
//! The encoder updates its state by running the decoder on the nibble it
//! emits, so an encoder and a decoder fed the same nibbles never drift apart.

use crate::{AdpcmError, AdpcmState, block_size, decode_nibble};

/// Encode one sample to a 4-bit nibble, updating `state`
#[inline]
pub fn encode_nibble(state: &mut AdpcmState, sample: i16) -> u8 {
    let step = state.step();
    let mut diff = sample as i32 - state.predictor;

    let mut nibble = 0u8;
    if diff < 0 {
        nibble = 0x08;
        diff = -diff;
    }

    let mut threshold = step;
    let mut mask = 0x04u8;
    while mask != 0 {
        if diff >= threshold {
            nibble |= mask;
            diff -= threshold;
        }
        threshold >>= 1;
        mask >>= 1;
    }

    decode_nibble(state, nibble);
    nibble
}

/// Encode samples to packed nibbles (low nibble first)
///
/// An odd sample count leaves the final high nibble zero.
pub fn encode_block(state: &mut AdpcmState, samples: &[i16]) -> Vec<u8> {
    let mut output = Vec::with_capacity(samples.len().div_ceil(2));
    for pair in samples.chunks(2) {
        let low = encode_nibble(state, pair[0]);
        let high = pair.get(1).map_or(0, |&s| encode_nibble(state, s));
        output.push(low | (high << 4));
    }
    output
}

/// Encode samples into fixed-size headered blocks
///
/// The step index carries over from block to block; the final block is padded
/// to the full block size.
///
/// # Errors
/// Returns `AdpcmError::InvalidBlockSize` if `samples_per_block` is zero
pub fn encode_blocks(samples: &[i16], samples_per_block: usize) -> Result<Vec<u8>, AdpcmError> {
    if samples_per_block == 0 {
        return Err(AdpcmError::InvalidBlockSize);
    }

    let stride = block_size(samples_per_block);
    let mut output = Vec::with_capacity(samples.len().div_ceil(samples_per_block) * stride);
    let mut step_index = 0u8;

    for block in samples.chunks(samples_per_block) {
        let start = output.len();
        let mut state = AdpcmState::with_values(block[0], step_index);

        output.extend_from_slice(&block[0].to_le_bytes());
        output.push(state.step_index);
        output.push(0);
        output.extend(encode_block(&mut state, &block[1..]));
        output.resize(start + stride, 0);

        step_index = state.step_index;
    }

    Ok(output)
}

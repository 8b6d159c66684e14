//! IMA-ADPCM decoder
//!
//! Garbage input never fails: every nibble produces a (possibly clipped)
//! sample and a valid next state.

use crate::{
    AdpcmError, AdpcmState, BLOCK_HEADER_SIZE, MAX_STEP_INDEX, advance_index,
    block_size, clamp_i16,
};

/// Decode one 4-bit nibble, updating `state`
///
/// Only the low four bits of `nibble` are used.
#[inline]
pub fn decode_nibble(state: &mut AdpcmState, nibble: u8) -> i16 {
    let nibble = nibble & 0x0F;
    let step = state.step();

    let mut diff = step >> 3;
    if nibble & 0x01 != 0 {
        diff += step >> 2;
    }
    if nibble & 0x02 != 0 {
        diff += step >> 1;
    }
    if nibble & 0x04 != 0 {
        diff += step;
    }

    let predictor = if nibble & 0x08 != 0 {
        state.predictor - diff
    } else {
        state.predictor + diff
    };

    state.predictor = clamp_i16(predictor);
    state.step_index = advance_index(state.step_index, nibble);
    state.predictor as i16
}

/// Number of samples held by `packed_len` bytes of packed nibbles
#[inline]
#[must_use]
pub fn decoded_len(packed_len: usize) -> usize {
    packed_len * 2
}

/// Decode packed nibbles (low nibble first) into `output`
///
/// Decodes until either the input or the output runs out and returns the
/// number of samples written.
pub fn decode_block(state: &mut AdpcmState, packed: &[u8], output: &mut [i16]) -> usize {
    let mut written = 0;
    for &byte in packed {
        if written >= output.len() {
            break;
        }
        output[written] = decode_nibble(state, byte);
        written += 1;

        if written >= output.len() {
            break;
        }
        output[written] = decode_nibble(state, byte >> 4);
        written += 1;
    }
    written
}

/// Decode a stream of headered blocks
///
/// `total_samples` is supplied by the container; the final block may be padded.
///
/// # Errors
/// Returns `AdpcmError` if a header is truncated or carries an invalid step index
pub fn decode_blocks(
    data: &[u8],
    samples_per_block: usize,
    total_samples: usize,
) -> Result<Vec<i16>, AdpcmError> {
    if samples_per_block == 0 {
        return Err(AdpcmError::InvalidBlockSize);
    }

    let mut output = Vec::with_capacity(total_samples);
    let mut offset = 0;
    let stride = block_size(samples_per_block);

    while output.len() < total_samples {
        if offset + BLOCK_HEADER_SIZE > data.len() {
            return Err(AdpcmError::TruncatedBlock);
        }
        let predictor = i16::from_le_bytes([data[offset], data[offset + 1]]);
        let step_index = data[offset + 2];
        if step_index > MAX_STEP_INDEX {
            return Err(AdpcmError::InvalidStepIndex(step_index));
        }

        let mut state = AdpcmState::with_values(predictor, step_index);
        output.push(predictor);

        let wanted = (samples_per_block - 1).min(total_samples - output.len());
        let body_start = offset + BLOCK_HEADER_SIZE;
        let body_end = (offset + stride).min(data.len());
        let mut block = vec![0i16; wanted];
        let decoded = decode_block(&mut state, &data[body_start..body_end], &mut block);
        if decoded < wanted {
            return Err(AdpcmError::TruncatedBlock);
        }
        output.extend_from_slice(&block);
        offset += stride;
    }

    Ok(output)
}

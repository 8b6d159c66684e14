//! tt-adpcm: IMA-ADPCM codec for the tt audio core
//!
//! **This is a pure codec** - it converts between 16-bit PCM and 4-bit IMA
//! nibbles. Containers, sample rates and loop points belong to the caller
//! (the wave bank). The only state is [`AdpcmState`], which the caller owns
//! per stream and must store/restore itself when it seeks or loops.
//!
//! # Nibble packing
//!
//! ```text
//! byte n: [ sample 2n+1 (high nibble) | sample 2n (low nibble) ]
//! ```
//!
//! # Block format
//!
//! Headered blocks allow a stream to resynchronize without decoding from the
//! start:
//!
//! ```text
//! 0x00: predictor (i16 LE)
//! 0x02: step index (u8, 0-88)
//! 0x03: reserved (0)
//! 0x04: packed nibbles, (samples_per_block - 1) / 2 bytes rounded up
//! ```
//!
//! The header's predictor is the block's first sample.
//!
//! # Usage
//!
//! ```
//! use tt_adpcm::{AdpcmState, decode_block, encode_block};
//!
//! let samples: Vec<i16> = (0..100).map(|i| (i * 50) as i16).collect();
//! let packed = encode_block(&mut AdpcmState::new(), &samples);
//! let mut decoded = vec![0i16; samples.len()];
//! decode_block(&mut AdpcmState::new(), &packed, &mut decoded);
//! ```

mod decode;
mod encode;

pub use decode::{decode_block, decode_blocks, decode_nibble, decoded_len};
pub use encode::{encode_block, encode_blocks, encode_nibble};

// =============================================================================
// Constants
// =============================================================================

/// Highest valid step index
pub const MAX_STEP_INDEX: u8 = 88;

/// Size of a headered block's header in bytes
pub const BLOCK_HEADER_SIZE: usize = 4;

/// Quantizer step sizes (89 entries)
pub const STEP_TABLE: [i32; 89] = [
    7, 8, 9, 10, 11, 12, 13, 14, 16, 17, 19, 21, 23, 25, 28, 31, 34, 37, 41, 45, 50, 55, 60, 66,
    73, 80, 88, 97, 107, 118, 130, 143, 157, 173, 190, 209, 230, 253, 279, 307, 337, 371, 408,
    449, 494, 544, 598, 658, 724, 796, 876, 963, 1060, 1166, 1282, 1411, 1552, 1707, 1878, 2066,
    2272, 2499, 2749, 3024, 3327, 3660, 4026, 4428, 4871, 5358, 5894, 6484, 7132, 7845, 8630,
    9493, 10442, 11487, 12635, 13899, 15289, 16818, 18500, 20350, 22385, 24623, 27086, 29794,
    32767,
];

/// Step index adjustment per nibble magnitude (sign bit ignored)
pub const INDEX_TABLE: [i8; 16] = [-1, -1, -1, -1, 2, 4, 6, 8, -1, -1, -1, -1, 2, 4, 6, 8];

// =============================================================================
// State
// =============================================================================

/// Per-stream codec state
///
/// Owned by the voice that decodes the stream. Reset at stream start; a voice
/// that loops keeps a copy taken at the loop start and restores it on wrap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdpcmState {
    /// Last reconstructed sample
    pub predictor: i32,
    /// Index into [`STEP_TABLE`] (0-88); larger values read as 88
    pub step_index: u8,
}

impl AdpcmState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// State carried by a block header
    #[must_use]
    pub fn with_values(predictor: i16, step_index: u8) -> Self {
        Self {
            predictor: predictor as i32,
            step_index: step_index.min(MAX_STEP_INDEX),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Current quantizer step size
    #[inline]
    #[must_use]
    pub fn step(&self) -> i32 {
        STEP_TABLE[self.step_index.min(MAX_STEP_INDEX) as usize]
    }
}

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur while decoding headered blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdpcmError {
    /// Block shorter than its header
    TruncatedBlock,
    /// Header step index above 88
    InvalidStepIndex(u8),
    /// `samples_per_block` of zero
    InvalidBlockSize,
}

impl core::fmt::Display for AdpcmError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AdpcmError::TruncatedBlock => write!(f, "truncated ADPCM block"),
            AdpcmError::InvalidStepIndex(i) => write!(f, "invalid ADPCM step index {}", i),
            AdpcmError::InvalidBlockSize => write!(f, "ADPCM block size must be non-zero"),
        }
    }
}

impl std::error::Error for AdpcmError {}

// =============================================================================
// Helper Functions
// =============================================================================

#[inline]
pub(crate) fn clamp_i16(v: i32) -> i32 {
    v.clamp(-32768, 32767)
}

#[inline]
pub(crate) fn advance_index(index: u8, nibble: u8) -> u8 {
    (index as i32 + INDEX_TABLE[(nibble & 0x0F) as usize] as i32).clamp(0, MAX_STEP_INDEX as i32)
        as u8
}

/// Bytes needed by a headered block holding `samples_per_block` samples
#[inline]
#[must_use]
pub fn block_size(samples_per_block: usize) -> usize {
    BLOCK_HEADER_SIZE + samples_per_block.saturating_sub(1).div_ceil(2)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn generate_sine(freq: f32, sample_rate: u32, duration_sec: f32) -> Vec<i16> {
        let num_samples = (sample_rate as f32 * duration_sec) as usize;
        (0..num_samples)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (f32::sin(t * freq * std::f32::consts::TAU) * 16000.0) as i16
            })
            .collect()
    }

    #[test]
    fn test_step_table_bounds() {
        assert_eq!(STEP_TABLE.len(), MAX_STEP_INDEX as usize + 1);
        assert_eq!(STEP_TABLE[0], 7);
        assert_eq!(STEP_TABLE[88], 32767);
        assert!(STEP_TABLE.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_nibble_roundtrip_converges() {
        // Encoding the same target repeatedly walks the predictor onto it. Once
        // converged the decoded value stays within one quantization step.
        for &target in &[0i16, 1000, -1000, 12345, -32768, 32767] {
            let mut enc = AdpcmState::new();
            let mut dec = AdpcmState::new();
            let mut last = 0i16;
            for _ in 0..64 {
                let nibble = encode_nibble(&mut enc, target);
                last = decode_nibble(&mut dec, nibble);
            }
            assert_eq!(enc, dec, "encoder and decoder state must stay in lockstep");
            let err = (last as i32 - target as i32).abs();
            assert!(
                err <= dec.step(),
                "target {} decoded {} (err {}, step {})",
                target,
                last,
                err,
                dec.step()
            );
        }
    }

    #[test]
    fn test_sine_roundtrip_error() {
        let original = generate_sine(440.0, 22050, 0.5);
        let packed = encode_block(&mut AdpcmState::new(), &original);
        assert_eq!(packed.len(), original.len().div_ceil(2));

        let mut decoded = vec![0i16; original.len()];
        let n = decode_block(&mut AdpcmState::new(), &packed, &mut decoded);
        assert_eq!(n, original.len());

        // Skip the attack while the step index ramps up
        let max_error = original[64..]
            .iter()
            .zip(&decoded[64..])
            .map(|(a, b)| (*a as i32 - *b as i32).abs())
            .max()
            .unwrap_or(0);
        assert!(max_error < 1500, "sine max error too high: {}", max_error);
    }

    #[test]
    fn test_block_size() {
        assert_eq!(block_size(1), 4);
        assert_eq!(block_size(2), 5);
        assert_eq!(block_size(3), 5);
        assert_eq!(block_size(1017), 512);
    }

    #[test]
    fn test_headered_blocks_roundtrip() {
        let original = generate_sine(220.0, 22050, 0.2);
        let blocks = encode_blocks(&original, 505).unwrap();
        assert_eq!(blocks.len() % block_size(505), 0);

        let decoded = decode_blocks(&blocks, 505, original.len()).unwrap();
        assert_eq!(decoded.len(), original.len());
        // First sample of each block is stored exactly in its header
        for block_start in (0..original.len()).step_by(505) {
            assert_eq!(decoded[block_start], original[block_start]);
        }
    }

    #[test]
    fn test_headered_block_errors() {
        assert_eq!(encode_blocks(&[0; 4], 0), Err(AdpcmError::InvalidBlockSize));
        assert_eq!(decode_blocks(&[0, 0], 8, 8), Err(AdpcmError::TruncatedBlock));
        assert_eq!(
            decode_blocks(&[0, 0, 200, 0, 0], 2, 2),
            Err(AdpcmError::InvalidStepIndex(200))
        );
    }
}

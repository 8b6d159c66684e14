//! Injectable randomness for audio variation
//!
//! All random draws (event timestamps, pitch and volume ranges, cue
//! variations) go through one [`XactRandom`] provider shared by the engine and
//! every cue it creates. The provider is passed in at construction; the core
//! never reaches for a global generator.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use tracing::warn;

/// Source of uniform values in `[0, 1)`
///
/// Called from both game threads (cue triggers) and the mixer thread (event
/// refires), so implementations must be thread-safe.
pub trait XactRandom: Send + Sync {
    fn next_f32(&self) -> f32;

    /// Uniform value in `[min, max)`
    fn range(&self, min: f32, max: f32) -> f32 {
        min + (max - min) * self.next_f32()
    }

    /// Uniform index in `0..len` (0 for an empty range)
    fn index(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        ((self.next_f32() * len as f32) as usize).min(len - 1)
    }
}

pub type SharedRandom = Arc<dyn XactRandom>;

/// PCG32 generator behind a mutex
#[derive(Debug)]
pub struct PcgRandom {
    rng: Mutex<Pcg32>,
}

impl PcgRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(Pcg32::seed_from_u64(seed)),
        }
    }

    /// Generator seeded from the thread RNG
    pub fn from_entropy() -> Self {
        Self::new(rand::random::<u64>())
    }

    pub fn shared(seed: u64) -> SharedRandom {
        Arc::new(Self::new(seed))
    }
}

impl XactRandom for PcgRandom {
    fn next_f32(&self) -> f32 {
        let mut rng = self.rng.lock().unwrap_or_else(|e| {
            warn!("random generator mutex poisoned, recovering");
            e.into_inner()
        });
        rng.random::<f32>()
    }
}

/// Replays a fixed list of values, wrapping at the end
///
/// Values are clamped into `[0, 1)` so a test list cannot push ranges out of
/// bounds.
#[derive(Debug)]
pub struct SequenceRandom {
    values: Vec<f32>,
    index: AtomicUsize,
}

impl SequenceRandom {
    pub fn new(values: impl Into<Vec<f32>>) -> Self {
        let values = values
            .into()
            .into_iter()
            .map(|v| v.clamp(0.0, 1.0 - f32::EPSILON))
            .collect();
        Self {
            values,
            index: AtomicUsize::new(0),
        }
    }

    pub fn shared(values: impl Into<Vec<f32>>) -> SharedRandom {
        Arc::new(Self::new(values))
    }

    /// Number of values drawn so far
    pub fn draws(&self) -> usize {
        self.index.load(Ordering::Relaxed)
    }
}

impl XactRandom for SequenceRandom {
    fn next_f32(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        let i = self.index.fetch_add(1, Ordering::Relaxed);
        self.values[i % self.values.len()]
    }
}

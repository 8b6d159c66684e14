//! Mixer thread health monitoring

use std::time::Instant;

use tracing::debug;

/// Below this share of the ring a fill counts as an underrun
const LOW_BUFFER_PERCENT: usize = 35;

/// Counters logged once per second, then reset
#[derive(Debug, Clone)]
pub(super) struct MixerMetrics {
    /// Ring capacity in samples
    pub capacity: usize,
    /// Underrun threshold in samples
    pub low_threshold: usize,
    pub blocks_generated: u64,
    /// Stereo frames count as two samples
    pub samples_generated: u64,
    pub commands_received: u64,
    pub buffer_fill: usize,
    pub buffer_fill_min: usize,
    pub buffer_fill_max: usize,
    /// Blocks generated while the ring was below the low threshold
    pub buffer_underruns: u64,
    /// Blocks that did not fit in the ring
    pub buffer_overruns: u64,
    pub avg_generation_time_us: f64,
    pub last_log_time: Instant,
}

impl MixerMetrics {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            low_threshold: capacity * LOW_BUFFER_PERCENT / 100,
            blocks_generated: 0,
            samples_generated: 0,
            commands_received: 0,
            buffer_fill: 0,
            buffer_fill_min: capacity,
            buffer_fill_max: 0,
            buffer_underruns: 0,
            buffer_overruns: 0,
            avg_generation_time_us: 0.0,
            last_log_time: Instant::now(),
        }
    }

    pub fn is_low(&self, fill: usize) -> bool {
        fill < self.low_threshold
    }

    pub fn record_generation(&mut self, elapsed_us: f64, pushed: usize) {
        self.avg_generation_time_us = 0.1 * elapsed_us + 0.9 * self.avg_generation_time_us;
        self.blocks_generated += 1;
        self.samples_generated += pushed as u64;
    }

    /// Log if a second has passed since the last log
    pub fn maybe_log(&mut self) {
        if self.last_log_time.elapsed().as_secs() < 1 {
            return;
        }

        let percent = |fill: usize| fill as f64 / self.capacity.max(1) as f64 * 100.0;
        debug!(
            "mixer: buf={:.1}% (min={:.1}%, max={:.1}%), blocks={}, samples={}, \
             commands={}, underruns={}, overruns={}, avg_gen={:.2}us",
            percent(self.buffer_fill),
            percent(self.buffer_fill_min),
            percent(self.buffer_fill_max),
            self.blocks_generated,
            self.samples_generated,
            self.commands_received,
            self.buffer_underruns,
            self.buffer_overruns,
            self.avg_generation_time_us
        );

        self.blocks_generated = 0;
        self.samples_generated = 0;
        self.commands_received = 0;
        self.buffer_underruns = 0;
        self.buffer_overruns = 0;
        self.buffer_fill_min = self.buffer_fill;
        self.buffer_fill_max = self.buffer_fill;
        self.last_log_time = Instant::now();
    }

    pub fn update_buffer_fill(&mut self, fill: usize) {
        self.buffer_fill = fill;
        self.buffer_fill_min = self.buffer_fill_min.min(fill);
        self.buffer_fill_max = self.buffer_fill_max.max(fill);
    }
}

//! Audio configuration (audio.toml)
//!
//! Every field has a serde default, so a partial or empty file is valid.
//! Values are clamped into their working ranges by [`AudioConfig::validated`]
//! whenever a config is loaded or parsed.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AudioError;
use crate::output::SampleType;

pub const MIN_SAMPLE_RATE: u32 = 8_000;
pub const MAX_SAMPLE_RATE: u32 = 192_000;
pub const MIN_BUFFER_FRAMES: usize = 64;
pub const MAX_BUFFER_FRAMES: usize = 8_192;

/// Mixer and front-door settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Output sample rate in Hz (default: 44100)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Stereo frames rendered per mixer block (default: 1024)
    #[serde(default = "default_buffer_frames")]
    pub buffer_frames: usize,
    /// Stereo frames held by the mixer ring buffer (default: 6615, ~150ms)
    #[serde(default = "default_ring_buffer_frames")]
    pub ring_buffer_frames: usize,
    /// Master volume (default: 0.8, range: 0.0-1.0)
    #[serde(default = "default_master_volume")]
    pub master_volume: f32,
    /// Music bus volume (default: 1.0)
    #[serde(default = "default_unity")]
    pub music_volume: f32,
    /// Sound effect bus volume (default: 1.0)
    #[serde(default = "default_unity")]
    pub sfx_volume: f32,
    /// Sample format written to the host buffer
    #[serde(default)]
    pub sample_type: SampleType,
    /// Seed for cue variation; drawn from entropy when unset
    #[serde(default)]
    pub random_seed: Option<u64>,
    /// Bank files were authored on a big-endian target
    #[serde(default)]
    pub big_endian_banks: bool,
    /// Music restarts at the module's restart position when it ends
    #[serde(default = "default_true")]
    pub looping_music: bool,
}

fn default_sample_rate() -> u32 {
    44_100
}
fn default_buffer_frames() -> usize {
    1024
}
fn default_ring_buffer_frames() -> usize {
    6615
}
fn default_master_volume() -> f32 {
    0.8
}
fn default_unity() -> f32 {
    1.0
}
fn default_true() -> bool {
    true
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            buffer_frames: default_buffer_frames(),
            ring_buffer_frames: default_ring_buffer_frames(),
            master_volume: default_master_volume(),
            music_volume: default_unity(),
            sfx_volume: default_unity(),
            sample_type: SampleType::default(),
            random_seed: None,
            big_endian_banks: false,
            looping_music: default_true(),
        }
    }
}

impl AudioConfig {
    /// Clamp every field into its working range
    ///
    /// The ring buffer always holds at least two blocks so the mixer can
    /// render one while the host drains the other.
    pub fn validated(mut self) -> Self {
        self.sample_rate = self.sample_rate.clamp(MIN_SAMPLE_RATE, MAX_SAMPLE_RATE);
        self.buffer_frames = self.buffer_frames.clamp(MIN_BUFFER_FRAMES, MAX_BUFFER_FRAMES);
        self.ring_buffer_frames = self.ring_buffer_frames.max(self.buffer_frames * 2);
        self.master_volume = clamp_volume(self.master_volume);
        self.music_volume = clamp_volume(self.music_volume);
        self.sfx_volume = clamp_volume(self.sfx_volume);
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self, AudioError> {
        let config: Self =
            toml::from_str(content).map_err(|e| AudioError::ConfigParse(e.to_string()))?;
        Ok(config.validated())
    }

    pub fn to_toml_string(&self) -> Result<String, AudioError> {
        toml::to_string_pretty(self).map_err(|e| AudioError::ConfigParse(e.to_string()))
    }

    /// Load from a TOML file, falling back to defaults if it does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AudioError> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no audio config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(AudioError::ConfigRead {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        };
        Self::from_toml_str(&content).inspect_err(|e| {
            warn!("rejecting audio config {}: {}", path.display(), e);
        })
    }

    /// Write as TOML, creating parent directories as needed
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), AudioError> {
        let path = path.as_ref();
        let write_error = |e: std::io::Error| AudioError::ConfigWrite {
            path: path.display().to_string(),
            reason: e.to_string(),
        };
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir).map_err(write_error)?;
        }
        let content = self.to_toml_string()?;
        std::fs::write(path, content).map_err(write_error)
    }

    /// Seconds of audio in one mixer block
    pub fn block_seconds(&self) -> f64 {
        self.buffer_frames as f64 / self.sample_rate.max(1) as f64
    }
}

fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        return default_unity();
    }
    volume.clamp(0.0, 1.0)
}

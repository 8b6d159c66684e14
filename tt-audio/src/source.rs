//! Render sources and the block mixer

use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::config::AudioConfig;
use crate::mixing::finish_block;
use crate::player::XmPlayer;

/// Anything that adds interleaved stereo f32 into a block
pub trait AudioSource: Send {
    /// Mix into `out`, adding to what is already there
    fn render(&mut self, out: &mut [f32]);

    /// False once the source has nothing more to play
    fn is_active(&self) -> bool {
        true
    }
}

pub type SharedSource = Arc<Mutex<dyn AudioSource>>;
pub type SharedPlayer = Arc<Mutex<XmPlayer>>;

/// Sums the music player and any number of effect sources
///
/// Music and effects have separate bus volumes. The summed block is scaled
/// by the master volume and soft clipped. Locks are taken one source at a
/// time for the length of that source's render.
pub struct Mixer {
    music: Option<SharedPlayer>,
    sources: Vec<SharedSource>,
    master_volume: f32,
    music_volume: f32,
    sfx_volume: f32,
    scratch: Vec<f32>,
}

impl Mixer {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            music: None,
            sources: Vec::new(),
            master_volume: config.master_volume,
            music_volume: config.music_volume,
            sfx_volume: config.sfx_volume,
            scratch: Vec::with_capacity(config.buffer_frames * 2),
        }
    }

    pub fn set_music(&mut self, player: Option<SharedPlayer>) {
        self.music = player;
    }

    pub fn music(&self) -> Option<&SharedPlayer> {
        self.music.as_ref()
    }

    pub fn add_source(&mut self, source: SharedSource) {
        self.sources.push(source);
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.clamp(0.0, 1.0);
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    pub fn set_music_volume(&mut self, volume: f32) {
        self.music_volume = volume.clamp(0.0, 1.0);
    }

    pub fn music_volume(&self) -> f32 {
        self.music_volume
    }

    pub fn set_sfx_volume(&mut self, volume: f32) {
        self.sfx_volume = volume.clamp(0.0, 1.0);
    }

    /// Overwrite `out` with one mixed block
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        if self.scratch.len() != out.len() {
            self.scratch.resize(out.len(), 0.0);
        }

        if let Some(music) = &self.music {
            self.scratch.fill(0.0);
            lock_source(music.as_ref()).render(&mut self.scratch);
            add_scaled(out, &self.scratch, self.music_volume);
        }

        for source in &self.sources {
            self.scratch.fill(0.0);
            lock_source(source.as_ref()).render(&mut self.scratch);
            add_scaled(out, &self.scratch, self.sfx_volume);
        }

        finish_block(out, self.master_volume);
    }
}

fn lock_source<S: ?Sized>(source: &Mutex<S>) -> std::sync::MutexGuard<'_, S> {
    source.lock().unwrap_or_else(|e| {
        warn!("audio source mutex poisoned; continuing");
        e.into_inner()
    })
}

fn add_scaled(out: &mut [f32], block: &[f32], gain: f32) {
    for (dst, &src) in out.iter_mut().zip(block) {
        *dst += src * gain;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(f32);

    impl AudioSource for Constant {
        fn render(&mut self, out: &mut [f32]) {
            for sample in out {
                *sample += self.0;
            }
        }
    }

    fn config() -> AudioConfig {
        AudioConfig {
            master_volume: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_mixer_is_silent() {
        let mut mixer = Mixer::new(&config());
        let mut out = vec![1.0; 8];
        mixer.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_sources_sum_with_bus_volume() {
        let mut mixer = Mixer::new(&config());
        mixer.add_source(Arc::new(Mutex::new(Constant(0.25))));
        mixer.add_source(Arc::new(Mutex::new(Constant(0.25))));
        mixer.set_sfx_volume(0.5);
        let mut out = vec![0.0; 4];
        mixer.render(&mut out);
        assert_eq!(out, vec![0.25; 4]);
        assert_eq!(mixer.source_count(), 2);
    }

    #[test]
    fn test_master_volume_and_clip() {
        let mut mixer = Mixer::new(&config());
        mixer.add_source(Arc::new(Mutex::new(Constant(3.0))));
        let mut out = vec![0.0; 2];
        mixer.render(&mut out);
        assert!(out[0] > 1.0 && out[0] <= 2.0);

        mixer.set_master_volume(0.25);
        mixer.render(&mut out);
        assert_eq!(out[0], 0.75);
    }

    #[test]
    fn test_volumes_are_clamped() {
        let mut mixer = Mixer::new(&config());
        mixer.set_master_volume(2.0);
        mixer.set_music_volume(-1.0);
        assert_eq!(mixer.master_volume(), 1.0);
        assert_eq!(mixer.music_volume(), 0.0);
    }
}

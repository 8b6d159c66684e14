//! Music front door
//!
//! [`MusicPlayer`] owns an [`XmPlayer`] behind `Arc<Mutex<_>>`. Hand
//! [`MusicPlayer::shared`] to a [`Mixer`](crate::Mixer) or
//! [`MixerHandle::play_music`](crate::MixerHandle::play_music) and keep
//! the `MusicPlayer` for transport control.

use std::sync::{Arc, MutexGuard};

use tracing::{info, warn};
use tt_shared::{SharedMemoryManager, XmFileIo};
use tt_xm::{XmModule, load_module};

use crate::config::AudioConfig;
use crate::error::AudioError;
use crate::player::{PlaybackPosition, PlayerState, XmPlayer};
use crate::source::SharedPlayer;

pub struct MusicPlayer {
    player: SharedPlayer,
}

impl MusicPlayer {
    /// Load an XM file through `io`
    ///
    /// The player renders at the configured sample rate and loops if
    /// `looping_music` is set.
    pub fn load(
        io: &mut dyn XmFileIo,
        path: &str,
        memory: &SharedMemoryManager,
        config: &AudioConfig,
    ) -> Result<Self, AudioError> {
        let module = load_module(io, path, memory)?;
        info!(
            "loaded music '{}' from {}: {} channels, {} orders",
            module.name,
            path,
            module.num_channels,
            module.song_length()
        );
        Ok(Self::from_module(Arc::new(module), config))
    }

    pub fn from_module(module: Arc<XmModule>, config: &AudioConfig) -> Self {
        let mut player = XmPlayer::new(module, config.sample_rate);
        player.set_looping(config.looping_music);
        Self {
            player: Arc::new(std::sync::Mutex::new(player)),
        }
    }

    /// The player as the mixer sees it
    pub fn shared(&self) -> SharedPlayer {
        Arc::clone(&self.player)
    }

    fn lock(&self) -> MutexGuard<'_, XmPlayer> {
        self.player.lock().unwrap_or_else(|e| {
            warn!("music player mutex poisoned; continuing");
            e.into_inner()
        })
    }

    /// Start from the top of the song
    pub fn play(&self) -> bool {
        self.lock().play()
    }

    pub fn stop(&self) {
        self.lock().stop();
    }

    pub fn pause(&self) -> bool {
        self.lock().pause()
    }

    pub fn resume(&self) -> bool {
        self.lock().resume()
    }

    pub fn set_volume(&self, volume: f32) {
        self.lock().set_volume(volume);
    }

    pub fn volume(&self) -> f32 {
        self.lock().volume()
    }

    pub fn fade_to(&self, volume: f32, seconds: f32) {
        self.lock().fade_to(volume, seconds);
    }

    pub fn set_looping(&self, looping: bool) {
        self.lock().set_looping(looping);
    }

    pub fn position(&self) -> PlaybackPosition {
        self.lock().position()
    }

    pub fn state(&self) -> PlayerState {
        self.lock().state()
    }

    pub fn is_playing(&self) -> bool {
        self.lock().is_playing()
    }

    pub fn is_sounding(&self) -> bool {
        self.lock().is_sounding()
    }

    pub fn loop_count(&self) -> u32 {
        self.lock().loop_count()
    }

    pub fn module(&self) -> Arc<XmModule> {
        Arc::clone(self.lock().module())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{AudioSource, Mixer};
    use tt_shared::{AllocType, Allocation, HeapMemoryManager, MemoryFile};
    use tt_xm::{LoopType, XmInstrument, XmNote, XmPattern, XmSample, write_module};

    fn song_bytes() -> Vec<u8> {
        let memory = HeapMemoryManager::shared();
        let mut notes = vec![XmNote::default(); 16];
        notes[0] = XmNote {
            note: 49,
            instrument: 1,
            volume: 0x50,
            ..Default::default()
        };
        let sample = XmSample::new(&memory, "square", [8000, -8000].repeat(50))
            .unwrap()
            .with_loop(0, 100, LoopType::Forward);
        let module = XmModule {
            name: "theme".to_string(),
            tracker_name: "tt-audio".to_string(),
            num_channels: 1,
            restart_position: 0,
            default_speed: 6,
            default_bpm: 125,
            linear_frequency_table: true,
            order_table: Allocation::from_vec(&memory, vec![0], AllocType::SongHeader).unwrap(),
            patterns: vec![XmPattern::from_notes(&memory, 16, 1, &notes).unwrap()],
            instruments: vec![XmInstrument::new(&memory, "square", vec![sample]).unwrap()],
        };
        write_module(&module)
    }

    fn load(config: &AudioConfig) -> MusicPlayer {
        let mut io = MemoryFile::single("theme.xm", song_bytes());
        MusicPlayer::load(&mut io, "theme.xm", &HeapMemoryManager::shared(), config).unwrap()
    }

    #[test]
    fn test_load_and_transport() {
        let music = load(&AudioConfig::default());
        assert_eq!(music.module().name, "theme");
        assert_eq!(music.state(), PlayerState::Stopped);
        assert!(music.play());
        assert!(music.pause());
        assert_eq!(music.state(), PlayerState::Paused);
        assert!(music.resume());
        music.stop();
        assert!(!music.is_playing());
    }

    #[test]
    fn test_missing_file() {
        let mut io = MemoryFile::new();
        let err = MusicPlayer::load(
            &mut io,
            "nope.xm",
            &HeapMemoryManager::shared(),
            &AudioConfig::default(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_mixer_drives_shared_player() {
        let config = AudioConfig {
            master_volume: 1.0,
            ..Default::default()
        };
        let music = load(&config);
        let mut mixer = Mixer::new(&config);
        mixer.set_music(Some(music.shared()));
        music.play();

        // One tick at 125 BPM is 882 frames at 44.1 kHz
        let mut out = vec![0.0; 882 * 2 + 2];
        mixer.render(&mut out);
        assert!(out.iter().any(|&s| s != 0.0));
        assert_eq!(music.position().tick, 2);
    }

    #[test]
    fn test_looping_follows_config() {
        let config = AudioConfig {
            looping_music: false,
            ..Default::default()
        };
        let music = load(&config);
        music.play();
        {
            let shared = music.shared();
            let mut player = shared.lock().unwrap();
            for _ in 0..16 * 6 {
                player.tick();
            }
        }
        assert_eq!(music.state(), PlayerState::Stopped);
        assert_eq!(music.loop_count(), 1);
    }

    #[test]
    fn test_fade_through_front_door() {
        let music = load(&AudioConfig::default());
        music.play();
        music.set_volume(0.5);
        assert_eq!(music.volume(), 0.5);
        music.fade_to(0.0, 0.001);
        let shared = music.shared();
        let mut out = vec![0.0; 200];
        shared.lock().unwrap().render(&mut out);
        assert_eq!(music.volume(), 0.0);
    }
}

//! Sound effect front door with 3D positioning
//!
//! [`SoundPlayer`] wraps an [`XactEngine`] in a mixer source. Cues played
//! with [`SoundPlayer::play_at`] are attenuated and panned from their
//! position relative to the [`Listener`] each time
//! [`SoundPlayer::update_positions`] runs.

use std::ops::{Add, Mul, Sub};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};
use tt_shared::{SharedMemoryManager, XmFileIo};
use tt_xact::bank::{load_sound_bank, load_wave_bank};
use tt_xact::{CueInstance, PcgRandom, SharedRandom, SoundBank, WaveBank, XactEngine};

use crate::config::AudioConfig;
use crate::error::AudioError;
use crate::source::{AudioSource, SharedSource};

pub const DEFAULT_MIN_DISTANCE: f32 = 1.0;
pub const DEFAULT_MAX_DISTANCE: f32 = 100.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Unit vector, or zero for a zero-length input
    pub fn normalized(self) -> Self {
        let length = self.length();
        if length <= f32::EPSILON {
            Self::ZERO
        } else {
            self * (1.0 / length)
        }
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Where the ears are and which way they face
///
/// Defaults to the origin looking down -Z with +Y up, so +X is right.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Listener {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: Vec3::new(0.0, 0.0, -1.0),
            up: Vec3::new(0.0, 1.0, 0.0),
        }
    }
}

impl Listener {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn right(&self) -> Vec3 {
        self.forward.cross(self.up).normalized()
    }
}

/// Gain and pan for a source at `position`
///
/// Inverse-distance: full gain inside `min_distance`, `min / distance`
/// beyond it, held at `min / max` past `max_distance`. Pan is the
/// direction's projection on the listener's right vector.
pub fn spatialize(
    listener: &Listener,
    position: Vec3,
    min_distance: f32,
    max_distance: f32,
) -> (f32, f32) {
    let offset = position - listener.position;
    let distance = offset.length();
    let min_distance = min_distance.max(f32::EPSILON);
    let clamped = distance.clamp(min_distance, max_distance.max(min_distance));
    let gain = min_distance / clamped;
    let pan = offset.normalized().dot(listener.right()).clamp(-1.0, 1.0);
    (gain, pan)
}

/// The cue engine as a mixer source
///
/// Each block is rendered first, then the engine clock advances by the
/// block's length.
pub struct CueSource {
    engine: Option<XactEngine>,
    sample_rate: u32,
}

impl AudioSource for CueSource {
    fn render(&mut self, out: &mut [f32]) {
        let Some(engine) = &mut self.engine else {
            return;
        };
        let frames = out.len() / 2;
        engine.render(out, self.sample_rate);
        engine.update(frames as f64 / self.sample_rate.max(1) as f64);
    }

    fn is_active(&self) -> bool {
        self.engine.as_ref().is_some_and(|e| e.live_cue_count() > 0)
    }
}

struct Emitter {
    cue: Arc<CueInstance>,
    position: Vec3,
}

pub struct SoundPlayer {
    source: Arc<Mutex<CueSource>>,
    rng: SharedRandom,
    big_endian: bool,
    listener: Listener,
    emitters: Vec<Emitter>,
    min_distance: f32,
    max_distance: f32,
}

impl SoundPlayer {
    /// A player with no banks loaded
    ///
    /// Randomized cue parameters come from a generator seeded with
    /// `random_seed`, or from entropy when it is unset.
    pub fn new(config: &AudioConfig) -> Self {
        let rng: SharedRandom = match config.random_seed {
            Some(seed) => PcgRandom::shared(seed),
            None => Arc::new(PcgRandom::from_entropy()),
        };
        Self::with_random(config, rng)
    }

    pub fn with_random(config: &AudioConfig, rng: SharedRandom) -> Self {
        Self {
            source: Arc::new(Mutex::new(CueSource {
                engine: None,
                sample_rate: config.sample_rate,
            })),
            rng,
            big_endian: config.big_endian_banks,
            listener: Listener::default(),
            emitters: Vec::new(),
            min_distance: DEFAULT_MIN_DISTANCE,
            max_distance: DEFAULT_MAX_DISTANCE,
        }
    }

    /// The engine as the mixer sees it
    pub fn source(&self) -> SharedSource {
        self.source.clone()
    }

    fn lock(&self) -> MutexGuard<'_, CueSource> {
        self.source.lock().unwrap_or_else(|e| {
            warn!("sound source mutex poisoned; continuing");
            e.into_inner()
        })
    }

    /// Load a sound bank and its wave bank, replacing any loaded pair
    pub fn load_banks(
        &mut self,
        io: &mut dyn XmFileIo,
        sound_path: &str,
        wave_path: &str,
        memory: &SharedMemoryManager,
    ) -> Result<(), AudioError> {
        let sounds = load_sound_bank(io, sound_path, self.big_endian)?;
        let waves = load_wave_bank(io, wave_path, self.big_endian, memory)?;
        self.set_banks(Arc::new(sounds), Arc::new(waves))
    }

    pub fn set_banks(
        &mut self,
        sounds: Arc<SoundBank>,
        waves: Arc<WaveBank>,
    ) -> Result<(), AudioError> {
        let engine = XactEngine::new(sounds, waves, self.rng.clone())?;
        self.emitters.clear();
        self.lock().engine = Some(engine);
        Ok(())
    }

    pub fn has_banks(&self) -> bool {
        self.lock().engine.is_some()
    }

    /// Start a cue at full gain, centred
    ///
    /// Unknown cues and a missing bank are logged and yield `None`.
    pub fn play(&self, cue: &str) -> Option<Arc<CueInstance>> {
        let mut source = self.lock();
        let Some(engine) = source.engine.as_mut() else {
            warn!("no sound bank loaded; cannot play '{}'", cue);
            return None;
        };
        match engine.play_cue(cue) {
            Ok(instance) => Some(instance),
            Err(e) => {
                warn!("failed to play cue '{}': {}", cue, e);
                None
            }
        }
    }

    /// Start a cue at a world position
    pub fn play_at(&mut self, cue: &str, position: Vec3) -> Option<Arc<CueInstance>> {
        let instance = self.play(cue)?;
        let (gain, pan) = self.spatial(position);
        instance.set_spatial(gain, pan);
        self.emitters.push(Emitter {
            cue: instance.clone(),
            position,
        });
        Some(instance)
    }

    /// Move a positioned cue; `false` if it is not tracked
    pub fn set_cue_position(&mut self, cue: &Arc<CueInstance>, position: Vec3) -> bool {
        let Some(emitter) = self.emitters.iter_mut().find(|e| Arc::ptr_eq(&e.cue, cue)) else {
            return false;
        };
        emitter.position = position;
        true
    }

    pub fn set_listener(&mut self, listener: Listener) {
        self.listener = listener;
        self.update_positions();
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    pub fn set_distance_range(&mut self, min_distance: f32, max_distance: f32) {
        self.min_distance = min_distance.max(f32::EPSILON);
        self.max_distance = max_distance.max(self.min_distance);
    }

    fn spatial(&self, position: Vec3) -> (f32, f32) {
        spatialize(
            &self.listener,
            position,
            self.min_distance,
            self.max_distance,
        )
    }

    /// Re-apply gain and pan to every positioned cue, forgetting finished ones
    pub fn update_positions(&mut self) {
        let before = self.emitters.len();
        self.emitters.retain(|e| !e.cue.is_finished());
        if self.emitters.len() < before {
            debug!("dropped {} finished emitters", before - self.emitters.len());
        }
        for emitter in &self.emitters {
            let (gain, pan) = self.spatial(emitter.position);
            emitter.cue.set_spatial(gain, pan);
        }
    }

    pub fn emitter_count(&self) -> usize {
        self.emitters.len()
    }

    pub fn set_global_variable(&self, name: &str, value: f32) {
        if let Some(engine) = self.lock().engine.as_mut() {
            engine.set_global_variable(name, value);
        }
    }

    /// `false` without banks or for a category the bank does not name
    pub fn set_category_volume(&self, category: &str, volume: f32) -> bool {
        self.lock()
            .engine
            .as_mut()
            .is_some_and(|engine| engine.set_category_volume(category, volume))
    }

    pub fn stop_all(&self, immediate: bool) {
        if let Some(engine) = self.lock().engine.as_mut() {
            engine.stop_all(immediate);
        }
    }

    pub fn live_cue_count(&self) -> usize {
        self.lock().engine.as_ref().map_or(0, |e| e.live_cue_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tt_shared::{HeapMemoryManager, MemoryFile};
    use tt_xact::bank::{write_sound_bank, write_wave_bank};
    use tt_xact::{CueDef, EventDef, SoundDef, TrackDef, Wave};

    fn banks() -> (SoundBank, WaveBank) {
        let memory = HeapMemoryManager::shared();
        let sound = |name: &str| {
            SoundDef::new(
                name,
                vec![TrackDef {
                    volume: 1.0,
                    events: vec![EventDef::play_wave(0, 1.0, 1.0)],
                }],
            )
        };
        let mut echo = sound("echo");
        echo.category = 1;
        let sounds = SoundBank::new(
            "sfx",
            vec!["Default".to_string(), "Reverb".to_string()],
            vec![CueDef::single("tone", 0), CueDef::single("echo", 1)],
            vec![sound("tone"), echo],
        );
        let waves = WaveBank {
            name: "sfx".to_string(),
            waves: vec![Wave::from_pcm16(&memory, "flat", 100, &[16384; 200]).unwrap()],
        };
        (sounds, waves)
    }

    fn player() -> SoundPlayer {
        let config = AudioConfig {
            sample_rate: 100,
            random_seed: Some(7),
            ..Default::default()
        };
        let mut player = SoundPlayer::new(&config);
        let (sounds, waves) = banks();
        player.set_banks(Arc::new(sounds), Arc::new(waves)).unwrap();
        player
    }

    fn render(player: &SoundPlayer, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * 2];
        player.source().lock().unwrap().render(&mut out);
        out
    }

    #[test]
    fn test_spatialize_distance_and_pan() {
        let listener = Listener::default();
        let (gain, pan) = spatialize(&listener, Vec3::new(1.0, 0.0, 0.0), 1.0, 100.0);
        assert_eq!((gain, pan), (1.0, 1.0));

        let (gain, pan) = spatialize(&listener, Vec3::new(0.0, 0.0, -10.0), 1.0, 100.0);
        assert!((gain - 0.1).abs() < 1e-6);
        assert_eq!(pan, 0.0);

        let (gain, pan) = spatialize(&listener, Vec3::new(-500.0, 0.0, 0.0), 1.0, 100.0);
        assert!((gain - 0.01).abs() < 1e-6);
        assert_eq!(pan, -1.0);

        assert_eq!(spatialize(&listener, Vec3::ZERO, 1.0, 100.0), (1.0, 0.0));
    }

    #[test]
    fn test_listener_right_vector() {
        assert_eq!(Listener::default().right(), Vec3::new(1.0, 0.0, 0.0));
        let turned = Listener {
            forward: Vec3::new(1.0, 0.0, 0.0),
            ..Default::default()
        };
        // Facing +X, right is +Z
        assert_eq!(turned.right(), Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_play_without_banks() {
        let player = SoundPlayer::new(&AudioConfig::default());
        assert!(!player.has_banks());
        assert!(player.play("tone").is_none());
        assert!(!player.set_category_volume("Reverb", 0.5));
        assert!(render(&player, 4).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_unknown_cue_is_none() {
        let player = player();
        assert!(player.play("missing").is_none());
        assert_eq!(player.live_cue_count(), 0);
    }

    #[test]
    fn test_play_centred() {
        let player = player();
        assert!(player.play("tone").is_some());
        let out = render(&player, 2);
        assert!((out[0] - 0.5).abs() < 1e-4);
        assert_eq!(out[0], out[1]);
    }

    #[test]
    fn test_play_at_attenuates_and_pans() {
        let mut player = player();
        player.play_at("tone", Vec3::new(2.0, 0.0, 0.0)).unwrap();
        assert_eq!(player.emitter_count(), 1);
        let out = render(&player, 2);
        assert!(out[0].abs() < 1e-6);
        assert!((out[1] - 0.25).abs() < 1e-4);

        // Walk onto the source
        player.set_listener(Listener::at(Vec3::new(2.0, 0.0, 0.0)));
        let out = render(&player, 2);
        assert!((out[0] - 0.5).abs() < 1e-4);
        assert!((out[0] - out[1]).abs() < 1e-6);
    }

    #[test]
    fn test_moving_a_cue() {
        let mut player = player();
        let cue = player.play_at("tone", Vec3::new(-1.0, 0.0, 0.0)).unwrap();
        assert!(player.set_cue_position(&cue, Vec3::new(0.0, 0.0, -4.0)));
        player.update_positions();
        let out = render(&player, 2);
        assert!((out[0] - 0.125).abs() < 1e-4);
        assert!((out[0] - out[1]).abs() < 1e-6);

        let other = player.play("tone").unwrap();
        assert!(!player.set_cue_position(&other, Vec3::ZERO));
    }

    #[test]
    fn test_finished_emitters_are_dropped() {
        let mut player = player();
        player.play_at("tone", Vec3::new(1.0, 0.0, 0.0)).unwrap();
        player.stop_all(true);
        render(&player, 2);
        player.update_positions();
        assert_eq!(player.emitter_count(), 0);
        assert_eq!(player.live_cue_count(), 0);
    }

    #[test]
    fn test_category_volume() {
        let player = player();
        assert!(player.set_category_volume("Reverb", 0.5));
        assert!(!player.set_category_volume("Music", 0.5));
        player.play("echo").unwrap();
        let out = render(&player, 1);
        assert!((out[0] - 0.25).abs() < 1e-4);
    }

    #[test]
    fn test_load_banks_from_files() {
        let (sounds, waves) = banks();
        let mut io = MemoryFile::new();
        io.insert("sfx.ttsb", write_sound_bank(&sounds, false));
        io.insert("sfx.ttwb", write_wave_bank(&waves, false));

        let mut player = SoundPlayer::new(&AudioConfig::default());
        player
            .load_banks(&mut io, "sfx.ttsb", "sfx.ttwb", &HeapMemoryManager::shared())
            .unwrap();
        assert!(player.has_banks());
        assert!(player.play("echo").is_some());

        let err = player.load_banks(
            &mut io,
            "missing.ttsb",
            "sfx.ttwb",
            &HeapMemoryManager::shared(),
        );
        assert!(err.is_err());
        assert!(player.has_banks());
    }
}

//! Cue instances: the shared handle game code holds for a playing cue

use std::sync::{Arc, Mutex, MutexGuard};

use hashbrown::HashMap;
use tracing::{trace, warn};

use super::{EventState, Fade, TrackInstance, TrackMix, pan_gains};
use crate::bank::{RpcParameter, SoundBank, WaveBank};
use crate::error::XactError;
use crate::random::SharedRandom;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueState {
    /// Prepared, not yet started
    Idle,
    Playing,
    Paused,
    /// Fading out after a non-immediate stop
    Stopping,
    Stopped,
}

/// Copy of one track's applied parameters
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSnapshot {
    pub volume: f32,
    pub base_volume: f32,
    pub pitch: f32,
    pub wave: Option<usize>,
    pub events: Vec<EventState>,
}

struct CueInner {
    state: CueState,
    tracks: Vec<TrackInstance>,
    volume: f32,
    pitch: f32,
    spatial_gain: f32,
    pan: f32,
    variables: HashMap<String, f32>,
    rpc_volume: f32,
    rpc_pitch: f32,
    fade: Option<Fade>,
}

/// A triggered cue
///
/// Handed out as `Arc<CueInstance>`: game threads call the controls while
/// the mixer thread runs `update` and `render`. All mutable state sits behind
/// one mutex per cue, so controls take effect on the next update.
pub struct CueInstance {
    name: String,
    sound: usize,
    category: usize,
    sounds: Arc<SoundBank>,
    waves: Arc<WaveBank>,
    rng: SharedRandom,
    inner: Mutex<CueInner>,
}

impl std::fmt::Debug for CueInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CueInstance")
            .field("name", &self.name)
            .field("sound", &self.sound)
            .field("state", &self.state())
            .finish()
    }
}

impl CueInstance {
    /// Prepare an idle instance of `sound` for the cue named `name`
    pub fn new(
        name: &str,
        sound: usize,
        sounds: Arc<SoundBank>,
        waves: Arc<WaveBank>,
        rng: SharedRandom,
    ) -> Result<Self, XactError> {
        let Some(def) = sounds.sounds.get(sound) else {
            return Err(XactError::InvalidSoundIndex {
                cue: sounds.cue_index(name).unwrap_or(usize::MAX),
                sound: sound as u16,
                count: sounds.sounds.len(),
            });
        };
        let tracks = def.tracks.iter().map(TrackInstance::new).collect();
        let category = def.category as usize;
        Ok(Self {
            name: name.to_string(),
            sound,
            category,
            sounds,
            waves,
            rng,
            inner: Mutex::new(CueInner {
                state: CueState::Idle,
                tracks,
                volume: 1.0,
                pitch: 1.0,
                spatial_gain: 1.0,
                pan: 0.0,
                variables: HashMap::new(),
                rpc_volume: 1.0,
                rpc_pitch: 1.0,
                fade: None,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, CueInner> {
        self.inner.lock().unwrap_or_else(|e| {
            warn!("cue '{}' mutex poisoned, recovering", self.name);
            e.into_inner()
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index of the sound this instance plays
    pub fn sound_index(&self) -> usize {
        self.sound
    }

    pub fn category(&self) -> usize {
        self.category
    }

    pub fn state(&self) -> CueState {
        self.lock().state
    }

    pub fn is_finished(&self) -> bool {
        self.state() == CueState::Stopped
    }

    /// Start playback
    ///
    /// Events due at time zero fire before this returns. Returns `false` if
    /// the cue was already started.
    pub fn play(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != CueState::Idle {
            return false;
        }
        inner.state = CueState::Playing;
        for track in &mut inner.tracks {
            track.play(&*self.rng);
            track.update(0.0, &*self.rng, &self.waves);
        }
        trace!("cue '{}' playing sound {}", self.name, self.sound);
        true
    }

    /// Stop now, or fade out over [`super::STOP_FADE_SECONDS`]
    ///
    /// Stopping a stopped cue does nothing.
    pub fn stop(&self, immediate: bool) {
        let mut inner = self.lock();
        match inner.state {
            CueState::Stopped => {}
            CueState::Idle => inner.state = CueState::Stopped,
            _ if immediate => Self::finish(&mut inner),
            CueState::Stopping => {}
            _ => {
                inner.state = CueState::Stopping;
                inner.fade = Some(Fade::new());
            }
        }
    }

    fn finish(inner: &mut CueInner) {
        for track in &mut inner.tracks {
            track.stop();
        }
        inner.fade = None;
        inner.state = CueState::Stopped;
    }

    pub fn pause(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != CueState::Playing {
            return false;
        }
        inner.state = CueState::Paused;
        for track in &mut inner.tracks {
            track.pause();
        }
        true
    }

    pub fn resume(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != CueState::Paused {
            return false;
        }
        inner.state = CueState::Playing;
        for track in &mut inner.tracks {
            track.resume();
        }
        true
    }

    pub fn set_volume(&self, volume: f32) {
        self.lock().volume = volume.max(0.0);
    }

    pub fn volume(&self) -> f32 {
        self.lock().volume
    }

    /// Playback rate multiplier
    pub fn set_pitch(&self, pitch: f32) {
        self.lock().pitch = pitch.max(0.0);
    }

    pub fn pitch(&self) -> f32 {
        self.lock().pitch
    }

    /// Set a cue-local variable, shadowing the engine global of the same name
    pub fn set_variable(&self, name: &str, value: f32) {
        self.lock().variables.insert(name.to_string(), value);
    }

    pub fn variable(&self, name: &str) -> Option<f32> {
        self.lock().variables.get(name).copied()
    }

    /// Positional attenuation and pan in `[-1, 1]`
    pub fn set_spatial(&self, gain: f32, pan: f32) {
        let mut inner = self.lock();
        inner.spatial_gain = gain.clamp(0.0, 1.0);
        inner.pan = pan.clamp(-1.0, 1.0);
    }

    pub fn track_count(&self) -> usize {
        self.lock().tracks.len()
    }

    pub fn track_snapshot(&self, index: usize) -> Option<TrackSnapshot> {
        let inner = self.lock();
        let track = inner.tracks.get(index)?;
        Some(TrackSnapshot {
            volume: track.volume(),
            base_volume: track.base_volume(),
            pitch: track.pitch(),
            wave: track.wave().map(|w| w.wave_index()),
            events: track.events().iter().map(|e| e.state()).collect(),
        })
    }

    /// Advance by `dt` seconds
    ///
    /// `globals` supplies variables this cue has not set itself.
    pub fn update(&self, dt: f64, globals: &HashMap<String, f32>) {
        let mut inner = self.lock();
        match inner.state {
            CueState::Playing | CueState::Stopping => {}
            _ => return,
        }
        if inner.fade.is_some_and(|f| f.is_complete()) {
            Self::finish(&mut inner);
            trace!("cue '{}' faded out", self.name);
            return;
        }

        let (rpc_volume, rpc_pitch) = self.evaluate_rpcs(&inner.variables, globals);
        inner.rpc_volume = rpc_volume;
        inner.rpc_pitch = rpc_pitch;

        for track in &mut inner.tracks {
            track.update(dt, &*self.rng, &self.waves);
        }
        if let Some(fade) = &mut inner.fade {
            fade.advance(dt);
        }
        if inner.state == CueState::Playing && inner.tracks.iter().all(|t| t.is_finished()) {
            inner.state = CueState::Stopped;
            trace!("cue '{}' finished", self.name);
        }
    }

    fn evaluate_rpcs(
        &self,
        locals: &HashMap<String, f32>,
        globals: &HashMap<String, f32>,
    ) -> (f32, f32) {
        let mut volume = 1.0;
        let mut pitch = 1.0;
        let Some(def) = self.sounds.sounds.get(self.sound) else {
            return (volume, pitch);
        };
        for rpc in &def.rpcs {
            // Unset variables leave the parameter alone
            let Some(&x) = locals.get(&rpc.variable).or_else(|| globals.get(&rpc.variable))
            else {
                continue;
            };
            let factor = rpc.evaluate(x);
            match rpc.parameter {
                RpcParameter::Volume => volume *= factor.max(0.0),
                RpcParameter::Pitch => pitch *= factor.max(0.0),
            }
        }
        (volume, pitch)
    }

    /// Mix into interleaved stereo `out`
    pub fn render(&self, out: &mut [f32], sample_rate: u32, category_volume: f32) {
        let mut inner = self.lock();
        match inner.state {
            CueState::Playing | CueState::Stopping => {}
            _ => return,
        }
        let Some(def) = self.sounds.sounds.get(self.sound) else {
            return;
        };
        let mix = TrackMix {
            sample_rate,
            gain: inner.volume
                * def.volume
                * inner.rpc_volume
                * category_volume
                * inner.spatial_gain,
            pitch: inner.pitch * def.pitch * inner.rpc_pitch,
            pan: pan_gains(inner.pan),
            ramp: inner.fade.map_or((1.0, 1.0), |f| f.block()),
        };
        for track in &mut inner.tracks {
            track.render(out, &self.waves, &mix);
        }
    }
}

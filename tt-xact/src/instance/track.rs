//! Track instances: parallel timelines inside a playing sound

use smallvec::SmallVec;
use tracing::warn;

use super::{EventAction, EventInstance, Fade, WaveInstance};
use crate::bank::{TrackDef, WaveBank};
use crate::random::XactRandom;

/// Cue-level factors applied to every track of one render block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackMix {
    pub sample_rate: u32,
    pub gain: f32,
    pub pitch: f32,
    /// Left and right gains
    pub pan: (f32, f32),
    /// Cue fade at the start and end of the block
    pub ramp: (f32, f32),
}

impl TrackMix {
    pub fn unity(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            gain: 1.0,
            pitch: 1.0,
            pan: (1.0, 1.0),
            ramp: (1.0, 1.0),
        }
    }
}

/// One playing track: its events and the wave they started
#[derive(Debug, Clone)]
pub struct TrackInstance {
    events: SmallVec<[EventInstance; 4]>,
    /// Track volume from the bank, kept apart from event-driven volume
    base_volume: f32,
    volume: f32,
    pitch: f32,
    wave: Option<WaveInstance>,
    fade: Option<Fade>,
}

impl TrackInstance {
    pub fn new(def: &TrackDef) -> Self {
        Self {
            events: def.events.iter().cloned().map(EventInstance::new).collect(),
            base_volume: def.volume,
            volume: 1.0,
            pitch: 1.0,
            wave: None,
            fade: None,
        }
    }

    /// Start every event's schedule
    pub fn play(&mut self, rng: &dyn XactRandom) -> bool {
        let mut started = false;
        for event in &mut self.events {
            started |= event.play(rng);
        }
        started
    }

    /// Advance event clocks by `dt` seconds and apply what fired
    pub fn update(&mut self, dt: f64, rng: &dyn XactRandom, waves: &WaveBank) {
        if self.fade.is_some_and(|f| f.is_complete()) {
            self.wave = None;
            self.fade = None;
        }

        // Applied in event order once every clock has advanced
        let fired: SmallVec<[EventAction; 4]> = self
            .events
            .iter_mut()
            .filter_map(|e| e.update(dt, rng))
            .collect();
        for action in fired {
            self.apply(action, waves);
        }

        if let Some(fade) = &mut self.fade {
            fade.advance(dt);
        }
        if self.wave.as_ref().is_some_and(|w| w.is_finished()) {
            self.wave = None;
            self.fade = None;
        }
    }

    fn apply(&mut self, action: EventAction, waves: &WaveBank) {
        match action {
            EventAction::PlayWave {
                wave,
                volume,
                pitch,
                looping,
            } => {
                let Some(def) = waves.waves.get(wave as usize) else {
                    warn!("play event references missing wave {}", wave);
                    return;
                };
                self.wave = Some(WaveInstance::new(wave as usize, def, looping));
                self.fade = None;
                self.volume = volume;
                self.pitch = pitch;
            }
            EventAction::Stop { immediate } => {
                if immediate {
                    self.wave = None;
                    self.fade = None;
                } else if self.wave.is_some() && self.fade.is_none() {
                    self.fade = Some(Fade::new());
                }
            }
            EventAction::SetVolume { value, relative } => {
                self.volume = if relative { self.volume * value } else { value };
            }
            EventAction::SetPitch { value, relative } => {
                self.pitch = if relative { self.pitch * value } else { value };
            }
        }
    }

    /// Mix the current wave into interleaved stereo `out`
    pub fn render(&mut self, out: &mut [f32], waves: &WaveBank, mix: &TrackMix) {
        let Some(instance) = &mut self.wave else {
            return;
        };
        let Some(wave) = waves.waves.get(instance.wave_index()) else {
            return;
        };
        if mix.sample_rate == 0 {
            return;
        }

        let (fade_from, fade_to) = self.fade.map_or((1.0, 1.0), |f| f.block());
        let level = self.base_volume * self.volume * mix.gain;
        let from = level * fade_from * mix.ramp.0;
        let to = level * fade_to * mix.ramp.1;
        let step = (self.pitch * mix.pitch).max(0.0) as f64 * wave.sample_rate as f64
            / mix.sample_rate as f64;

        instance.render(
            wave,
            out,
            step,
            (from * mix.pan.0, from * mix.pan.1),
            (to * mix.pan.0, to * mix.pan.1),
        );
    }

    pub fn pause(&mut self) {
        for event in &mut self.events {
            event.pause();
        }
    }

    pub fn resume(&mut self) {
        for event in &mut self.events {
            event.resume();
        }
    }

    pub fn stop(&mut self) {
        for event in &mut self.events {
            event.stop();
        }
        self.wave = None;
        self.fade = None;
    }

    /// All events are spent and nothing is sounding
    pub fn is_finished(&self) -> bool {
        self.wave.is_none() && self.events.iter().all(|e| e.is_done())
    }

    /// Event-driven volume, without the bank's track volume
    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn base_volume(&self) -> f32 {
        self.base_volume
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn wave(&self) -> Option<&WaveInstance> {
        self.wave.as_ref()
    }

    pub fn events(&self) -> &[EventInstance] {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::{EventDef, EventKind, LoopCount, RangedValue, Wave};
    use crate::random::SequenceRandom;
    use tt_shared::HeapMemoryManager;

    fn waves() -> WaveBank {
        let memory = HeapMemoryManager::shared();
        WaveBank {
            name: "w".to_string(),
            waves: vec![
                Wave::from_pcm8(&memory, "long", 100, &[64; 100]).unwrap(),
                Wave::from_pcm8(&memory, "short", 100, &[64; 2]).unwrap(),
            ],
        }
    }

    fn event(at: f32, kind: EventKind) -> EventDef {
        EventDef {
            timestamp: RangedValue::fixed(at),
            loop_count: LoopCount::Finite(0),
            kind,
        }
    }

    #[test]
    fn test_events_drive_volume_and_pitch() {
        let waves = waves();
        let rng = SequenceRandom::new(vec![0.0]);
        let def = TrackDef {
            volume: 0.5,
            events: vec![
                EventDef::play_wave(0, 0.8, 1.0),
                event(
                    1.0,
                    EventKind::Volume {
                        value: RangedValue::fixed(0.5),
                        relative: true,
                    },
                ),
                event(
                    2.0,
                    EventKind::Pitch {
                        value: RangedValue::fixed(2.0),
                        relative: false,
                    },
                ),
            ],
        };
        let mut track = TrackInstance::new(&def);
        assert!(track.play(&rng));
        track.update(0.0, &rng, &waves);
        assert_eq!(track.volume(), 0.8);
        assert_eq!(track.pitch(), 1.0);
        assert_eq!(track.wave().map(|w| w.wave_index()), Some(0));

        track.update(1.0, &rng, &waves);
        assert_eq!(track.volume(), 0.4);
        track.update(1.0, &rng, &waves);
        assert_eq!(track.pitch(), 2.0);
        assert_eq!(track.base_volume(), 0.5);
    }

    #[test]
    fn test_immediate_stop_silences_wave() {
        let waves = waves();
        let rng = SequenceRandom::new(vec![0.0]);
        let def = TrackDef {
            volume: 1.0,
            events: vec![
                EventDef::play_wave(0, 1.0, 1.0),
                event(0.5, EventKind::Stop { immediate: true }),
            ],
        };
        let mut track = TrackInstance::new(&def);
        track.play(&rng);
        track.update(0.0, &rng, &waves);
        assert!(!track.is_finished());
        track.update(0.5, &rng, &waves);
        assert!(track.wave().is_none());
        assert!(track.is_finished());
    }

    #[test]
    fn test_soft_stop_fades_then_drops_wave() {
        let waves = waves();
        let rng = SequenceRandom::new(vec![0.0]);
        let def = TrackDef {
            volume: 1.0,
            events: vec![
                EventDef::play_wave(0, 1.0, 1.0),
                event(0.0, EventKind::Stop { immediate: false }),
            ],
        };
        let mut track = TrackInstance::new(&def);
        track.play(&rng);
        track.update(0.02, &rng, &waves);
        assert!(track.wave().is_some());

        // The fade block ramps from full level to silence
        let mut out = vec![0.0; 4];
        track.render(&mut out, &waves, &TrackMix::unity(100));
        assert_eq!(out[0], 0.5);
        assert_eq!(out[2], 0.25);

        track.update(0.02, &rng, &waves);
        assert!(track.wave().is_none());
        assert!(track.is_finished());
    }

    #[test]
    fn test_wave_end_finishes_track() {
        let waves = waves();
        let rng = SequenceRandom::new(vec![0.0]);
        let def = TrackDef {
            volume: 1.0,
            events: vec![EventDef::play_wave(1, 1.0, 1.0)],
        };
        let mut track = TrackInstance::new(&def);
        track.play(&rng);
        track.update(0.0, &rng, &waves);

        let mut out = vec![0.0; 8];
        track.render(&mut out, &waves, &TrackMix::unity(100));
        assert_eq!(&out[..4], &[0.5, 0.5, 0.5, 0.5]);
        assert!(!track.is_finished());
        track.update(0.04, &rng, &waves);
        assert!(track.is_finished());
    }

    #[test]
    fn test_stop_event_on_silent_track_does_nothing() {
        let waves = waves();
        let rng = SequenceRandom::new(vec![0.0]);
        let def = TrackDef {
            volume: 1.0,
            events: vec![event(0.0, EventKind::Stop { immediate: false })],
        };
        let mut track = TrackInstance::new(&def);
        track.play(&rng);
        track.update(0.0, &rng, &waves);
        assert!(track.is_finished());
    }
}

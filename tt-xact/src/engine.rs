//! Cue engine: owns a bank pair and every live cue

use std::sync::Arc;

use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::bank::{SoundBank, WaveBank};
use crate::error::XactError;
use crate::instance::{CueInstance, CueState, VariationSelector};
use crate::random::SharedRandom;

/// Triggers cues from one sound bank and mixes them
///
/// The engine keeps an `Arc` to every cue it created until the cue stops.
/// A prepared cue that was never played is dropped once the caller releases
/// its handle.
pub struct XactEngine {
    sounds: Arc<SoundBank>,
    waves: Arc<WaveBank>,
    rng: SharedRandom,
    selector: VariationSelector,
    category_volumes: Vec<f32>,
    globals: HashMap<String, f32>,
    cues: Vec<Arc<CueInstance>>,
}

impl XactEngine {
    /// Pair a sound bank with its wave bank
    ///
    /// Fails if any wave, sound or category reference is out of range.
    pub fn new(
        sounds: Arc<SoundBank>,
        waves: Arc<WaveBank>,
        rng: SharedRandom,
    ) -> Result<Self, XactError> {
        sounds.validate_against(&waves)?;
        debug!(
            "xact engine ready: sound bank '{}' ({} cues), wave bank '{}' ({} waves)",
            sounds.name,
            sounds.cues.len(),
            waves.name,
            waves.waves.len()
        );
        Ok(Self {
            selector: VariationSelector::new(&sounds),
            category_volumes: vec![1.0; sounds.categories.len()],
            sounds,
            waves,
            rng,
            globals: HashMap::new(),
            cues: Vec::new(),
        })
    }

    pub fn sound_bank(&self) -> &Arc<SoundBank> {
        &self.sounds
    }

    pub fn wave_bank(&self) -> &Arc<WaveBank> {
        &self.waves
    }

    /// Create an idle instance of the named cue
    pub fn prepare_cue(&mut self, name: &str) -> Result<Arc<CueInstance>, XactError> {
        let index = self
            .sounds
            .cue_index(name)
            .ok_or_else(|| XactError::UnknownCue(name.to_string()))?;
        self.prepare_cue_index(index)
    }

    /// Create an idle instance of the cue at `index`
    ///
    /// Picks the variation now, so preparing advances ordered and shuffled
    /// cues.
    pub fn prepare_cue_index(&mut self, index: usize) -> Result<Arc<CueInstance>, XactError> {
        let name = self
            .sounds
            .cues
            .get(index)
            .map(|cue| cue.name.clone())
            .ok_or(XactError::InvalidCueIndex(index))?;
        let sound = self
            .selector
            .select(&self.sounds, index, &*self.rng)
            .ok_or(XactError::EmptyCue(index))?;
        let cue = Arc::new(CueInstance::new(
            &name,
            sound as usize,
            self.sounds.clone(),
            self.waves.clone(),
            self.rng.clone(),
        )?);
        self.cues.push(cue.clone());
        Ok(cue)
    }

    /// Prepare and start the named cue
    pub fn play_cue(&mut self, name: &str) -> Result<Arc<CueInstance>, XactError> {
        let cue = self.prepare_cue(name)?;
        cue.play();
        Ok(cue)
    }

    pub fn play_cue_index(&mut self, index: usize) -> Result<Arc<CueInstance>, XactError> {
        let cue = self.prepare_cue_index(index)?;
        cue.play();
        Ok(cue)
    }

    /// Advance every live cue by `dt` seconds and drop the finished ones
    pub fn update(&mut self, dt: f64) {
        for cue in &self.cues {
            cue.update(dt, &self.globals);
        }
        self.cues.retain(|cue| match cue.state() {
            CueState::Stopped => false,
            CueState::Idle => Arc::strong_count(cue) > 1,
            _ => true,
        });
    }

    /// Mix every live cue into interleaved stereo `out`
    pub fn render(&mut self, out: &mut [f32], sample_rate: u32) {
        for cue in &self.cues {
            let volume = self
                .category_volumes
                .get(cue.category())
                .copied()
                .unwrap_or(1.0);
            cue.render(out, sample_rate, volume);
        }
    }

    /// Set a category volume by name; `false` if the bank has no such category
    pub fn set_category_volume(&mut self, category: &str, volume: f32) -> bool {
        match self.sounds.category_index(category) {
            Some(index) => self.set_category_volume_index(index, volume),
            None => {
                warn!("unknown sound category '{}'", category);
                false
            }
        }
    }

    pub fn set_category_volume_index(&mut self, index: usize, volume: f32) -> bool {
        let Some(slot) = self.category_volumes.get_mut(index) else {
            return false;
        };
        *slot = volume.max(0.0);
        true
    }

    pub fn category_volume(&self, index: usize) -> Option<f32> {
        self.category_volumes.get(index).copied()
    }

    /// Set a variable seen by every cue that has not set its own
    pub fn set_global_variable(&mut self, name: &str, value: f32) {
        self.globals.insert(name.to_string(), value);
    }

    pub fn global_variable(&self, name: &str) -> Option<f32> {
        self.globals.get(name).copied()
    }

    pub fn stop_all(&mut self, immediate: bool) {
        for cue in &self.cues {
            cue.stop(immediate);
        }
    }

    /// Cues created and not yet reaped
    pub fn live_cue_count(&self) -> usize {
        self.cues.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::{
        CueDef, EventDef, EventKind, LoopCount, RangedValue, SoundDef, TrackDef, Variation,
        VariationMode, Wave, sound_bank_from_bytes, write_sound_bank,
    };
    use crate::random::{PcgRandom, SequenceRandom};
    use tt_shared::HeapMemoryManager;

    fn waves() -> Arc<WaveBank> {
        let memory = HeapMemoryManager::shared();
        Arc::new(WaveBank {
            name: "waves".to_string(),
            waves: vec![
                Wave::from_pcm16(&memory, "tone", 100, &[16384; 200]).unwrap(),
                Wave::from_pcm8(&memory, "blip", 100, &[32; 10]).unwrap(),
            ],
        })
    }

    fn one_shot(name: &str, wave: u16, volume: f32) -> SoundDef {
        SoundDef::new(
            name,
            vec![TrackDef {
                volume: 1.0,
                events: vec![EventDef::play_wave(wave, volume, 1.0)],
            }],
        )
    }

    fn sounds() -> SoundBank {
        let mut blip = one_shot("blip", 1, 1.0);
        blip.category = 1;
        SoundBank::new(
            "sounds",
            vec!["Default".to_string(), "Reverb".to_string()],
            vec![
                CueDef::single("tone", 0),
                CueDef::single("blip", 1),
                CueDef {
                    name: "either".to_string(),
                    mode: VariationMode::Ordered,
                    variations: vec![
                        Variation {
                            sound: 1,
                            weight: 1.0,
                        },
                        Variation {
                            sound: 0,
                            weight: 1.0,
                        },
                    ],
                },
            ],
            vec![one_shot("tone", 0, 0.8), blip],
        )
    }

    fn engine() -> XactEngine {
        XactEngine::new(Arc::new(sounds()), waves(), PcgRandom::shared(1)).unwrap()
    }

    #[test]
    fn test_fixed_volume_is_applied_exactly() {
        // Round-trip the bank through its file format first
        let bytes = write_sound_bank(&sounds(), false);
        let bank = sound_bank_from_bytes(&bytes, false).unwrap();
        let rng = SequenceRandom::new(vec![0.37]);
        let rng: SharedRandom = Arc::new(rng);
        let mut engine = XactEngine::new(Arc::new(bank), waves(), rng.clone()).unwrap();

        let cue = engine.play_cue("tone").unwrap();
        let track = cue.track_snapshot(0).unwrap();
        assert_eq!(track.volume, 0.8);
        assert_eq!(track.pitch, 1.0);
        assert_eq!(track.wave, Some(0));
        // Fixed values never reach the generator
        assert_eq!(rng.next_f32(), 0.37);
    }

    #[test]
    fn test_unknown_cue() {
        let mut engine = engine();
        assert_eq!(
            engine.play_cue("missing").unwrap_err(),
            XactError::UnknownCue("missing".to_string())
        );
        assert_eq!(
            engine.prepare_cue_index(9).unwrap_err(),
            XactError::InvalidCueIndex(9)
        );
    }

    #[test]
    fn test_bad_wave_reference_rejected() {
        let mut bank = sounds();
        bank.sounds[0].tracks[0].events[0] = EventDef::play_wave(5, 1.0, 1.0);
        assert!(matches!(
            XactEngine::new(Arc::new(bank), waves(), PcgRandom::shared(1)),
            Err(XactError::InvalidWaveIndex { wave: 5, .. })
        ));
    }

    #[test]
    fn test_render_mixes_and_reaps() {
        let mut engine = engine();
        engine.play_cue("tone").unwrap();
        engine.play_cue("blip").unwrap();
        assert_eq!(engine.live_cue_count(), 2);

        let mut out = vec![0.0; 2];
        engine.render(&mut out, 100);
        // 0.5 * 0.8 + 0.25
        assert_eq!(out, vec![0.65, 0.65]);

        for _ in 0..20 {
            let mut block = vec![0.0; 20];
            engine.render(&mut block, 100);
            engine.update(0.1);
        }
        assert_eq!(engine.live_cue_count(), 0);
    }

    #[test]
    fn test_category_volume() {
        let mut engine = engine();
        assert!(engine.set_category_volume("Reverb", 0.5));
        assert!(!engine.set_category_volume("Music", 0.5));
        assert_eq!(engine.category_volume(1), Some(0.5));

        engine.play_cue("blip").unwrap();
        let mut out = vec![0.0; 2];
        engine.render(&mut out, 100);
        assert_eq!(out, vec![0.125, 0.125]);
    }

    #[test]
    fn test_unplayed_cue_reaped_after_release() {
        let mut engine = engine();
        let cue = engine.prepare_cue("tone").unwrap();
        engine.update(0.1);
        assert_eq!(engine.live_cue_count(), 1);
        assert_eq!(cue.state(), CueState::Idle);
        drop(cue);
        engine.update(0.1);
        assert_eq!(engine.live_cue_count(), 0);
    }

    #[test]
    fn test_ordered_variations_alternate() {
        let mut engine = engine();
        let first = engine.prepare_cue("either").unwrap();
        let second = engine.prepare_cue("either").unwrap();
        let third = engine.prepare_cue("either").unwrap();
        assert_eq!(first.sound_index(), 1);
        assert_eq!(second.sound_index(), 0);
        assert_eq!(third.sound_index(), 1);
        assert_eq!(first.name(), "either");
    }

    #[test]
    fn test_stop_all() {
        let mut engine = engine();
        let tone = engine.play_cue("tone").unwrap();
        engine.stop_all(false);
        assert_eq!(tone.state(), CueState::Stopping);
        engine.update(0.02);
        engine.update(0.02);
        assert!(tone.is_finished());
        assert_eq!(engine.live_cue_count(), 0);
    }

    #[test]
    fn test_shared_random_bounds() {
        let mut bank = sounds();
        bank.sounds[0].tracks[0].events[0] = EventDef {
            timestamp: RangedValue::fixed(0.0),
            loop_count: LoopCount::Finite(0),
            kind: EventKind::PlayWave {
                wave: 0,
                volume: RangedValue::range(0.25, 0.75),
                pitch: RangedValue::range(0.5, 1.5),
                looping: false,
            },
        };
        let rng = Arc::new(SequenceRandom::new(vec![0.0, 0.5, 0.999, 0.25]));
        let mut engine = XactEngine::new(Arc::new(bank), waves(), rng.clone()).unwrap();

        let low = engine.play_cue("tone").unwrap().track_snapshot(0).unwrap();
        assert_eq!((low.volume, low.pitch), (0.25, 1.0));
        let high = engine.play_cue("tone").unwrap().track_snapshot(0).unwrap();
        assert!(high.volume < 0.75 && high.volume > 0.74);
        assert_eq!(high.pitch, 0.75);
        assert_eq!(rng.draws(), 4);
    }

    #[test]
    fn test_global_variable() {
        let mut engine = engine();
        engine.set_global_variable("speed", 2.0);
        assert_eq!(engine.global_variable("speed"), Some(2.0));
        assert_eq!(engine.global_variable("other"), None);
    }
}

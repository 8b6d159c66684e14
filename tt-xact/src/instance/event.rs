//! Event instances: one timeline entry of a playing track

use crate::bank::{EventDef, EventKind};
use crate::random::XactRandom;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    Idle,
    Playing,
    Paused,
    /// Terminal: stopped explicitly or out of fires
    Stopped,
}

/// Effect of a fired event, applied by the owning track
///
/// Ranged values are already drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventAction {
    PlayWave {
        wave: u16,
        volume: f32,
        pitch: f32,
        looping: bool,
    },
    Stop {
        immediate: bool,
    },
    SetVolume {
        value: f32,
        relative: bool,
    },
    SetPitch {
        value: f32,
        relative: bool,
    },
}

/// Live counterpart of an [`EventDef`]
///
/// The event keeps its own clock, advanced only while playing, so a pause
/// shifts every later fire by exactly the paused time. `remaining` counts
/// fires left: `None` repeats forever, `Some(0)` is exhausted.
#[derive(Debug, Clone)]
pub struct EventInstance {
    def: EventDef,
    state: EventState,
    remaining: Option<u32>,
    clock: f64,
    next_start: f64,
}

impl EventInstance {
    pub fn new(def: EventDef) -> Self {
        let remaining = def.loop_count.total_fires();
        Self {
            def,
            state: EventState::Idle,
            remaining,
            clock: 0.0,
            next_start: 0.0,
        }
    }

    /// Schedule the first fire
    ///
    /// Returns `false` without touching the schedule unless the event is idle.
    pub fn play(&mut self, rng: &dyn XactRandom) -> bool {
        if self.state != EventState::Idle {
            return false;
        }
        self.remaining = self.def.loop_count.total_fires();
        self.next_start = self.clock + self.timestamp(rng) as f64;
        self.state = EventState::Playing;
        true
    }

    /// Advance the clock by `dt` seconds, returning the effect if the event
    /// fired
    ///
    /// Fires at most once per call; a repeat delay shorter than `dt` is
    /// picked up by the next update.
    pub fn update(&mut self, dt: f64, rng: &dyn XactRandom) -> Option<EventAction> {
        if self.state != EventState::Playing {
            return None;
        }
        self.clock += dt.max(0.0);
        if self.clock < self.next_start {
            return None;
        }
        if self.remaining == Some(0) {
            self.state = EventState::Stopped;
            return None;
        }

        let action = self.fire(rng);
        if let Some(remaining) = &mut self.remaining {
            *remaining -= 1;
        }
        if self.remaining == Some(0) {
            self.state = EventState::Stopped;
        } else {
            self.next_start = self.clock + self.timestamp(rng) as f64;
        }
        Some(action)
    }

    pub fn pause(&mut self) -> bool {
        if self.state != EventState::Playing {
            return false;
        }
        self.state = EventState::Paused;
        true
    }

    pub fn resume(&mut self) -> bool {
        if self.state != EventState::Paused {
            return false;
        }
        self.state = EventState::Playing;
        true
    }

    pub fn stop(&mut self) {
        self.state = EventState::Stopped;
    }

    pub fn state(&self) -> EventState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == EventState::Stopped
    }

    pub fn remaining(&self) -> Option<u32> {
        self.remaining
    }

    /// Clock time of the next fire
    pub fn next_start(&self) -> f64 {
        self.next_start
    }

    /// Seconds this event has spent playing
    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn def(&self) -> &EventDef {
        &self.def
    }

    fn timestamp(&self, rng: &dyn XactRandom) -> f32 {
        self.def.timestamp.sample(rng).max(0.0)
    }

    fn fire(&self, rng: &dyn XactRandom) -> EventAction {
        match &self.def.kind {
            EventKind::PlayWave {
                wave,
                volume,
                pitch,
                looping,
            } => EventAction::PlayWave {
                wave: *wave,
                volume: volume.sample(rng),
                pitch: pitch.sample(rng),
                looping: *looping,
            },
            EventKind::Stop { immediate } => EventAction::Stop {
                immediate: *immediate,
            },
            EventKind::Volume { value, relative } => EventAction::SetVolume {
                value: value.sample(rng),
                relative: *relative,
            },
            EventKind::Pitch { value, relative } => EventAction::SetPitch {
                value: value.sample(rng),
                relative: *relative,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::{LoopCount, RangedValue};
    use crate::random::{PcgRandom, SequenceRandom};

    fn volume_event(timestamp: RangedValue, loop_count: LoopCount) -> EventDef {
        EventDef {
            timestamp,
            loop_count,
            kind: EventKind::Volume {
                value: RangedValue::fixed(0.5),
                relative: false,
            },
        }
    }

    #[test]
    fn test_play_twice_is_a_no_op() {
        let rng = PcgRandom::new(7);
        let mut event =
            EventInstance::new(volume_event(RangedValue::range(1.0, 2.0), LoopCount::Finite(3)));
        assert!(event.play(&rng));
        let next_start = event.next_start();
        let remaining = event.remaining();

        assert!(!event.play(&rng));
        assert_eq!(event.next_start(), next_start);
        assert_eq!(event.remaining(), remaining);
        assert_eq!(event.state(), EventState::Playing);
    }

    #[test]
    fn test_pause_shifts_fire_time_by_paused_duration() {
        let rng = SequenceRandom::new(vec![0.0]);
        let mut event =
            EventInstance::new(volume_event(RangedValue::fixed(5.0), LoopCount::Finite(0)));
        assert!(event.play(&rng));
        assert_eq!(event.next_start(), 5.0);

        let mut now = 0.0;
        let mut fired_at = None;
        while now < 10.0 && fired_at.is_none() {
            if now == 2.0 {
                assert!(event.pause());
            }
            if now == 4.0 {
                assert!(event.resume());
                // Resuming keeps the schedule
                assert_eq!(event.next_start(), 5.0);
            }
            now += 0.5;
            if event.update(0.5, &rng).is_some() {
                fired_at = Some(now);
            }
        }
        assert_eq!(fired_at, Some(7.0));
        assert_eq!(event.clock(), 5.0);
        assert_eq!(rng.draws(), 0);
    }

    #[test]
    fn test_finite_zero_fires_once() {
        let rng = SequenceRandom::new(vec![0.0]);
        let mut event =
            EventInstance::new(volume_event(RangedValue::fixed(0.0), LoopCount::Finite(0)));
        event.play(&rng);
        assert_eq!(event.remaining(), Some(1));
        assert!(event.update(0.0, &rng).is_some());
        assert_eq!(event.remaining(), Some(0));
        assert!(event.is_done());
        assert!(event.update(1.0, &rng).is_none());
    }

    #[test]
    fn test_finite_count_repeats() {
        let rng = SequenceRandom::new(vec![0.0]);
        let mut event =
            EventInstance::new(volume_event(RangedValue::fixed(1.0), LoopCount::Finite(2)));
        event.play(&rng);
        let fires = (0..10)
            .filter(|_| event.update(1.0, &rng).is_some())
            .count();
        assert_eq!(fires, 3);
        assert!(event.is_done());
    }

    #[test]
    fn test_infinite_keeps_firing() {
        let rng = SequenceRandom::new(vec![0.0]);
        let mut event =
            EventInstance::new(volume_event(RangedValue::fixed(0.25), LoopCount::Infinite));
        event.play(&rng);
        let fires = (0..100)
            .filter(|_| event.update(0.25, &rng).is_some())
            .count();
        assert_eq!(fires, 100);
        assert_eq!(event.remaining(), None);
        assert_eq!(event.state(), EventState::Playing);
    }

    #[test]
    fn test_stop_is_terminal_and_idempotent() {
        let rng = SequenceRandom::new(vec![0.0]);
        let mut event =
            EventInstance::new(volume_event(RangedValue::fixed(1.0), LoopCount::Infinite));
        event.play(&rng);
        event.stop();
        event.stop();
        assert!(event.is_done());
        assert!(!event.play(&rng));
        assert!(!event.resume());
        assert!(event.update(5.0, &rng).is_none());
    }

    #[test]
    fn test_random_values_stay_in_range() {
        let rng = SequenceRandom::new(vec![0.0, 0.999, 0.5, 0.25]);
        let def = EventDef {
            timestamp: RangedValue::range(0.0, 0.1),
            loop_count: LoopCount::Infinite,
            kind: EventKind::PlayWave {
                wave: 0,
                volume: RangedValue::range(0.5, 1.0),
                pitch: RangedValue::range(0.8, 1.2),
                looping: false,
            },
        };
        let mut event = EventInstance::new(def);
        event.play(&rng);
        for _ in 0..50 {
            if let Some(EventAction::PlayWave { volume, pitch, .. }) = event.update(0.1, &rng) {
                assert!((0.5..=1.0).contains(&volume));
                assert!((0.8..=1.2).contains(&pitch));
            }
        }
        assert!(event.next_start() - event.clock() <= 0.1);
    }
}

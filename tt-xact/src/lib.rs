//! XACT-style cue runtime
//!
//! Named cues pick a sound from a [`SoundBank`]; a sound is a set of parallel
//! tracks whose timelines of play, stop, volume and pitch events start waves
//! from a [`WaveBank`].
//!
//! - [`bank`] - static bank definitions and their binary format
//! - [`instance`] - live cue, track, event and wave state
//! - [`XactEngine`] - triggers cues, updates and mixes them
//! - [`XactRandom`] - injectable randomness shared by the engine and its cues

pub mod bank;
mod engine;
mod error;
pub mod instance;
mod random;

pub use bank::{
    CueDef, EventDef, EventKind, LoopCount, LoopRegion, RangedValue, RpcCurve, RpcParameter,
    SoundBank, SoundDef, TrackDef, Variation, VariationMode, Wave, WaveBank, WaveFormat,
};
pub use engine::XactEngine;
pub use error::XactError;
pub use instance::{CueInstance, CueState, STOP_FADE_SECONDS};
pub use random::{PcgRandom, SequenceRandom, SharedRandom, XactRandom};

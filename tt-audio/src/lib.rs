//! Playback side of the tt audio core
//!
//! Turns the data crates into sound:
//!
//! - [`player`] - XM tracker playback ([`XmPlayer`])
//! - [`Mixer`] and [`AudioSource`] - block mixing with music and effect buses
//! - [`audio_thread`] - the mixer on its own thread feeding a lock-free ring
//! - [`output`] - sample formats and ring draining for the output callback
//! - [`MusicPlayer`] / [`SoundPlayer`] - front doors for songs and cues
//! - [`AudioConfig`] - TOML configuration
//!
//! Everything renders interleaved stereo `f32`.

pub mod audio_thread;
mod config;
mod error;
pub mod mixing;
mod music;
pub mod output;
pub mod player;
mod sound;
mod source;

pub use audio_thread::{ConsumerWaker, MixerCommand, MixerHandle, MixerThread};
pub use config::{
    AudioConfig, MAX_BUFFER_FRAMES, MAX_SAMPLE_RATE, MIN_BUFFER_FRAMES, MIN_SAMPLE_RATE,
};
pub use error::AudioError;
pub use music::MusicPlayer;
pub use output::{OutputBuffer, SampleType};
pub use player::{PlaybackPosition, PlayerState, XmPlayer};
pub use sound::{
    CueSource, DEFAULT_MAX_DISTANCE, DEFAULT_MIN_DISTANCE, Listener, SoundPlayer, Vec3, spatialize,
};
pub use source::{AudioSource, Mixer, SharedPlayer, SharedSource};

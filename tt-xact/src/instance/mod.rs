//! Runtime instances of bank objects
//!
//! A [`CueInstance`] owns one [`TrackInstance`] per track of the sound it
//! plays; each track owns one [`EventInstance`] per event definition and at
//! most one playing [`WaveInstance`]. Children never point back at their
//! parent: events report what they fired as an [`EventAction`] and the owning
//! track applies it.

mod cue;
mod event;
mod track;
mod variation;
mod wave;

pub use cue::{CueInstance, CueState, TrackSnapshot};
pub use event::{EventAction, EventInstance, EventState};
pub use track::{TrackInstance, TrackMix};
pub use variation::VariationSelector;
pub use wave::WaveInstance;

/// Length of the fade applied by a non-immediate stop
pub const STOP_FADE_SECONDS: f64 = 0.01;

/// Linear fade to silence over [`STOP_FADE_SECONDS`]
///
/// `advance` is called once per update with the block length; `block` then
/// gives the gain at the start and end of the block about to be rendered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Fade {
    remaining: f64,
    block: (f32, f32),
}

impl Fade {
    pub(crate) fn new() -> Self {
        Self {
            remaining: STOP_FADE_SECONDS,
            block: (1.0, 1.0),
        }
    }

    pub(crate) fn advance(&mut self, dt: f64) {
        let from = self.gain();
        self.remaining = (self.remaining - dt.max(0.0)).max(0.0);
        self.block = (from, self.gain());
    }

    pub(crate) fn gain(&self) -> f32 {
        (self.remaining / STOP_FADE_SECONDS) as f32
    }

    pub(crate) fn block(&self) -> (f32, f32) {
        self.block
    }

    /// The last rendered block already reached silence
    pub(crate) fn is_complete(&self) -> bool {
        self.remaining <= 0.0
    }
}

/// Left and right gains for `pan` in `[-1, 1]`
///
/// The near side stays at unity and the far side falls off along a quarter
/// sine, so a centered cue plays at full level on both sides.
pub(crate) fn pan_gains(pan: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    let far = |amount: f32| (std::f32::consts::FRAC_PI_2 * (1.0 - amount)).sin();
    if pan < 0.0 {
        (1.0, far(-pan))
    } else {
        (far(pan), 1.0)
    }
}

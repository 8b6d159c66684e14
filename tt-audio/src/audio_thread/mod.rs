//! Threaded mixing
//!
//! Moves block mixing off the caller's thread. The mixer thread renders the
//! [`Mixer`](crate::Mixer) one block at a time into a lock-free ring; the
//! output side drains the ring at its own pace and wakes the thread when it
//! has made room.
//!
//! # Architecture
//!
//! ```text
//! Control Thread              Mixer Thread                Output
//!     │                            │                         │
//! [MixerCommand]──(channel)──►[Apply]                        │
//!     │                        [Render block]                │
//!     │                        [Push]───────(ring)───────►[drain_ring]
//!     │                            ◄────────(condvar)───────[notify]
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let (handle, mut consumer) = MixerThread::spawn(&config, Mixer::new(&config))?;
//! handle.play_music(music.shared());
//!
//! // In the output callback
//! drain_ring(&mut consumer, &mut out, &mut scratch);
//! waker.notify();
//! ```

mod handle;
mod metrics;
mod thread;

pub use handle::{ConsumerWaker, MixerCommand, MixerHandle};
pub use thread::MixerThread;

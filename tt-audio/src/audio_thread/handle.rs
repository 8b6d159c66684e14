//! Handle for commanding the mixer thread and shutting it down

use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::source::{SharedPlayer, SharedSource};

/// Control messages for the mixer thread
pub enum MixerCommand {
    /// Route a player to the music bus and start it from the top
    PlayMusic(SharedPlayer),
    /// Stop the music player and clear the music bus
    StopMusic,
    PauseMusic,
    ResumeMusic,
    SetMusicVolume(f32),
    SetMasterVolume(f32),
    /// Add a source to the effects bus
    AddSource(SharedSource),
}

impl std::fmt::Debug for MixerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PlayMusic(_) => f.write_str("PlayMusic"),
            Self::StopMusic => f.write_str("StopMusic"),
            Self::PauseMusic => f.write_str("PauseMusic"),
            Self::ResumeMusic => f.write_str("ResumeMusic"),
            Self::SetMusicVolume(v) => f.debug_tuple("SetMusicVolume").field(v).finish(),
            Self::SetMasterVolume(v) => f.debug_tuple("SetMasterVolume").field(v).finish(),
            Self::AddSource(_) => f.write_str("AddSource"),
        }
    }
}

pub(super) type Wakeup = Arc<(Mutex<bool>, Condvar)>;

/// Wakes the mixer thread after the output side has drained samples
///
/// Cheap to clone into an output callback. `notify` never blocks.
#[derive(Clone)]
pub struct ConsumerWaker(pub(super) Wakeup);

impl ConsumerWaker {
    pub fn notify(&self) {
        let (_lock, cvar) = &*self.0;
        cvar.notify_one();
    }
}

/// Handle to the mixer thread
///
/// Returned from `MixerThread::spawn()`. Dropping it stops the thread and
/// waits for it to exit.
pub struct MixerHandle {
    /// Option so the sender can be dropped before joining
    pub(super) tx: Option<SyncSender<MixerCommand>>,
    pub(super) handle: Option<JoinHandle<()>>,
    pub(super) wakeup: Wakeup,
}

impl MixerHandle {
    /// Queue a command without blocking
    ///
    /// Returns `false` if the queue is full or the thread has gone.
    pub fn send(&self, command: MixerCommand) -> bool {
        let Some(ref tx) = self.tx else {
            warn!("mixer thread sender already dropped");
            return false;
        };
        match tx.try_send(command) {
            Ok(()) => {
                self.notify_consumed();
                true
            }
            Err(TrySendError::Full(command)) => {
                debug!("mixer command queue full, dropping {:?}", command);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("mixer thread disconnected");
                false
            }
        }
    }

    pub fn play_music(&self, player: SharedPlayer) -> bool {
        self.send(MixerCommand::PlayMusic(player))
    }

    pub fn stop_music(&self) -> bool {
        self.send(MixerCommand::StopMusic)
    }

    pub fn pause_music(&self) -> bool {
        self.send(MixerCommand::PauseMusic)
    }

    pub fn resume_music(&self) -> bool {
        self.send(MixerCommand::ResumeMusic)
    }

    pub fn set_music_volume(&self, volume: f32) -> bool {
        self.send(MixerCommand::SetMusicVolume(volume))
    }

    pub fn set_master_volume(&self, volume: f32) -> bool {
        self.send(MixerCommand::SetMasterVolume(volume))
    }

    pub fn add_source(&self, source: SharedSource) -> bool {
        self.send(MixerCommand::AddSource(source))
    }

    /// Tell the thread the consumer freed ring space
    pub fn notify_consumed(&self) {
        let (_lock, cvar) = &*self.wakeup;
        cvar.notify_one();
    }

    pub fn waker(&self) -> ConsumerWaker {
        ConsumerWaker(Arc::clone(&self.wakeup))
    }

    pub fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for MixerHandle {
    fn drop(&mut self) {
        // The sender goes first: the thread exits when its receiver
        // disconnects, so joining with the sender alive would deadlock
        drop(self.tx.take());
        self.notify_consumed();

        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("mixer thread panicked");
        }
    }
}

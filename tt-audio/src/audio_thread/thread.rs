//! Mixer thread implementation

use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use ringbuf::traits::{Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{debug, trace, warn};

use crate::config::AudioConfig;
use crate::error::AudioError;
use crate::source::{Mixer, SharedPlayer};

use super::handle::{MixerCommand, MixerHandle, Wakeup};
use super::metrics::MixerMetrics;

/// Queued commands before `try_send` starts refusing
const COMMAND_QUEUE_DEPTH: usize = 8;

/// Longest sleep between checks when nobody signals the condvar
const WAIT_TIMEOUT: Duration = Duration::from_millis(1);

/// Mixer thread state
///
/// Owns the [`Mixer`] and the ring producer. Keeps the ring topped up one
/// block at a time and sleeps on the condvar in between.
pub struct MixerThread {
    rx: Receiver<MixerCommand>,
    producer: HeapProd<f32>,
    wakeup: Wakeup,
    pub(super) mixer: Mixer,
    /// One block of interleaved stereo, reused
    block: Vec<f32>,
    pub(super) metrics: MixerMetrics,
}

impl MixerThread {
    pub(super) fn new(
        rx: Receiver<MixerCommand>,
        producer: HeapProd<f32>,
        wakeup: Wakeup,
        mixer: Mixer,
        block_frames: usize,
    ) -> Self {
        let capacity = producer.capacity().get();
        Self {
            rx,
            producer,
            wakeup,
            mixer,
            block: vec![0.0; block_frames.max(1) * 2],
            metrics: MixerMetrics::new(capacity),
        }
    }

    /// Spawn the mixer thread
    ///
    /// The ring holds `ring_buffer_frames` stereo frames. The returned
    /// consumer belongs to the output side, which should call
    /// [`MixerHandle::notify_consumed`] after draining it.
    pub fn spawn(
        config: &AudioConfig,
        mixer: Mixer,
    ) -> Result<(MixerHandle, HeapCons<f32>), AudioError> {
        let config = config.clone().validated();
        let ring = HeapRb::<f32>::new(config.ring_buffer_frames * 2);
        let (producer, consumer) = ring.split();

        let (tx, rx) = mpsc::sync_channel::<MixerCommand>(COMMAND_QUEUE_DEPTH);
        let wakeup = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_wakeup = Arc::clone(&wakeup);
        let block_frames = config.buffer_frames;

        let handle = thread::Builder::new()
            .name("tt-mixer".into())
            .spawn(move || {
                let mut mixer_thread = Self::new(rx, producer, thread_wakeup, mixer, block_frames);
                mixer_thread.run();
            })
            .map_err(|e| AudioError::ThreadSpawn(e.to_string()))?;

        Ok((
            MixerHandle {
                tx: Some(tx),
                handle: Some(handle),
                wakeup,
            },
            consumer,
        ))
    }

    fn run(&mut self) {
        debug!(
            "mixer thread started: block={} samples, ring={} samples",
            self.block.len(),
            self.metrics.capacity
        );

        loop {
            if !self.drain_commands() {
                debug!("mixer thread exiting (channel disconnected)");
                break;
            }

            self.fill_ring();

            let (lock, cvar) = &*self.wakeup;
            let guard = lock.lock().unwrap_or_else(|e| {
                warn!("mixer condvar mutex poisoned; continuing");
                e.into_inner()
            });
            let _ = cvar.wait_timeout(guard, WAIT_TIMEOUT).unwrap_or_else(|e| {
                warn!("mixer condvar wait mutex poisoned; continuing");
                e.into_inner()
            });

            self.metrics.maybe_log();
        }

        debug!("mixer thread finished");
    }

    /// Apply every queued command
    ///
    /// Returns `false` once the handle has been dropped.
    pub(super) fn drain_commands(&mut self) -> bool {
        loop {
            match self.rx.try_recv() {
                Ok(command) => self.handle_command(command),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    pub(super) fn handle_command(&mut self, command: MixerCommand) {
        self.metrics.commands_received += 1;
        trace!("mixer command {:?}", command);
        match command {
            MixerCommand::PlayMusic(player) => {
                if !lock_player(&player).play() {
                    warn!("music player refused to start");
                }
                self.mixer.set_music(Some(player));
            }
            MixerCommand::StopMusic => {
                if let Some(player) = self.mixer.music() {
                    lock_player(player).stop();
                }
                self.mixer.set_music(None);
            }
            MixerCommand::PauseMusic => {
                if let Some(player) = self.mixer.music() {
                    lock_player(player).pause();
                }
            }
            MixerCommand::ResumeMusic => {
                if let Some(player) = self.mixer.music() {
                    lock_player(player).resume();
                }
            }
            MixerCommand::SetMusicVolume(volume) => self.mixer.set_music_volume(volume),
            MixerCommand::SetMasterVolume(volume) => self.mixer.set_master_volume(volume),
            MixerCommand::AddSource(source) => self.mixer.add_source(source),
        }
    }

    /// Generate blocks while a whole block fits in the ring
    pub(super) fn fill_ring(&mut self) {
        loop {
            let filled = self.producer.occupied_len();
            self.metrics.update_buffer_fill(filled);
            if self.producer.vacant_len() < self.block.len() {
                return;
            }
            if self.metrics.is_low(filled) {
                self.metrics.buffer_underruns += 1;
            }
            self.generate_block();
        }
    }

    pub(super) fn generate_block(&mut self) {
        let start = Instant::now();
        self.mixer.render(&mut self.block);

        let pushed = self.producer.push_slice(&self.block);
        if pushed < self.block.len() {
            self.metrics.buffer_overruns += 1;
            trace!(
                "mixer ring full: dropped {} samples",
                self.block.len() - pushed
            );
        }
        self.metrics
            .record_generation(start.elapsed().as_secs_f64() * 1_000_000.0, pushed);
    }
}

fn lock_player(player: &SharedPlayer) -> std::sync::MutexGuard<'_, crate::player::XmPlayer> {
    player.lock().unwrap_or_else(|e| {
        warn!("music player mutex poisoned; continuing");
        e.into_inner()
    })
}

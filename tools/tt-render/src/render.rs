//! Offline rendering through the mixer into a WAV file

use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};
use tt_audio::output::write_interleaved;
use tt_audio::{AudioConfig, Mixer, MusicPlayer, OutputBuffer, SoundPlayer};
use tt_shared::{DiskFile, HeapMemoryManager};

/// Stereo 16-bit WAV writer fed with mixed f32 blocks
struct WavSink {
    writer: hound::WavWriter<std::io::BufWriter<std::fs::File>>,
    pcm: Vec<i16>,
}

impl WavSink {
    fn create(path: &Path, sample_rate: u32) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(Self {
            writer,
            pcm: Vec::new(),
        })
    }

    fn write(&mut self, block: &[f32]) -> Result<()> {
        self.pcm.resize(block.len(), 0);
        write_interleaved(block, &mut OutputBuffer::I16(&mut self.pcm));
        for &sample in &self.pcm {
            self.writer.write_sample(sample)?;
        }
        Ok(())
    }

    fn finish(self) -> Result<()> {
        self.writer.finalize().context("Failed to finalize WAV")
    }
}

/// Pull blocks from the mixer until `seconds` or until `done` says stop
///
/// Returns the number of frames written.
fn render_blocks(
    mixer: &mut Mixer,
    config: &AudioConfig,
    seconds: f64,
    sink: &mut WavSink,
    mut done: impl FnMut() -> bool,
) -> Result<u64> {
    if !seconds.is_finite() || seconds <= 0.0 {
        bail!("--seconds must be positive");
    }
    let total = (seconds * config.sample_rate as f64).ceil() as u64;
    let mut block = vec![0.0f32; config.buffer_frames * 2];
    let mut written = 0u64;

    while written < total {
        let frames = (config.buffer_frames as u64).min(total - written) as usize;
        let block = &mut block[..frames * 2];
        mixer.render(block);
        sink.write(block)?;
        written += frames as u64;
        if done() {
            debug!("source finished after {} frames", written);
            break;
        }
    }
    Ok(written)
}

pub fn render_xm(path: &Path, output: &Path, seconds: f64, config: &AudioConfig) -> Result<u64> {
    let memory = HeapMemoryManager::shared();
    let mut io = DiskFile::new();
    let music = MusicPlayer::load(&mut io, &path.to_string_lossy(), &memory, config)
        .with_context(|| format!("Failed to load {}", path.display()))?;

    let mut mixer = Mixer::new(config);
    mixer.set_music(Some(music.shared()));
    if !music.play() {
        bail!("{} has nothing to play", path.display());
    }

    let mut sink = WavSink::create(output, config.sample_rate)?;
    let frames = render_blocks(&mut mixer, config, seconds, &mut sink, || {
        !music.is_sounding()
    })?;
    sink.finish()?;
    info!(
        "rendered '{}' to {}: {:.2}s, {} loops",
        music.module().name,
        output.display(),
        frames as f64 / config.sample_rate as f64,
        music.loop_count()
    );
    Ok(frames)
}

pub fn render_cue(
    sounds: &Path,
    waves: &Path,
    cue: &str,
    output: &Path,
    seconds: f64,
    config: &AudioConfig,
) -> Result<u64> {
    let memory = HeapMemoryManager::shared();
    let mut io = DiskFile::new();
    let mut player = SoundPlayer::new(config);
    player
        .load_banks(
            &mut io,
            &sounds.to_string_lossy(),
            &waves.to_string_lossy(),
            &memory,
        )
        .with_context(|| {
            format!(
                "Failed to load banks {} and {}",
                sounds.display(),
                waves.display()
            )
        })?;

    let mut mixer = Mixer::new(config);
    mixer.add_source(player.source());
    if player.play(cue).is_none() {
        bail!("cue '{}' could not be played", cue);
    }

    let mut sink = WavSink::create(output, config.sample_rate)?;
    let frames = render_blocks(&mut mixer, config, seconds, &mut sink, || {
        player.live_cue_count() == 0
    })?;
    sink.finish()?;
    info!(
        "rendered cue '{}' to {}: {:.2}s",
        cue,
        output.display(),
        frames as f64 / config.sample_rate as f64
    );
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tt_shared::{AllocType, Allocation, SharedMemoryManager};
    use tt_xact::bank::{write_sound_bank, write_wave_bank};
    use tt_xact::{CueDef, EventDef, SoundBank, SoundDef, TrackDef, Wave, WaveBank};
    use tt_xm::{LoopType, XmInstrument, XmModule, XmNote, XmPattern, XmSample, write_module};

    fn config() -> AudioConfig {
        AudioConfig {
            sample_rate: 8000,
            buffer_frames: 256,
            looping_music: false,
            ..Default::default()
        }
    }

    fn song(memory: &SharedMemoryManager) -> XmModule {
        let mut notes = vec![XmNote::default(); 4];
        notes[0] = XmNote {
            note: 49,
            instrument: 1,
            ..Default::default()
        };
        let sample = XmSample::new(memory, "tone", [12000, -12000].repeat(32))
            .unwrap()
            .with_loop(0, 64, LoopType::Forward);
        XmModule {
            name: "short".to_string(),
            tracker_name: String::new(),
            num_channels: 1,
            restart_position: 0,
            default_speed: 1,
            default_bpm: 125,
            linear_frequency_table: true,
            order_table: Allocation::from_vec(memory, vec![0], AllocType::SongHeader).unwrap(),
            patterns: vec![XmPattern::from_notes(memory, 4, 1, &notes).unwrap()],
            instruments: vec![XmInstrument::new(memory, "tone", vec![sample]).unwrap()],
        }
    }

    #[test]
    fn test_render_xm_stops_at_song_end() {
        let dir = tempfile::tempdir().unwrap();
        let xm = dir.path().join("short.xm");
        let wav = dir.path().join("short.wav");
        std::fs::write(&xm, write_module(&song(&HeapMemoryManager::shared()))).unwrap();

        let frames = render_xm(&xm, &wav, 10.0, &config()).unwrap();
        // Four ticks of 160 frames, rounded up to whole blocks
        assert_eq!(frames, 768);

        let reader = hound::WavReader::open(&wav).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 8000);
        assert_eq!(reader.duration(), 768);
    }

    #[test]
    fn test_render_cue_until_finished() {
        let memory = HeapMemoryManager::shared();
        let sounds = SoundBank::new(
            "sfx",
            vec!["Default".to_string()],
            vec![CueDef::single("beep", 0)],
            vec![SoundDef::new(
                "beep",
                vec![TrackDef {
                    volume: 1.0,
                    events: vec![EventDef::play_wave(0, 1.0, 1.0)],
                }],
            )],
        );
        let waves = WaveBank {
            name: "sfx".to_string(),
            waves: vec![Wave::from_pcm16(&memory, "beep", 8000, &[8000; 300]).unwrap()],
        };

        let dir = tempfile::tempdir().unwrap();
        let sb = dir.path().join("sfx.ttsb");
        let wb = dir.path().join("sfx.ttwb");
        let wav = dir.path().join("beep.wav");
        std::fs::write(&sb, write_sound_bank(&sounds, false)).unwrap();
        std::fs::write(&wb, write_wave_bank(&waves, false)).unwrap();

        let frames = render_cue(&sb, &wb, "beep", &wav, 5.0, &config()).unwrap();
        assert!(frames < 8000);
        assert!(frames >= 300);

        let mut reader = hound::WavReader::open(&wav).unwrap();
        let first: i16 = reader.samples::<i16>().next().unwrap().unwrap();
        assert!(first > 0);
    }

    #[test]
    fn test_unknown_cue_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = render_cue(
            &dir.path().join("none.ttsb"),
            &dir.path().join("none.ttwb"),
            "beep",
            &dir.path().join("out.wav"),
            1.0,
            &config(),
        );
        assert!(err.is_err());
    }
}

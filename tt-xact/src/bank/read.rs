//! Bank file loading

use tracing::{debug, warn};
use tt_shared::{AllocType, Allocation, MemoryFile, SharedMemoryManager, XmFileIo};

use super::{
    BANK_VERSION, CueDef, EventDef, EventKind, LoopCount, LoopRegion, RangedValue, RpcCurve,
    RpcParameter, SOUND_BANK_MAGIC, SoundBank, SoundDef, TrackDef, Variation, VariationMode,
    WAVE_BANK_MAGIC, Wave, WaveBank, WaveFormat,
};
use crate::error::XactError;

/// Load and validate a sound bank
///
/// Wave references are checked separately with
/// [`SoundBank::validate_against`] once the paired wave bank is loaded.
pub fn load_sound_bank(
    io: &mut dyn XmFileIo,
    path: &str,
    big_endian: bool,
) -> Result<SoundBank, XactError> {
    with_open_file(io, path, big_endian, |io| {
        let bank = read_sound_bank(io)?;
        bank.validate()?;
        debug!(
            "loaded sound bank '{}' from {}: {} cues, {} sounds, {} categories",
            bank.name,
            path,
            bank.cues.len(),
            bank.sounds.len(),
            bank.categories.len()
        );
        Ok(bank)
    })
}

/// Load and validate a wave bank, accounting wave data as
/// [`AllocType::Sample`]
pub fn load_wave_bank(
    io: &mut dyn XmFileIo,
    path: &str,
    big_endian: bool,
    memory: &SharedMemoryManager,
) -> Result<WaveBank, XactError> {
    with_open_file(io, path, big_endian, |io| {
        let bank = read_wave_bank(io, memory)?;
        debug!(
            "loaded wave bank '{}' from {}: {} waves, {} bytes",
            bank.name,
            path,
            bank.waves.len(),
            bank.waves.iter().map(|w| w.data.len()).sum::<usize>()
        );
        Ok(bank)
    })
}

pub fn sound_bank_from_bytes(data: &[u8], big_endian: bool) -> Result<SoundBank, XactError> {
    const NAME: &str = "bank.ttsb";
    let mut io = MemoryFile::single(NAME, data.to_vec());
    load_sound_bank(&mut io, NAME, big_endian)
}

pub fn wave_bank_from_bytes(
    data: &[u8],
    big_endian: bool,
    memory: &SharedMemoryManager,
) -> Result<WaveBank, XactError> {
    const NAME: &str = "bank.ttwb";
    let mut io = MemoryFile::single(NAME, data.to_vec());
    load_wave_bank(&mut io, NAME, big_endian, memory)
}

/// Open, decompress, run `read`, and close on every path
fn with_open_file<T>(
    io: &mut dyn XmFileIo,
    path: &str,
    big_endian: bool,
    read: impl FnOnce(&mut dyn XmFileIo) -> Result<T, XactError>,
) -> Result<T, XactError> {
    io.open(path, big_endian)?;
    let result = io
        .decompress()
        .map_err(XactError::from)
        .and_then(|()| read(&mut *io));
    io.close();
    if let Err(e) = &result {
        warn!("failed to load bank {}: {}", path, e);
    }
    result
}

fn read_header(io: &mut dyn XmFileIo, expected: [u8; 4]) -> Result<String, XactError> {
    let mut found = [0u8; 4];
    io.read_bytes(&mut found)?;
    if found != expected {
        return Err(XactError::InvalidMagic { expected, found });
    }
    let version = io.read_u16()?;
    if version != BANK_VERSION {
        return Err(XactError::UnsupportedVersion(version));
    }
    read_string(io)
}

fn read_sound_bank(io: &mut dyn XmFileIo) -> Result<SoundBank, XactError> {
    let name = read_header(io, SOUND_BANK_MAGIC)?;

    let category_count = io.read_u16()?;
    let categories = (0..category_count)
        .map(|_| read_string(io))
        .collect::<Result<Vec<_>, _>>()?;

    let cue_count = io.read_u16()?;
    let mut cues = Vec::with_capacity(cue_count as usize);
    for _ in 0..cue_count {
        let name = read_string(io)?;
        let mode = VariationMode::from_raw(io.read_u8()?)?;
        let variation_count = io.read_u16()?;
        let mut variations = Vec::with_capacity(variation_count as usize);
        for _ in 0..variation_count {
            variations.push(Variation {
                sound: io.read_u16()?,
                weight: io.read_f32()?,
            });
        }
        cues.push(CueDef {
            name,
            mode,
            variations,
        });
    }

    let sound_count = io.read_u16()?;
    let mut sounds = Vec::with_capacity(sound_count as usize);
    for _ in 0..sound_count {
        sounds.push(read_sound(io)?);
    }

    Ok(SoundBank::new(&name, categories, cues, sounds))
}

fn read_sound(io: &mut dyn XmFileIo) -> Result<SoundDef, XactError> {
    let name = read_string(io)?;
    let volume = io.read_f32()?;
    let pitch = io.read_f32()?;
    let category = io.read_u16()?;

    let rpc_count = io.read_u8()?;
    let mut rpcs = Vec::with_capacity(rpc_count as usize);
    for _ in 0..rpc_count {
        let variable = read_string(io)?;
        let parameter = RpcParameter::from_raw(io.read_u8()?)?;
        let point_count = io.read_u8()?;
        let mut points = Vec::with_capacity(point_count as usize);
        for _ in 0..point_count {
            points.push((io.read_f32()?, io.read_f32()?));
        }
        rpcs.push(RpcCurve {
            variable,
            parameter,
            points,
        });
    }

    let track_count = io.read_u16()?;
    let mut tracks = Vec::with_capacity(track_count as usize);
    for _ in 0..track_count {
        let volume = io.read_f32()?;
        let event_count = io.read_u16()?;
        let mut events = Vec::with_capacity(event_count as usize);
        for _ in 0..event_count {
            events.push(read_event(io)?);
        }
        tracks.push(TrackDef { volume, events });
    }

    Ok(SoundDef {
        name,
        volume,
        pitch,
        category,
        rpcs,
        tracks,
    })
}

fn read_event(io: &mut dyn XmFileIo) -> Result<EventDef, XactError> {
    let tag = io.read_u8()?;
    let timestamp = read_ranged(io)?;
    let loop_count = LoopCount::from_raw(io.read_u16()?);
    let kind = match tag {
        0 => EventKind::PlayWave {
            wave: io.read_u16()?,
            volume: read_ranged(io)?,
            pitch: read_ranged(io)?,
            looping: io.read_u8()? != 0,
        },
        1 => EventKind::Stop {
            immediate: io.read_u8()? != 0,
        },
        2 => EventKind::Volume {
            value: read_ranged(io)?,
            relative: io.read_u8()? != 0,
        },
        3 => EventKind::Pitch {
            value: read_ranged(io)?,
            relative: io.read_u8()? != 0,
        },
        other => return Err(XactError::InvalidEventKind(other)),
    };
    Ok(EventDef {
        timestamp,
        loop_count,
        kind,
    })
}

fn read_ranged(io: &mut dyn XmFileIo) -> Result<RangedValue, XactError> {
    Ok(RangedValue {
        min: io.read_f32()?,
        max: io.read_f32()?,
        random: io.read_u8()? != 0,
    })
}

fn read_wave_bank(
    io: &mut dyn XmFileIo,
    memory: &SharedMemoryManager,
) -> Result<WaveBank, XactError> {
    let name = read_header(io, WAVE_BANK_MAGIC)?;

    let wave_count = io.read_u16()?;
    let mut waves = Vec::with_capacity(wave_count as usize);
    for index in 0..wave_count as usize {
        let name = read_string(io)?;
        let format = WaveFormat::from_raw(io.read_u8()?)?;
        let sample_rate = io.read_u32()?;
        let frames = io.read_u32()?;
        let loop_start = io.read_u32()?;
        let loop_length = io.read_u32()?;
        let data_len = io.read_u32()?;

        if data_len as u64 > io.remaining() {
            return Err(XactError::InvalidWave {
                wave: index,
                reason: format!("{} data bytes past end of file", data_len),
            });
        }
        let mut data = Allocation::<u8>::zeroed(memory, data_len as usize, AllocType::Sample)?;
        io.read_bytes(data.as_mut_slice())?;

        if format == WaveFormat::Pcm16 && io.big_endian() {
            for pair in data.chunks_exact_mut(2) {
                pair.swap(0, 1);
            }
        }

        let wave = Wave {
            name,
            format,
            sample_rate,
            frames,
            data,
            loop_region: (loop_length > 0).then_some(LoopRegion {
                start: loop_start,
                length: loop_length,
            }),
        };
        wave.validate(index)?;
        waves.push(wave);
    }

    Ok(WaveBank { name, waves })
}

fn read_string(io: &mut dyn XmFileIo) -> Result<String, XactError> {
    let len = io.read_u16()?;
    let mut bytes = vec![0u8; len as usize];
    io.read_bytes(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| XactError::InvalidString(e.to_string()))
}

//! XM file loading

use tracing::{debug, warn};
use tt_shared::{AllocType, Allocation, MemoryFile, SharedMemoryManager, XmFileIo};

use crate::compressor::unpack_note;
use crate::envelope::{
    ENV_FLAG_ENABLED, ENV_FLAG_LOOP, ENV_FLAG_SUSTAIN, MAX_ENVELOPE_OFFSET, MAX_ENVELOPE_POINTS,
    XmEnvelope, pack_point,
};
use crate::error::XmError;
use crate::module::{LoopType, XmInstrument, XmModule, XmNote, XmPattern, XmSample};
use crate::{
    KEYMAP_SIZE, MAX_CHANNELS, MAX_INSTRUMENTS, MAX_PATTERN_ROWS, MAX_PATTERNS,
    MAX_SAMPLES_PER_INSTRUMENT, XM_MAGIC, XM_VERSION,
};

/// Offset of the header-size field; the header size is measured from here
const HEADER_SIZE_OFFSET: u64 = 60;

/// Instrument header bytes up to and including the sample count
const INSTRUMENT_PREAMBLE: u32 = 29;

/// Bytes of a sample header that the loader interprets
const SAMPLE_HEADER_SIZE: u32 = 40;

const SAMPLE_FLAG_16BIT: u8 = 0x10;

/// Load an XM module from `path`
///
/// The file is opened little-endian and passed through
/// [`XmFileIo::decompress`] first, so gzip/zlib wrapped modules load
/// transparently. The handle is closed again whether or not loading succeeds.
///
/// # Example
/// ```ignore
/// let mut io = DiskFile::with_root("music");
/// let module = load_module(&mut io, "song.xm", &HeapMemoryManager::shared())?;
/// println!("Loaded: {}", module.name);
/// ```
pub fn load_module(
    io: &mut dyn XmFileIo,
    path: &str,
    memory: &SharedMemoryManager,
) -> Result<XmModule, XmError> {
    io.open(path, false)?;
    let result = io
        .decompress()
        .map_err(XmError::from)
        .and_then(|()| read_module(io, memory));
    io.close();

    match &result {
        Ok(module) => debug!(
            "loaded '{}' from {}: {} channels, {} patterns, {} instruments, {} sample bytes",
            module.name,
            path,
            module.num_channels,
            module.patterns.len(),
            module.instruments.len(),
            module.sample_bytes()
        ),
        Err(e) => warn!("failed to load XM module {}: {}", path, e),
    }
    result
}

/// Load an XM module from an in-memory blob
pub fn load_module_from_bytes(
    data: &[u8],
    memory: &SharedMemoryManager,
) -> Result<XmModule, XmError> {
    const NAME: &str = "module.xm";
    let mut io = MemoryFile::single(NAME, data.to_vec());
    load_module(&mut io, NAME, memory)
}

fn read_module(io: &mut dyn XmFileIo, memory: &SharedMemoryManager) -> Result<XmModule, XmError> {
    if io.len() < HEADER_SIZE_OFFSET + 20 {
        return Err(XmError::TooSmall);
    }

    let mut magic = [0u8; 17];
    io.read_bytes(&mut magic)?;
    if &magic != XM_MAGIC {
        return Err(XmError::InvalidMagic);
    }

    let name = read_string(io, 20)?;
    // 0x1A marker
    io.skip(1)?;
    let tracker_name = read_string(io, 20)?;

    let version = io.read_u16()?;
    if version != XM_VERSION {
        return Err(XmError::UnsupportedVersion(version));
    }

    let header_start = io.position();
    let header_size = io.read_u32()?;
    let song_length = io.read_u16()?;
    let restart_position = io.read_u16()?;

    let num_channels = io.read_u16()?;
    if num_channels == 0 || num_channels > MAX_CHANNELS as u16 {
        return Err(XmError::InvalidChannelCount(num_channels));
    }
    let num_channels = num_channels as u8;

    let num_patterns = io.read_u16()?;
    if num_patterns > MAX_PATTERNS {
        return Err(XmError::TooManyPatterns(num_patterns));
    }

    let num_instruments = io.read_u16()?;
    if num_instruments > MAX_INSTRUMENTS {
        return Err(XmError::TooManyInstruments(num_instruments));
    }

    let flags = io.read_u16()?;
    let default_speed = io.read_u16()?;
    let default_bpm = io.read_u16()?;

    let mut orders = [0u8; 256];
    io.read_bytes(&mut orders)?;
    let song_length = if song_length as usize > orders.len() {
        warn!("song length {} truncated to 256 orders", song_length);
        256
    } else {
        song_length
    };
    for (order, &pattern) in orders[..song_length as usize].iter().enumerate() {
        if pattern as u16 >= num_patterns {
            return Err(XmError::InvalidOrder {
                order: order as u16,
                pattern,
                count: num_patterns,
            });
        }
    }
    let order_table = Allocation::from_vec(
        memory,
        orders[..song_length as usize].to_vec(),
        AllocType::SongHeader,
    )?;

    io.seek(header_start + header_size as u64)?;

    let mut patterns = Vec::with_capacity(num_patterns as usize);
    for index in 0..num_patterns {
        patterns.push(read_pattern(io, memory, index, num_channels)?);
    }

    let mut instruments = Vec::with_capacity(num_instruments as usize);
    for index in 0..num_instruments {
        instruments.push(read_instrument(io, memory, index)?);
    }

    let restart_position = if restart_position >= song_length {
        0
    } else {
        restart_position
    };

    Ok(XmModule {
        name,
        tracker_name,
        num_channels,
        restart_position,
        default_speed,
        default_bpm,
        linear_frequency_table: flags & 1 != 0,
        order_table,
        patterns,
        instruments,
    })
}

fn read_pattern(
    io: &mut dyn XmFileIo,
    memory: &SharedMemoryManager,
    index: u16,
    num_channels: u8,
) -> Result<XmPattern, XmError> {
    // The header length includes its own 4 bytes
    let header_start = io.position();
    let header_length = io.read_u32()?;
    let _packing_type = io.read_u8()?;
    let num_rows = io.read_u16()?;
    let packed_size = io.read_u16()?;

    if num_rows == 0 || num_rows > MAX_PATTERN_ROWS {
        warn!("pattern {} has {} rows", index, num_rows);
        return Err(XmError::InvalidPattern(index));
    }

    io.seek(header_start + header_length as u64)?;

    let cells = num_rows as usize * num_channels as usize;
    let mut notes = vec![XmNote::default(); cells];
    if packed_size > 0 {
        let mut packed = vec![0u8; packed_size as usize];
        io.read_bytes(&mut packed)?;

        let mut pos = 0;
        for note in notes.iter_mut() {
            *note = unpack_note(&packed, &mut pos).inspect_err(|e| {
                warn!("pattern {}: {}", index, e);
            })?;
        }
        if pos != packed.len() {
            debug!(
                "pattern {}: {} trailing bytes ignored",
                index,
                packed.len() - pos
            );
        }
    }

    XmPattern::from_notes(memory, num_rows, num_channels, &notes)
}

/// Sample header fields needed before the sample data is read
struct SampleHeader {
    length: u32,
    loop_start: u32,
    loop_length: u32,
    volume: u8,
    finetune: i8,
    flags: u8,
    panning: u8,
    relative_note: i8,
    name: String,
}

fn read_instrument(
    io: &mut dyn XmFileIo,
    memory: &SharedMemoryManager,
    index: u16,
) -> Result<XmInstrument, XmError> {
    // The header size includes its own 4 bytes
    let header_start = io.position();
    let header_size = io.read_u32()?;
    let header_end = header_start + header_size as u64;

    if header_size < INSTRUMENT_PREAMBLE {
        warn!("instrument {} has a {} byte header", index, header_size);
        let resume = header_end.max(io.position());
        io.seek(resume)?;
        return XmInstrument::new(memory, "", Vec::new());
    }

    let name = read_string(io, 22)?;
    let _instrument_type = io.read_u8()?;
    let num_samples = io.read_u16()?;
    if num_samples > MAX_SAMPLES_PER_INSTRUMENT {
        warn!("instrument {} has {} samples", index, num_samples);
        return Err(XmError::InvalidInstrument(index));
    }

    let mut instrument = XmInstrument::new(memory, &name, Vec::new())?;
    if num_samples == 0 {
        io.seek(header_end)?;
        return Ok(instrument);
    }

    let sample_header_size = io.read_u32()?;
    io.read_bytes(instrument.keymap.as_mut_slice())?;

    let mut vol_points = [(0u16, 0u16); MAX_ENVELOPE_POINTS];
    let mut pan_points = [(0u16, 0u16); MAX_ENVELOPE_POINTS];
    for point in vol_points.iter_mut().chain(pan_points.iter_mut()) {
        *point = (io.read_u16()?, io.read_u16()?);
    }
    let num_vol_points = io.read_u8()?;
    let num_pan_points = io.read_u8()?;
    let vol_indices = [io.read_u8()?, io.read_u8()?, io.read_u8()?];
    let pan_indices = [io.read_u8()?, io.read_u8()?, io.read_u8()?];
    let vol_type = io.read_u8()?;
    let pan_type = io.read_u8()?;

    instrument.vibrato_type = io.read_u8()?;
    instrument.vibrato_sweep = io.read_u8()?;
    instrument.vibrato_depth = io.read_u8()?;
    instrument.vibrato_rate = io.read_u8()?;
    instrument.volume_fadeout = io.read_u16()?;

    instrument.volume_envelope =
        build_envelope(index, &vol_points, num_vol_points, vol_indices, vol_type)?;
    instrument.panning_envelope =
        build_envelope(index, &pan_points, num_pan_points, pan_indices, pan_type)?;

    if let Some(&sample) = instrument.keymap.iter().find(|&&s| s as u16 >= num_samples) {
        warn!("instrument {} keymap references sample {}", index, sample);
        return Err(XmError::InvalidKeymap {
            instrument: index,
            sample,
            count: num_samples,
        });
    }
    debug_assert_eq!(instrument.keymap.len(), KEYMAP_SIZE);

    io.seek(header_end)?;

    let mut headers = Vec::with_capacity(num_samples as usize);
    for _ in 0..num_samples {
        let start = io.position();
        let length = io.read_u32()?;
        let loop_start = io.read_u32()?;
        let loop_length = io.read_u32()?;
        let volume = io.read_u8()?;
        let finetune = io.read_i8()?;
        let flags = io.read_u8()?;
        let panning = io.read_u8()?;
        let relative_note = io.read_i8()?;
        // Reserved
        io.skip(1)?;
        let name = read_string(io, 22)?;
        headers.push(SampleHeader {
            length,
            loop_start,
            loop_length,
            volume,
            finetune,
            flags,
            panning,
            relative_note,
            name,
        });
        io.seek(start + sample_header_size.max(SAMPLE_HEADER_SIZE) as u64)?;
    }

    for (sample_index, header) in headers.into_iter().enumerate() {
        instrument
            .samples
            .push(read_sample(io, memory, index, sample_index, header)?);
    }

    Ok(instrument)
}

fn build_envelope(
    instrument: u16,
    points: &[(u16, u16); MAX_ENVELOPE_POINTS],
    count: u8,
    [sustain, loop_begin, loop_end]: [u8; 3],
    kind: u8,
) -> Result<XmEnvelope, XmError> {
    if kind & 1 == 0 || count == 0 {
        return Ok(XmEnvelope::default());
    }
    if count as usize > MAX_ENVELOPE_POINTS {
        warn!("instrument {} envelope has {} points", instrument, count);
        return Err(XmError::InvalidEnvelope(instrument));
    }

    let mut env = XmEnvelope {
        flags: ENV_FLAG_ENABLED | count,
        sustain_index: sustain,
        loop_begin_index: loop_begin,
        loop_end_index: loop_end,
        ..Default::default()
    };
    if kind & 2 != 0 {
        env.flags |= ENV_FLAG_SUSTAIN;
    }
    if kind & 4 != 0 {
        env.flags |= ENV_FLAG_LOOP;
    }

    for (slot, &(offset, value)) in env.points.iter_mut().zip(&points[..count as usize]) {
        if offset > MAX_ENVELOPE_OFFSET {
            warn!(
                "instrument {} envelope offset {} clamped to {}",
                instrument, offset, MAX_ENVELOPE_OFFSET
            );
        }
        *slot = pack_point(offset, value.min(64) as u8);
    }

    if !env.is_well_formed() {
        warn!("instrument {} envelope offsets are not increasing", instrument);
        return Err(XmError::InvalidEnvelope(instrument));
    }
    Ok(env)
}

fn read_sample(
    io: &mut dyn XmFileIo,
    memory: &SharedMemoryManager,
    instrument: u16,
    sample_index: usize,
    header: SampleHeader,
) -> Result<XmSample, XmError> {
    let is_16bit = header.flags & SAMPLE_FLAG_16BIT != 0;
    let bytes_per_frame = if is_16bit { 2 } else { 1 };
    let frames = (header.length / bytes_per_frame) as usize;

    let mut raw = vec![0u8; header.length as usize];
    io.read_bytes(&mut raw)?;

    let mut data = Allocation::<i16>::zeroed(memory, frames, AllocType::Sample)?;
    if is_16bit {
        let big_endian = io.big_endian();
        let mut acc = 0i16;
        for (out, chunk) in data.iter_mut().zip(raw.chunks_exact(2)) {
            let delta = if big_endian {
                i16::from_be_bytes([chunk[0], chunk[1]])
            } else {
                i16::from_le_bytes([chunk[0], chunk[1]])
            };
            acc = acc.wrapping_add(delta);
            *out = acc;
        }
    } else {
        let mut acc = 0i8;
        for (out, &delta) in data.iter_mut().zip(&raw) {
            acc = acc.wrapping_add(delta as i8);
            *out = (acc as i16) << 8;
        }
    }

    let mut loop_type = LoopType::from_flags(header.flags);
    let mut loop_start = header.loop_start / bytes_per_frame;
    let mut loop_length = header.loop_length / bytes_per_frame;
    let frames = frames as u32;

    if loop_type != LoopType::None {
        if loop_length == 0 || loop_start >= frames {
            warn!(
                "instrument {} sample {}: loop {}+{} outside {} frames, disabled",
                instrument, sample_index, loop_start, loop_length, frames
            );
            loop_type = LoopType::None;
            loop_start = 0;
            loop_length = 0;
        } else if loop_length > frames - loop_start {
            warn!(
                "instrument {} sample {}: loop end {} clamped to {}",
                instrument,
                sample_index,
                u64::from(loop_start) + u64::from(loop_length),
                frames
            );
            loop_length = frames - loop_start;
        }
    }

    Ok(XmSample {
        name: header.name,
        data,
        loop_start,
        loop_length,
        loop_type,
        volume: header.volume.min(64),
        finetune: header.finetune,
        panning: header.panning,
        relative_note: header.relative_note,
    })
}

/// Read a fixed-width, NUL-padded string field
pub(crate) fn read_string(io: &mut dyn XmFileIo, len: usize) -> Result<String, XmError> {
    let mut bytes = vec![0u8; len];
    io.read_bytes(&mut bytes)?;
    Ok(decode_string(&bytes))
}

pub(crate) fn decode_string(bytes: &[u8]) -> String {
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..len]).trim_end().to_string()
}

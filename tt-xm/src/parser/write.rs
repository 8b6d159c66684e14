//! XM file writing
//!
//! Output is always little-endian XM 0x0104 with 16-bit delta-encoded samples.
//! Pattern data is emitted exactly as it is held in memory, which is already
//! the FT2 packed layout.

use crate::envelope::{ENV_FLAG_LOOP, ENV_FLAG_SUSTAIN, MAX_ENVELOPE_POINTS, XmEnvelope};
use crate::module::XmModule;
use crate::{XM_MAGIC, XM_VERSION};

/// Song header size from the header-size field to the end of the order table
const SONG_HEADER_SIZE: u32 = 276;

/// Standard FT2 instrument header size when the instrument has samples
const INSTRUMENT_HEADER_SIZE: u32 = 263;

/// Instrument header size without samples
const EMPTY_INSTRUMENT_HEADER_SIZE: u32 = 29;

const SAMPLE_HEADER_SIZE: u32 = 40;

const PATTERN_HEADER_SIZE: u32 = 9;

const SAMPLE_FLAG_16BIT: u8 = 0x10;

/// Serialize a module to XM bytes
pub fn write_module(module: &XmModule) -> Vec<u8> {
    let mut out = Vec::with_capacity(SONG_HEADER_SIZE as usize + 60 + module.sample_bytes());

    out.extend_from_slice(XM_MAGIC);
    write_string(&mut out, &module.name, 20);
    out.push(0x1A);
    write_string(&mut out, &module.tracker_name, 20);
    write_u16(&mut out, XM_VERSION);

    write_u32(&mut out, SONG_HEADER_SIZE);
    write_u16(&mut out, module.song_length());
    write_u16(&mut out, module.restart_position);
    write_u16(&mut out, module.num_channels as u16);
    write_u16(&mut out, module.patterns.len() as u16);
    write_u16(&mut out, module.instruments.len() as u16);
    write_u16(&mut out, module.linear_frequency_table as u16);
    write_u16(&mut out, module.default_speed);
    write_u16(&mut out, module.default_bpm);
    let mut orders = [0u8; 256];
    orders[..module.order_table.len()].copy_from_slice(&module.order_table);
    out.extend_from_slice(&orders);

    for pattern in &module.patterns {
        write_u32(&mut out, PATTERN_HEADER_SIZE);
        // Packing type
        out.push(0);
        write_u16(&mut out, pattern.num_rows);
        write_u16(&mut out, pattern.data.len() as u16);
        out.extend_from_slice(&pattern.data);
    }

    for instrument in &module.instruments {
        if instrument.samples.is_empty() {
            write_u32(&mut out, EMPTY_INSTRUMENT_HEADER_SIZE);
            write_string(&mut out, &instrument.name, 22);
            out.push(0);
            write_u16(&mut out, 0);
            continue;
        }

        let header_start = out.len();
        write_u32(&mut out, INSTRUMENT_HEADER_SIZE);
        write_string(&mut out, &instrument.name, 22);
        out.push(0);
        write_u16(&mut out, instrument.samples.len() as u16);
        write_u32(&mut out, SAMPLE_HEADER_SIZE);
        out.extend_from_slice(&instrument.keymap);

        let vol = &instrument.volume_envelope;
        let pan = &instrument.panning_envelope;
        write_envelope_points(&mut out, vol);
        write_envelope_points(&mut out, pan);
        out.push(vol.point_count() as u8);
        out.push(pan.point_count() as u8);
        out.extend_from_slice(&[vol.sustain_index, vol.loop_begin_index, vol.loop_end_index]);
        out.extend_from_slice(&[pan.sustain_index, pan.loop_begin_index, pan.loop_end_index]);
        out.push(envelope_type(vol));
        out.push(envelope_type(pan));
        out.extend_from_slice(&[
            instrument.vibrato_type,
            instrument.vibrato_sweep,
            instrument.vibrato_depth,
            instrument.vibrato_rate,
        ]);
        write_u16(&mut out, instrument.volume_fadeout);
        out.resize(header_start + INSTRUMENT_HEADER_SIZE as usize, 0);

        for sample in &instrument.samples {
            // Lengths and loop points are in bytes
            write_u32(&mut out, sample.len() as u32 * 2);
            write_u32(&mut out, sample.loop_start * 2);
            write_u32(&mut out, sample.loop_length * 2);
            out.push(sample.volume);
            out.push(sample.finetune as u8);
            out.push(sample.loop_type.to_flags() | SAMPLE_FLAG_16BIT);
            out.push(sample.panning);
            out.push(sample.relative_note as u8);
            out.push(0);
            write_string(&mut out, &sample.name, 22);
        }

        for sample in &instrument.samples {
            let mut previous = 0i16;
            for &value in sample.data.iter() {
                out.extend_from_slice(&value.wrapping_sub(previous).to_le_bytes());
                previous = value;
            }
        }
    }

    out
}

fn envelope_type(env: &XmEnvelope) -> u8 {
    let mut kind = 0;
    if env.is_enabled() {
        kind |= 1;
    }
    if env.flags & ENV_FLAG_SUSTAIN != 0 {
        kind |= 2;
    }
    if env.flags & ENV_FLAG_LOOP != 0 {
        kind |= 4;
    }
    kind
}

fn write_envelope_points(out: &mut Vec<u8>, env: &XmEnvelope) {
    let count = env.point_count();
    for i in 0..MAX_ENVELOPE_POINTS {
        if i < count {
            write_u16(out, env.offset(i));
            write_u16(out, env.value(i) as u16);
        } else {
            write_u32(out, 0);
        }
    }
}

fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_string(out: &mut Vec<u8>, value: &str, len: usize) {
    let bytes = value.as_bytes();
    let copy_len = bytes.len().min(len);
    out.extend_from_slice(&bytes[..copy_len]);
    out.resize(out.len() + len - copy_len, 0);
}

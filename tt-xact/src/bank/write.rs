//! Bank file writing

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use super::{
    BANK_VERSION, EventKind, RangedValue, SOUND_BANK_MAGIC, SoundBank, SoundDef,
    WAVE_BANK_MAGIC, WaveBank, WaveFormat,
};

/// Growable buffer with a byte order fixed at construction
struct BankWriter {
    out: Vec<u8>,
    big_endian: bool,
}

impl BankWriter {
    fn new(big_endian: bool) -> Self {
        Self {
            out: Vec::new(),
            big_endian,
        }
    }

    fn u8(&mut self, value: u8) {
        self.out.push(value);
    }

    fn bool(&mut self, value: bool) {
        self.out.push(value as u8);
    }

    fn u16(&mut self, value: u16) {
        let mut buf = [0u8; 2];
        if self.big_endian {
            BigEndian::write_u16(&mut buf, value);
        } else {
            LittleEndian::write_u16(&mut buf, value);
        }
        self.out.extend_from_slice(&buf);
    }

    fn u32(&mut self, value: u32) {
        let mut buf = [0u8; 4];
        if self.big_endian {
            BigEndian::write_u32(&mut buf, value);
        } else {
            LittleEndian::write_u32(&mut buf, value);
        }
        self.out.extend_from_slice(&buf);
    }

    fn f32(&mut self, value: f32) {
        self.u32(value.to_bits());
    }

    fn string(&mut self, value: &str) {
        let bytes = &value.as_bytes()[..value.len().min(u16::MAX as usize)];
        self.u16(bytes.len() as u16);
        self.out.extend_from_slice(bytes);
    }

    fn ranged(&mut self, value: &RangedValue) {
        self.f32(value.min);
        self.f32(value.max);
        self.bool(value.random);
    }

    fn header(&mut self, magic: [u8; 4], name: &str) {
        self.out.extend_from_slice(&magic);
        self.u16(BANK_VERSION);
        self.string(name);
    }
}

/// Serialize a sound bank in the requested byte order
pub fn write_sound_bank(bank: &SoundBank, big_endian: bool) -> Vec<u8> {
    let mut w = BankWriter::new(big_endian);
    w.header(SOUND_BANK_MAGIC, &bank.name);

    w.u16(bank.categories.len() as u16);
    for category in &bank.categories {
        w.string(category);
    }

    w.u16(bank.cues.len() as u16);
    for cue in &bank.cues {
        w.string(&cue.name);
        w.u8(cue.mode.to_raw());
        w.u16(cue.variations.len() as u16);
        for variation in &cue.variations {
            w.u16(variation.sound);
            w.f32(variation.weight);
        }
    }

    w.u16(bank.sounds.len() as u16);
    for sound in &bank.sounds {
        write_sound(&mut w, sound);
    }

    w.out
}

fn write_sound(w: &mut BankWriter, sound: &SoundDef) {
    w.string(&sound.name);
    w.f32(sound.volume);
    w.f32(sound.pitch);
    w.u16(sound.category);

    w.u8(sound.rpcs.len() as u8);
    for rpc in &sound.rpcs {
        w.string(&rpc.variable);
        w.u8(rpc.parameter.to_raw());
        w.u8(rpc.points.len() as u8);
        for &(x, y) in &rpc.points {
            w.f32(x);
            w.f32(y);
        }
    }

    w.u16(sound.tracks.len() as u16);
    for track in &sound.tracks {
        w.f32(track.volume);
        w.u16(track.events.len() as u16);
        for event in &track.events {
            w.u8(event.kind.tag());
            w.ranged(&event.timestamp);
            w.u16(event.loop_count.to_raw());
            match &event.kind {
                EventKind::PlayWave {
                    wave,
                    volume,
                    pitch,
                    looping,
                } => {
                    w.u16(*wave);
                    w.ranged(volume);
                    w.ranged(pitch);
                    w.bool(*looping);
                }
                EventKind::Stop { immediate } => w.bool(*immediate),
                EventKind::Volume { value, relative } | EventKind::Pitch { value, relative } => {
                    w.ranged(value);
                    w.bool(*relative);
                }
            }
        }
    }
}

/// Serialize a wave bank in the requested byte order
pub fn write_wave_bank(bank: &WaveBank, big_endian: bool) -> Vec<u8> {
    let mut w = BankWriter::new(big_endian);
    w.header(WAVE_BANK_MAGIC, &bank.name);

    w.u16(bank.waves.len() as u16);
    for wave in &bank.waves {
        w.string(&wave.name);
        w.u8(wave.format.to_raw());
        w.u32(wave.sample_rate);
        w.u32(wave.frames);
        let (loop_start, loop_length) = wave.loop_region.map_or((0, 0), |r| (r.start, r.length));
        w.u32(loop_start);
        w.u32(loop_length);
        w.u32(wave.data.len() as u32);

        if wave.format == WaveFormat::Pcm16 && big_endian {
            for pair in wave.data.chunks_exact(2) {
                w.out.extend_from_slice(&[pair[1], pair[0]]);
            }
            // Odd trailing byte, if any
            if wave.data.len() % 2 == 1 {
                w.u8(wave.data[wave.data.len() - 1]);
            }
        } else {
            w.out.extend_from_slice(&wave.data);
        }
    }

    w.out
}

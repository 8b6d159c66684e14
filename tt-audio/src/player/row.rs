//! Row decoding, note triggers and first-tick effects

use tracing::warn;
use tt_xm::effects::{self, extended};
use tt_xm::{XmModule, XmNote};

use super::channel::Channel;
use super::utils::note_to_period;
use super::{GLOBAL_VOLUME_MAX, ReaderCursor, XmPlayer};

/// E4x
const SET_VIBRATO_WAVEFORM: u8 = 0x4;
/// E7x
const SET_TREMOLO_WAVEFORM: u8 = 0x7;

impl XmPlayer {
    /// Tick 0 of a row: trigger notes and run first-tick effects
    pub(super) fn process_row(&mut self) {
        self.decode_row();
        let module = std::sync::Arc::clone(&self.module);

        for index in 0..self.channels.len() {
            let note = self.row_notes[index];
            let ch = &mut self.channels[index];
            ch.begin_row(&note);

            if is_note_delay(&note) {
                ch.delayed = Some(note);
            } else {
                start_cell(ch, &note, &module);
            }
            self.row_flow_effect(index, &note);
        }
    }

    fn decode_row(&mut self) {
        self.row_notes.fill(XmNote::default());
        let Some(pattern) = self.module.pattern_at_order(self.order) else {
            return;
        };

        let mut reader = pattern.reader();
        if let Some(cursor) = self.cursor
            && cursor.order == self.order
            && cursor.row <= self.row
        {
            reader.resume(cursor.row, cursor.offset);
        }

        match reader
            .seek_row(self.row)
            .and_then(|()| reader.next_row(&mut self.row_notes))
        {
            Ok(_) => {
                self.cursor = Some(ReaderCursor {
                    order: self.order,
                    row: reader.row(),
                    offset: reader.offset(),
                });
            }
            Err(e) => {
                warn!(
                    "bad pattern data at order {} row {}: {}",
                    self.order, self.row, e
                );
                self.row_notes.fill(XmNote::default());
                self.cursor = None;
            }
        }
    }

    /// Effects that steer the song rather than a channel
    fn row_flow_effect(&mut self, index: usize, note: &XmNote) {
        let param = note.effect_param;
        match note.effect {
            effects::POSITION_JUMP => self.flow.jump = Some(param as u16),
            effects::PATTERN_BREAK => {
                self.flow.break_row = Some((param >> 4) as u16 * 10 + (param & 0x0F) as u16);
            }
            effects::SET_SPEED_TEMPO => match param {
                0 => {}
                1..=0x1F => self.pending_speed = Some(param as u16),
                _ => self.pending_bpm = Some(param as u16),
            },
            effects::SET_GLOBAL_VOLUME => self.global_volume = param.min(GLOBAL_VOLUME_MAX),
            effects::EXTENDED => {
                let x = param & 0x0F;
                match param >> 4 {
                    extended::PATTERN_LOOP => {
                        let row = self.row;
                        let ch = &mut self.channels[index];
                        if x == 0 {
                            ch.loop_row = row;
                        } else if ch.loop_remaining == 0 {
                            ch.loop_remaining = x;
                            self.flow.loop_row = Some(ch.loop_row);
                        } else {
                            ch.loop_remaining -= 1;
                            if ch.loop_remaining > 0 {
                                self.flow.loop_row = Some(ch.loop_row);
                            }
                        }
                    }
                    extended::PATTERN_DELAY if x > 0 && self.row_repeats.is_none() => {
                        self.row_repeats = Some(x);
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }
}

fn is_note_delay(note: &XmNote) -> bool {
    note.effect == effects::EXTENDED
        && note.effect_param >> 4 == extended::NOTE_DELAY
        && note.effect_param & 0x0F > 0
}

fn is_tone_portamento(note: &XmNote) -> bool {
    matches!(
        note.effect,
        effects::TONE_PORTA | effects::TONE_PORTA_VOL_SLIDE
    ) || note.volume >> 4 == 0xF
}

/// Trigger a cell's note and apply its volume column and first-tick effect
///
/// Called on tick 0, or on the delay tick for a delayed note.
pub(super) fn start_cell(ch: &mut Channel, note: &XmNote, module: &XmModule) {
    trigger(ch, note, module);
    volume_column_first_tick(ch, note.volume);
    effect_first_tick(ch, note, module);
}

fn trigger(ch: &mut Channel, note: &XmNote, module: &XmModule) {
    if note.has_instrument() {
        ch.instrument = note.instrument;
    }

    if note.is_note_off() {
        ch.key_off(module.instrument(ch.instrument));
        return;
    }

    if note.has_note() {
        let instrument = module.instrument(ch.instrument);
        let Some((instrument, index)) =
            instrument.and_then(|i| i.sample_index_for_note(note.note).map(|s| (i, s)))
        else {
            ch.cut();
            return;
        };
        let sample = &instrument.samples[index];
        let semitone = note.note as i16 - 1 + sample.relative_note as i16;
        let period = note_to_period(semitone, sample.finetune, module.linear_frequency_table);

        if is_tone_portamento(note) && ch.active {
            ch.target_period = period;
        } else {
            ch.sample = Some(index);
            ch.note = note.note;
            ch.finetune = sample.finetune;
            ch.relative_note = sample.relative_note;
            ch.period = period;
            ch.target_period = period;
            ch.position = 0.0;
            ch.forward = true;
            ch.active = !sample.is_empty();
            if ch.vibrato_waveform & 0x04 == 0 {
                ch.vibrato_pos = 0;
            }
            if ch.tremolo_waveform & 0x04 == 0 {
                ch.tremolo_pos = 0;
            }
            ch.reset_envelopes();

            if note.effect == effects::SAMPLE_OFFSET {
                if note.effect_param > 0 {
                    ch.sample_offset = note.effect_param;
                }
                let offset = ch.sample_offset as usize * 256;
                if offset >= sample.len() {
                    ch.cut();
                } else {
                    ch.position = offset as f64;
                }
            }
        }
    }

    if note.has_instrument() {
        let sample = module
            .instrument(ch.instrument)
            .and_then(|i| ch.sample.and_then(|s| i.samples.get(s)));
        if let Some(sample) = sample {
            ch.volume = sample.volume.min(64);
            ch.panning = sample.panning;
        }
        ch.reset_envelopes();
    }
}

fn volume_column_first_tick(ch: &mut Channel, volume: u8) {
    let x = volume & 0x0F;
    match volume {
        0x10..=0x50 => ch.volume = volume - 0x10,
        0x80..=0x8F => ch.slide_volume(-(x as i16)),
        0x90..=0x9F => ch.slide_volume(x as i16),
        0xA0..=0xAF => ch.vibrato_speed = x,
        0xB0..=0xBF if x > 0 => ch.vibrato_depth = x,
        0xC0..=0xCF => ch.panning = x << 4,
        0xF0..=0xFF if x > 0 => ch.tone_porta_speed = x << 4,
        _ => {}
    }
}

fn effect_first_tick(ch: &mut Channel, note: &XmNote, module: &XmModule) {
    let param = note.effect_param;
    let (x, y) = (param >> 4, param & 0x0F);
    match note.effect {
        effects::PORTA_UP if param > 0 => ch.porta_up = param,
        effects::PORTA_DOWN if param > 0 => ch.porta_down = param,
        effects::TONE_PORTA if param > 0 => ch.tone_porta_speed = param,
        effects::VIBRATO => {
            if x > 0 {
                ch.vibrato_speed = x;
            }
            if y > 0 {
                ch.vibrato_depth = y;
            }
        }
        effects::TONE_PORTA_VOL_SLIDE | effects::VIBRATO_VOL_SLIDE | effects::VOLUME_SLIDE
            if param > 0 =>
        {
            ch.volume_slide = param;
        }
        effects::TREMOLO => {
            if x > 0 {
                ch.tremolo_speed = x;
            }
            if y > 0 {
                ch.tremolo_depth = y;
            }
        }
        effects::SET_PANNING => ch.panning = param,
        effects::SET_VOLUME => ch.volume = param.min(64),
        effects::GLOBAL_VOLUME_SLIDE if param > 0 => ch.global_volume_slide = param,
        effects::KEY_OFF if param == 0 => ch.key_off(module.instrument(ch.instrument)),
        effects::EXTENDED => match x {
            extended::FINE_PORTA_UP => {
                if y > 0 {
                    ch.fine_porta_up = y;
                }
                ch.slide_period(-(ch.fine_porta_up as f32 * 4.0));
            }
            extended::FINE_PORTA_DOWN => {
                if y > 0 {
                    ch.fine_porta_down = y;
                }
                ch.slide_period(ch.fine_porta_down as f32 * 4.0);
            }
            SET_VIBRATO_WAVEFORM => ch.vibrato_waveform = y,
            SET_TREMOLO_WAVEFORM => ch.tremolo_waveform = y,
            extended::FINE_VOLUME_UP => {
                if y > 0 {
                    ch.fine_volume_up = y;
                }
                ch.slide_volume(ch.fine_volume_up as i16);
            }
            extended::FINE_VOLUME_DOWN => {
                if y > 0 {
                    ch.fine_volume_down = y;
                }
                ch.slide_volume(-(ch.fine_volume_down as i16));
            }
            extended::NOTE_CUT if y == 0 => ch.volume = 0,
            _ => {}
        },
        _ => {}
    }
}

impl Channel {
    /// Latch a new row's effect columns and clear per-tick modulation
    pub(super) fn begin_row(&mut self, note: &XmNote) {
        self.effect = note.effect;
        self.param = note.effect_param;
        self.volume_column = note.volume;
        self.delayed = None;
        self.clear_modulation();
    }

    pub(super) fn clear_modulation(&mut self) {
        self.vibrato_period = 0.0;
        self.tremolo_volume = 0;
        self.arpeggio = 0;
    }
}

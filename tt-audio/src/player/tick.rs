//! Per-tick effects, position advance and song flow

use tracing::debug;
use tt_xm::effects::{self, extended};

use super::channel::Channel;
use super::row::start_cell;
use super::{GLOBAL_VOLUME_MAX, PlayerState, XmPlayer};

impl XmPlayer {
    /// Continuous effects for ticks after the first
    pub(super) fn process_tick_effects(&mut self) {
        let tick = self.tick;
        let module = std::sync::Arc::clone(&self.module);
        let mut global_slide = 0i16;

        for ch in &mut self.channels {
            ch.clear_modulation();

            if let Some(note) = ch.delayed
                && tick == (note.effect_param & 0x0F) as u16
            {
                ch.delayed = None;
                start_cell(ch, &note, &module);
                continue;
            }

            volume_column_tick(ch);
            global_slide += effect_tick(ch, tick, &module);
        }

        if global_slide != 0 {
            self.global_volume =
                (self.global_volume as i16 + global_slide).clamp(0, GLOBAL_VOLUME_MAX as i16) as u8;
        }
    }

    /// Move to the next tick, applying pending tempo first
    pub(super) fn advance(&mut self) {
        if let Some(speed) = self.pending_speed.take() {
            self.speed = speed;
        }
        if let Some(bpm) = self.pending_bpm.take() {
            self.bpm = bpm;
        }

        self.tick += 1;
        if self.tick < self.speed {
            return;
        }
        self.tick = 0;

        if let Some(remaining) = self.row_repeats
            && remaining > 0
        {
            self.row_repeats = Some(remaining - 1);
            self.repeat_pass = true;
            return;
        }
        self.row_repeats = None;
        self.repeat_pass = false;
        self.next_row();
    }

    fn next_row(&mut self) {
        let flow = std::mem::take(&mut self.flow);

        if let Some(row) = flow.loop_row {
            self.row = row;
            return;
        }

        if flow.jump.is_some() || flow.break_row.is_some() {
            let target = flow.jump.unwrap_or(self.order + 1);
            if flow.jump.is_some_and(|order| order <= self.order) {
                // Jumping back is how most songs loop
                self.loop_count += 1;
                if !self.looping {
                    self.finish();
                    return;
                }
            }
            self.enter_order(target, flow.break_row.unwrap_or(0));
            return;
        }

        self.row += 1;
        if self.row >= self.rows_at(self.order) {
            self.enter_order(self.order + 1, 0);
        }
    }

    fn enter_order(&mut self, order: u16, row: u16) {
        let song_length = self.module.song_length();
        let mut order = order;
        if order >= song_length {
            self.loop_count += 1;
            if !self.looping {
                self.finish();
                return;
            }
            order = if self.module.restart_position < song_length {
                self.module.restart_position
            } else {
                0
            };
            debug!("'{}' looped to order {}", self.module.name, order);
        }

        if order != self.order {
            for ch in &mut self.channels {
                ch.loop_row = 0;
                ch.loop_remaining = 0;
            }
        }
        self.order = order;
        self.row = if row < self.rows_at(order) { row } else { 0 };
    }

    /// End of a non-looping song; the current tick still plays out
    fn finish(&mut self) {
        debug!("'{}' finished", self.module.name);
        self.state = PlayerState::Stopped;
        self.order = 0;
        self.row = 0;
    }
}

fn volume_column_tick(ch: &mut Channel) {
    let x = ch.volume_column & 0x0F;
    match ch.volume_column >> 4 {
        0x6 => ch.slide_volume(-(x as i16)),
        0x7 => ch.slide_volume(x as i16),
        0xB => ch.vibrato(),
        0xD => ch.slide_panning(-(x as i16)),
        0xE => ch.slide_panning(x as i16),
        0xF => ch.tone_portamento(),
        _ => {}
    }
}

fn volume_slide(ch: &mut Channel) {
    let (up, down) = (ch.volume_slide >> 4, ch.volume_slide & 0x0F);
    if up > 0 {
        ch.slide_volume(up as i16);
    } else {
        ch.slide_volume(-(down as i16));
    }
}

/// Run one channel's effect for a non-zero tick
///
/// Returns the global volume change the channel asks for.
fn effect_tick(ch: &mut Channel, tick: u16, module: &tt_xm::XmModule) -> i16 {
    let param = ch.param;
    let (x, y) = (param >> 4, param & 0x0F);
    match ch.effect {
        effects::ARPEGGIO if param != 0 => {
            ch.arpeggio = match tick % 3 {
                0 => 0,
                1 => x,
                _ => y,
            };
        }
        effects::PORTA_UP => ch.slide_period(-(ch.porta_up as f32 * 4.0)),
        effects::PORTA_DOWN => ch.slide_period(ch.porta_down as f32 * 4.0),
        effects::TONE_PORTA => ch.tone_portamento(),
        effects::VIBRATO => ch.vibrato(),
        effects::TONE_PORTA_VOL_SLIDE => {
            ch.tone_portamento();
            volume_slide(ch);
        }
        effects::VIBRATO_VOL_SLIDE => {
            ch.vibrato();
            volume_slide(ch);
        }
        effects::TREMOLO => ch.tremolo(),
        effects::VOLUME_SLIDE => volume_slide(ch),
        effects::GLOBAL_VOLUME_SLIDE => {
            let (up, down) = (ch.global_volume_slide >> 4, ch.global_volume_slide & 0x0F);
            return if up > 0 { up as i16 } else { -(down as i16) };
        }
        effects::KEY_OFF if tick == param as u16 => ch.key_off(module.instrument(ch.instrument)),
        effects::EXTENDED => match x {
            extended::RETRIG if y > 0 && tick % y as u16 == 0 => {
                if ch.sample.is_some() {
                    ch.position = 0.0;
                    ch.forward = true;
                    ch.active = true;
                    ch.reset_envelopes();
                }
            }
            extended::NOTE_CUT if tick == y as u16 => ch.volume = 0,
            _ => {}
        },
        _ => {}
    }
    0
}

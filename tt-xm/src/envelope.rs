//! Volume/panning envelopes with bit-packed points
//!
//! Each point is a `u16`: tick offset in the low 9 bits, value (0-64) in the
//! remaining 7. The flags byte carries the enabled/sustain/loop bits and the
//! point count in its low 5 bits. All decoding is plain shift/mask so the
//! layout is identical on every platform.

/// Points per envelope in an XM instrument
pub const MAX_ENVELOPE_POINTS: usize = 12;

pub const ENV_FLAG_ENABLED: u8 = 0x80;
pub const ENV_FLAG_LOOP: u8 = 0x40;
pub const ENV_FLAG_SUSTAIN: u8 = 0x20;
pub const ENV_POINT_COUNT_MASK: u8 = 0x1F;

const OFFSET_BITS: u16 = 9;
const OFFSET_MASK: u16 = (1 << OFFSET_BITS) - 1;

/// Highest tick offset a packed point can hold
pub const MAX_ENVELOPE_OFFSET: u16 = OFFSET_MASK;

/// Tick offset of a packed point
#[inline]
pub fn get_offset(point: u16) -> u16 {
    point & OFFSET_MASK
}

/// Value of a packed point
#[inline]
pub fn get_value(point: u16) -> u8 {
    (point >> OFFSET_BITS) as u8
}

/// Pack an offset/value pair (offset clamped to 9 bits, value to 7)
#[inline]
pub fn pack_point(offset: u16, value: u8) -> u16 {
    offset.min(OFFSET_MASK) | (u16::from(value.min(0x7F)) << OFFSET_BITS)
}

/// Immutable envelope definition shared by every voice playing an instrument
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XmEnvelope {
    pub points: [u16; MAX_ENVELOPE_POINTS],
    pub flags: u8,
    pub sustain_index: u8,
    pub loop_begin_index: u8,
    pub loop_end_index: u8,
}

impl XmEnvelope {
    /// Build an enabled envelope from `(offset, value)` pairs
    ///
    /// Extra points beyond [`MAX_ENVELOPE_POINTS`] are dropped.
    pub fn from_points(points: &[(u16, u8)]) -> Self {
        let mut env = Self::default();
        let count = points.len().min(MAX_ENVELOPE_POINTS);
        for (slot, &(offset, value)) in env.points.iter_mut().zip(&points[..count]) {
            *slot = pack_point(offset, value);
        }
        env.flags = ENV_FLAG_ENABLED | count as u8;
        env
    }

    pub fn with_sustain(mut self, index: u8) -> Self {
        self.sustain_index = index;
        self.flags |= ENV_FLAG_SUSTAIN;
        self
    }

    pub fn with_loop(mut self, begin: u8, end: u8) -> Self {
        self.loop_begin_index = begin;
        self.loop_end_index = end;
        self.flags |= ENV_FLAG_LOOP;
        self
    }

    #[inline]
    pub fn point_count(&self) -> usize {
        ((self.flags & ENV_POINT_COUNT_MASK) as usize).min(MAX_ENVELOPE_POINTS)
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.flags & ENV_FLAG_ENABLED != 0 && self.point_count() > 0
    }

    #[inline]
    pub fn is_sustain_enabled(&self) -> bool {
        self.flags & ENV_FLAG_SUSTAIN != 0 && (self.sustain_index as usize) < self.point_count()
    }

    #[inline]
    pub fn is_loop_enabled(&self) -> bool {
        self.flags & ENV_FLAG_LOOP != 0
            && (self.loop_end_index as usize) < self.point_count()
            && self.loop_begin_index <= self.loop_end_index
    }

    #[inline]
    pub fn offset(&self, index: usize) -> u16 {
        get_offset(self.points[index])
    }

    #[inline]
    pub fn value(&self, index: usize) -> u8 {
        get_value(self.points[index])
    }

    /// Tick at which a held note freezes the envelope
    pub fn sustain_offset(&self) -> Option<u16> {
        self.is_sustain_enabled()
            .then(|| self.offset(self.sustain_index as usize))
    }

    /// `(begin, end)` tick range of the loop
    pub fn loop_offsets(&self) -> Option<(u16, u16)> {
        self.is_loop_enabled().then(|| {
            (
                self.offset(self.loop_begin_index as usize),
                self.offset(self.loop_end_index as usize),
            )
        })
    }

    /// Offset of the final point
    pub fn last_offset(&self) -> u16 {
        match self.point_count() {
            0 => 0,
            n => self.offset(n - 1),
        }
    }

    /// Points must have strictly increasing offsets
    pub fn is_well_formed(&self) -> bool {
        let n = self.point_count();
        (1..n).all(|i| self.offset(i) > self.offset(i - 1))
    }

    /// Interpolated value at `tick`
    ///
    /// Before the first point the first value holds; past the loop end (loop
    /// enabled) the tick wraps into `[loop_begin, loop_end)`; past the final
    /// point the last value holds. Sustain is not applied here: it freezes the
    /// envelope position, see [`EnvelopeCursor`].
    pub fn evaluate(&self, tick: u16) -> u8 {
        let n = self.point_count();
        if n == 0 {
            return 64;
        }

        let tick = self.wrap_tick(tick);

        if tick <= self.offset(0) {
            return self.value(0);
        }

        for i in 1..n {
            let x2 = self.offset(i);
            if tick < x2 {
                let x1 = self.offset(i - 1);
                let y1 = self.value(i - 1) as i32;
                let y2 = self.value(i) as i32;
                if x2 <= x1 {
                    return y2 as u8;
                }
                let t = (tick - x1) as i32;
                let span = (x2 - x1) as i32;
                return (y1 + (y2 - y1) * t / span) as u8;
            }
        }

        self.value(n - 1)
    }

    fn wrap_tick(&self, tick: u16) -> u16 {
        match self.loop_offsets() {
            Some((begin, end)) if end > begin && tick >= end => {
                begin + (tick - end) % (end - begin)
            }
            _ => tick,
        }
    }
}

/// Per-voice envelope playhead
///
/// Advanced once per tick. While the key is held and the envelope has a
/// sustain point, the playhead stops on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvelopeCursor {
    pub tick: u16,
}

impl EnvelopeCursor {
    pub fn reset(&mut self) {
        self.tick = 0;
    }

    pub fn value(&self, env: &XmEnvelope) -> u8 {
        env.evaluate(self.tick)
    }

    pub fn advance(&mut self, env: &XmEnvelope, key_held: bool) {
        if key_held && env.sustain_offset() == Some(self.tick) {
            return;
        }

        self.tick = self.tick.saturating_add(1);

        if let Some((begin, end)) = env.loop_offsets()
            && self.tick >= end
        {
            self.tick = begin;
            return;
        }

        // Past the last point the value is constant; stop counting
        self.tick = self.tick.min(env.last_offset().saturating_add(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_packing() {
        let p = pack_point(300, 64);
        assert_eq!(get_offset(p), 300);
        assert_eq!(get_value(p), 64);
        assert_eq!(get_offset(pack_point(1000, 0)), MAX_ENVELOPE_OFFSET);
    }

    #[test]
    fn test_flags_and_count() {
        let env = XmEnvelope::from_points(&[(0, 64), (10, 32)]).with_sustain(1).with_loop(0, 1);
        assert_eq!(env.point_count(), 2);
        assert!(env.is_enabled());
        assert!(env.is_sustain_enabled());
        assert!(env.is_loop_enabled());

        let disabled = XmEnvelope::default();
        assert!(!disabled.is_enabled());
        assert_eq!(disabled.evaluate(5), 64);

        // Sustain index past the point count is ignored
        let env = XmEnvelope::from_points(&[(0, 64)]).with_sustain(4);
        assert!(!env.is_sustain_enabled());
    }

    #[test]
    fn test_interpolation() {
        let env = XmEnvelope::from_points(&[(0, 64), (10, 32), (20, 0)]);

        assert_eq!(env.evaluate(0), 64);
        assert_eq!(env.evaluate(5), 48);
        assert_eq!(env.evaluate(10), 32);
        assert_eq!(env.evaluate(15), 16);
        assert_eq!(env.evaluate(20), 0);
        assert_eq!(env.evaluate(300), 0);
    }

    #[test]
    fn test_hold_before_first_point() {
        let env = XmEnvelope::from_points(&[(4, 20), (8, 40)]);
        assert_eq!(env.evaluate(0), 20);
        assert_eq!(env.evaluate(4), 20);
        assert_eq!(env.evaluate(6), 30);
    }

    #[test]
    fn test_loop_wrap_law() {
        let env = XmEnvelope::from_points(&[(0, 0), (4, 64), (12, 16), (16, 48), (30, 8)])
            .with_loop(1, 3);
        let (begin, end) = env.loop_offsets().unwrap();
        assert_eq!((begin, end), (4, 16));
        let len = end - begin;
        for tick in (end + 1)..200 {
            assert_eq!(
                env.evaluate(tick),
                env.evaluate(begin + (tick - end) % len),
                "tick {}",
                tick
            );
        }
    }

    #[test]
    fn test_cursor_sustain_holds_while_key_held() {
        let env = XmEnvelope::from_points(&[(0, 64), (4, 32), (8, 0)]).with_sustain(1);
        let mut cursor = EnvelopeCursor::default();
        for _ in 0..20 {
            cursor.advance(&env, true);
        }
        assert_eq!(cursor.tick, 4);
        assert_eq!(cursor.value(&env), 32);

        // Releasing the key lets it continue to the end and hold there
        for _ in 0..20 {
            cursor.advance(&env, false);
        }
        assert_eq!(cursor.value(&env), 0);
        assert_eq!(cursor.tick, 9);
    }

    #[test]
    fn test_cursor_loops() {
        let env = XmEnvelope::from_points(&[(0, 0), (2, 64), (6, 0)]).with_loop(1, 2);
        let mut cursor = EnvelopeCursor::default();
        let mut seen = Vec::new();
        for _ in 0..10 {
            cursor.advance(&env, false);
            seen.push(cursor.tick);
        }
        assert!(seen.iter().all(|&t| t < 6));
        assert_eq!(&seen[..6], &[1, 2, 3, 4, 5, 2]);
    }

    #[test]
    fn test_well_formed() {
        assert!(XmEnvelope::from_points(&[(0, 1), (3, 2)]).is_well_formed());
        assert!(!XmEnvelope::from_points(&[(5, 1), (3, 2)]).is_well_formed());
    }
}

//! Shift-register primitives shared by the receive and transmit paths.
//!
//! [`BitAccumulator`] collects bits MSB first into an N-bit value, and
//! [`BitSerializer`] loads an N-bit value and shifts it out MSB first,
//! one bit per enabled tick.

/// Accumulates incoming bits into the low `width` bits of a `u32`.
#[derive(Debug, Clone, Copy)]
pub struct BitAccumulator {
    value: u32,
    mask: u32,
}

impl BitAccumulator {
    pub fn new(width: u32) -> Self {
        assert!((1..=32).contains(&width), "accumulator width must be 1..=32");
        Self {
            value: 0,
            mask: u32::MAX >> (32 - width),
        }
    }

    #[inline(always)]
    pub fn shift_in(&mut self, bit: bool) {
        self.value = ((self.value << 1) | bit as u32) & self.mask;
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn clear(&mut self) {
        self.value = 0;
    }
}

/// Shifts a loaded pattern out MSB first.
///
/// With `rotate` set, every shifted-out bit re-enters at the LSB so the
/// pattern repeats indefinitely; otherwise the register drains and reports
/// itself empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitSerializer {
    value: u32,
    width: u32,
    remaining: u32,
    rotate: bool,
}

impl BitSerializer {
    pub fn new(rotate: bool) -> Self {
        Self {
            rotate,
            ..Default::default()
        }
    }

    pub fn load(&mut self, value: u32, width: u32) {
        assert!((1..=32).contains(&width), "serializer width must be 1..=32");
        self.value = value & (u32::MAX >> (32 - width));
        self.width = width;
        self.remaining = width;
    }

    /// Bits still to be shifted out before the register needs reloading.
    #[inline(always)]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    #[inline(always)]
    pub fn shift_out(&mut self) -> Option<bool> {
        if self.remaining == 0 {
            return None;
        }

        let msb = self.width - 1;
        let bit = (self.value >> msb) & 1 == 1;
        let low = if self.rotate { bit as u32 } else { 0 };
        self.value = ((self.value << 1) & (u32::MAX >> (32 - self.width))) | low;

        if self.rotate {
            self.remaining = if self.remaining == 1 {
                self.width
            } else {
                self.remaining - 1
            };
        } else {
            self.remaining -= 1;
        }

        Some(bit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_keeps_last_width_bits() {
        let mut acc = BitAccumulator::new(8);
        for bit in [1, 0, 1, 1, 0, 1] {
            acc.shift_in(bit == 1);
        }
        assert_eq!(acc.value(), 0b101101);

        for _ in 0..13 {
            acc.shift_in(true);
            acc.shift_in(false);
        }
        assert_eq!(acc.value(), 0b1010_1010);

        acc.clear();
        assert_eq!(acc.value(), 0);
    }

    #[test]
    fn serializer_drains_msb_first() {
        let mut sr = BitSerializer::new(false);
        sr.load(0xAA, 8);

        let bits = std::iter::from_fn(|| sr.shift_out())
            .map(|b| b as u8)
            .collect::<Vec<_>>();
        assert_eq!(bits, [1, 0, 1, 0, 1, 0, 1, 0]);
        assert!(sr.is_empty());
        assert_eq!(sr.shift_out(), None);
    }

    #[test]
    fn serializer_rotates() {
        let mut sr = BitSerializer::new(true);
        sr.load(0b1000_0000, 8);

        let bits = (0..16)
            .map(|_| sr.shift_out().unwrap() as u8)
            .collect::<Vec<_>>();
        assert_eq!(bits, [1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(sr.remaining(), 8);
    }

    #[test]
    fn serializer_reload_mid_pattern() {
        let mut sr = BitSerializer::new(false);
        sr.load(0x55, 8);
        sr.shift_out();
        sr.shift_out();
        assert_eq!(sr.remaining(), 6);

        sr.load(0b101, 3);
        assert_eq!(sr.remaining(), 3);
        assert_eq!(sr.shift_out(), Some(true));
        assert_eq!(sr.shift_out(), Some(false));
        assert_eq!(sr.shift_out(), Some(true));
        assert!(sr.is_empty());
    }
}

//! NRZI line coding.
//!
//! A `1` bit is carried as a transition of the line level, a `0` bit as no
//! transition. Both directions are pure per-tick functions; [`NrziEncoder`]
//! only remembers the previously driven level.

/// Decodes one bit from two consecutive line levels.
#[inline(always)]
pub const fn decode(previous: bool, current: bool) -> bool {
    previous ^ current
}

/// Encodes one bit against the previously driven line level.
#[inline(always)]
pub const fn encode(previous: bool, bit: bool) -> bool {
    if bit { !previous } else { previous }
}

/// Line driver holding the last output level.
#[derive(Debug, Default, Clone, Copy)]
pub struct NrziEncoder {
    level: bool,
}

impl NrziEncoder {
    pub fn with_level(level: bool) -> Self {
        Self { level }
    }

    #[inline(always)]
    pub fn push(&mut self, bit: bool) -> bool {
        self.level = encode(self.level, bit);
        self.level
    }
}

/// Encodes a whole bit sequence, starting from `initial_level`.
///
/// The output has one level per input bit; the initial level itself is not
/// emitted.
pub fn encode_bits(bits: &[bool], initial_level: bool) -> Vec<bool> {
    let mut encoder = NrziEncoder::with_level(initial_level);
    bits.iter().map(|&bit| encoder.push(bit)).collect()
}

/// Decodes a whole level sequence, assuming `initial_level` preceded it.
pub fn decode_levels(levels: &[bool], initial_level: bool) -> Vec<bool> {
    levels
        .iter()
        .scan(initial_level, |previous, &level| {
            let bit = decode(*previous, level);
            *previous = level;
            Some(bit)
        })
        .collect()
}

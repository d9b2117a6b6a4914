//! Frame layout and per-frame value types.
//!
//! A frame is 256 bit cells: a 16-bit preamble (sync, ten zeros, sync, four
//! user bits) followed by eight 30-bit channel spans. Each span carries a
//! 24-bit sample as six nibbles, every nibble preceded by a marker bit of 1.

use std::fmt::Display;

use log::debug;

use crate::process::{CHANNELS, HEADER_BITS, NIBBLES_PER_SAMPLE, SAMPLE_BITS};
use crate::utils::errors::TransmitError;
use crate::utils::shift_register::BitSerializer;

pub const SAMPLE_MASK: u32 = 0x00FF_FFFF;

/// Preamble without user bits: `1 0000000000 1 ----`.
const PREAMBLE_PATTERN: u32 = 0b1000_0000_0001_0000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelIndex(u8);

impl ChannelIndex {
    pub const FIRST: Self = Self(0);
    pub const LAST: Self = Self(CHANNELS as u8 - 1);

    pub const fn new(index: u8) -> Option<Self> {
        if (index as usize) < CHANNELS {
            Some(Self(index))
        } else {
            None
        }
    }

    #[inline(always)]
    pub const fn get(self) -> u8 {
        self.0
    }

    #[inline(always)]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    pub fn all() -> impl Iterator<Item = Self> {
        (0..CHANNELS as u8).map(Self)
    }

    pub const fn next(self) -> Option<Self> {
        Self::new(self.0 + 1)
    }
}

impl TryFrom<u8> for ChannelIndex {
    type Error = TransmitError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(TransmitError::InvalidChannel(value))
    }
}

impl Display for ChannelIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Four auxiliary bits carried in every preamble.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct UserBits(u8);

impl UserBits {
    pub const fn new(value: u8) -> Self {
        Self(value & 0xF)
    }

    #[inline(always)]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl Display for UserBits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04b}", self.0)
    }
}

/// Interprets a 24-bit sample as two's complement.
#[inline(always)]
pub const fn sign_extend(sample: u32) -> i32 {
    ((sample << 8) as i32) >> 8
}

/// Truncates a PCM value to its 24-bit wire representation.
#[inline(always)]
pub const fn from_pcm(value: i32) -> u32 {
    value as u32 & SAMPLE_MASK
}

/// The 16 preamble cells as a right-aligned pattern, first cell in the MSB.
#[inline(always)]
pub const fn expand_header(user_bits: UserBits) -> u32 {
    PREAMBLE_PATTERN | user_bits.value() as u32
}

/// The 30 cells of one channel span as a right-aligned pattern, first cell in
/// the MSB.
pub const fn expand_sample(sample: u32) -> u32 {
    let mut expanded = 0;
    let mut nibble = 0;
    while nibble < NIBBLES_PER_SAMPLE {
        let shift = 4 * (NIBBLES_PER_SAMPLE - 1 - nibble);
        let data = (sample >> shift) & 0xF;
        expanded = (expanded << 5) | 0x10 | data;
        nibble += 1;
    }
    expanded
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Frame {
    pub user_bits: UserBits,
    pub samples: [u32; CHANNELS],
}

impl Frame {
    pub fn new(user_bits: UserBits, samples: [u32; CHANNELS]) -> Self {
        Self {
            user_bits,
            samples: samples.map(|s| s & SAMPLE_MASK),
        }
    }

    pub fn sample(&self, channel: ChannelIndex) -> u32 {
        self.samples[channel.as_usize()]
    }

    pub fn pcm(&self) -> [i32; CHANNELS] {
        self.samples.map(sign_extend)
    }

    /// The frame's 256 bit cells in transmission order.
    pub fn to_bits(&self) -> Vec<bool> {
        let mut bits = Vec::with_capacity(crate::process::BITS_PER_FRAME);
        let mut serializer = BitSerializer::new(false);

        serializer.load(expand_header(self.user_bits), HEADER_BITS);
        bits.extend(std::iter::from_fn(|| serializer.shift_out()));

        for &sample in &self.samples {
            serializer.load(expand_sample(sample), SAMPLE_BITS);
            bits.extend(std::iter::from_fn(|| serializer.shift_out()));
        }

        bits
    }
}

/// Groups per-channel strobes back into whole frames.
///
/// Strobes must arrive for channels 0 through 7 in order; anything else drops
/// the partial frame.
#[derive(Debug, Default)]
pub struct FrameCollector {
    samples: [u32; CHANNELS],
    next: Option<ChannelIndex>,
    dropped: u64,
}

impl FrameCollector {
    pub fn push(
        &mut self,
        channel: ChannelIndex,
        sample: u32,
        user_bits: UserBits,
    ) -> Option<Frame> {
        let expected = self.next.unwrap_or(ChannelIndex::FIRST);

        if channel != expected {
            if self.next.is_some() {
                debug!("Dropping partial frame: expected channel {expected}, got {channel}");
                self.dropped += 1;
            }
            self.next = None;
            if channel != ChannelIndex::FIRST {
                return None;
            }
        }

        self.samples[channel.as_usize()] = sample;
        self.next = channel.next();

        if channel == ChannelIndex::LAST {
            Some(Frame::new(user_bits, self.samples))
        } else {
            None
        }
    }

    /// Drops any partial frame.
    pub fn reset(&mut self) {
        if self.next.is_some() {
            self.dropped += 1;
        }
        self.next = None;
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(i: u8) -> ChannelIndex {
        ChannelIndex::new(i).unwrap()
    }

    #[test]
    fn channel_index_bounds() {
        assert!(ChannelIndex::new(7).is_some());
        assert!(ChannelIndex::new(8).is_none());
        assert_eq!(
            ChannelIndex::try_from(9u8),
            Err(TransmitError::InvalidChannel(9))
        );
        assert_eq!(ChannelIndex::LAST.next(), None);
        assert_eq!(ChannelIndex::all().count(), CHANNELS);
    }

    #[test]
    fn sample_pattern_places_markers() {
        let expanded = expand_sample(0x123456);
        assert_eq!(expanded, 0b10001_10010_10011_10100_10101_10110);
        assert_eq!(expanded >> SAMPLE_BITS, 0);
        assert_eq!(expand_sample(0), 0b10000_10000_10000_10000_10000_10000);
    }

    #[test]
    fn header_pattern() {
        assert_eq!(expand_header(UserBits::new(0b0101)), 0b1000000000010101);
        assert_eq!(UserBits::new(0xFA).value(), 0xA);
    }

    #[test]
    fn frame_bits_layout() {
        let frame = Frame::new(UserBits::new(0b1001), [0xFFFFFF; CHANNELS]);
        let bits = frame.to_bits();

        assert_eq!(bits.len(), crate::process::BITS_PER_FRAME);
        assert!(bits[0] && bits[11]);
        assert!(bits[1..11].iter().all(|&b| !b));
        assert_eq!(&bits[12..16], &[true, false, false, true]);
        assert!(bits[16..].iter().all(|&b| b));
    }

    #[test]
    fn markers_every_fifth_cell() {
        let frame = Frame::new(UserBits::default(), [0; CHANNELS]);
        let bits = frame.to_bits();
        for (i, &bit) in bits[16..].iter().enumerate() {
            assert_eq!(bit, i % 5 == 0, "cell {}", i + 16);
        }
    }

    #[test]
    fn pcm_conversion() {
        assert_eq!(sign_extend(0x800000), -0x800000);
        assert_eq!(sign_extend(0x7FFFFF), 0x7FFFFF);
        assert_eq!(sign_extend(0xFFFFFF), -1);
        assert_eq!(from_pcm(-1), 0xFFFFFF);
        assert_eq!(sign_extend(from_pcm(-12345)), -12345);
    }

    #[test]
    fn collector_groups_in_order() {
        let mut collector = FrameCollector::default();
        let user_bits = UserBits::new(3);

        for i in 0..7 {
            assert_eq!(collector.push(ch(i), i as u32, user_bits), None);
        }
        let frame = collector.push(ch(7), 7, user_bits).unwrap();
        assert_eq!(frame.samples, [0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(frame.user_bits, user_bits);
    }

    #[test]
    fn collector_drops_gaps() {
        let mut collector = FrameCollector::default();
        let user_bits = UserBits::default();

        collector.push(ch(0), 0, user_bits);
        collector.push(ch(1), 1, user_bits);
        // Channel 2 missing.
        assert_eq!(collector.push(ch(3), 3, user_bits), None);
        assert_eq!(collector.dropped(), 1);
        for i in 4..8 {
            assert_eq!(collector.push(ch(i), i as u32, user_bits), None);
        }

        // A fresh frame starting from channel 0 completes normally.
        let mut last = None;
        for i in 0..8 {
            last = collector.push(ch(i), 10 + i as u32, user_bits);
        }
        assert_eq!(last.unwrap().samples[7], 17);
    }
}

use crate::utils::errors::ConfigError;

/// Bit clock recovery from the preamble's silent run.
///
/// Provides [`BitClockRecovery`](clock::BitClockRecovery), which measures the
/// bit period and samples one recovered bit per bit cell.
pub mod clock;

/// Frame demultiplexing on the receive side.
///
/// Provides the [`FrameReceiver`](receive::FrameReceiver) state machine and the
/// per-tick [`Receiver`](receive::Receiver) composition.
pub mod receive;

/// Frame assembly and serialization on the transmit side.
///
/// Provides the control-rate [`FrameAssembler`](transmit::FrameAssembler), the
/// line-rate [`LineSerializer`](transmit::LineSerializer) and the combined
/// [`Transmitter`](transmit::Transmitter).
pub mod transmit;

/// Bulk decoding of sampled line levels into frames.
pub mod decode;

/// Bulk encoding of frames into line levels.
pub mod encode;

pub const CHANNELS: usize = 8;
pub const BITS_PER_FRAME: usize = 256;
pub const HEADER_BITS: u32 = 16;
pub const SAMPLE_BITS: u32 = 30;
pub const NIBBLES_PER_SAMPLE: u32 = 6;
/// Zero cells between the two sync cells of a preamble.
pub const SYNC_ZEROS: u32 = 10;
/// One header entry plus one entry per channel.
pub const FRAME_ENTRIES: usize = CHANNELS + 1;

/// The slowest supported sample rate; bit timing thresholds derive from it.
pub const BASE_SAMPLE_RATE: u32 = 44_100;
pub const SUPPORTED_SAMPLE_RATES: [u32; 2] = [44_100, 48_000];

/// Fewest sampling ticks per line bit at which bit recovery still has margin.
pub const MIN_TICKS_PER_BIT: u64 = 4;

/// Line bit rate for a sample rate.
pub fn line_rate(sample_rate: u32) -> Result<u64, ConfigError> {
    if !SUPPORTED_SAMPLE_RATES.contains(&sample_rate) {
        return Err(ConfigError::UnsupportedSampleRate(sample_rate));
    }

    Ok(sample_rate as u64 * BITS_PER_FRAME as u64)
}

/// Checks that a sampling clock can recover the line rate of `sample_rate`.
pub fn check_clock(clock_hz: u64, sample_rate: u32) -> Result<(), ConfigError> {
    if clock_hz == 0 {
        return Err(ConfigError::ZeroClockRate);
    }

    let line_hz = line_rate(sample_rate)?;
    if clock_hz < line_hz * MIN_TICKS_PER_BIT {
        return Err(ConfigError::ClockTooSlow { clock_hz, line_hz });
    }

    Ok(())
}

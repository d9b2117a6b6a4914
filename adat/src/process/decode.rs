use std::collections::VecDeque;

use log::{Level, info};

use crate::log_or_err;
use crate::process::receive::Receiver;
use crate::structs::frame::{Frame, FrameCollector};
use crate::utils::errors::{ConfigError, ReceiveError};
use crate::utils::scheduler::{Domain, DomainScheduler};

/// Resamples line levels given one per line bit onto a faster sampling clock.
///
/// Each sampling tick sees the level of the line cell in progress at that
/// instant, with the tick/cell ratio kept exact.
#[derive(Debug, Clone)]
pub struct Oversampler {
    scheduler: DomainScheduler,
}

impl Oversampler {
    pub fn new(line_hz: u64, clock_hz: u64) -> Result<Self, ConfigError> {
        Ok(Self {
            scheduler: DomainScheduler::new(line_hz, clock_hz)?,
        })
    }

    /// Appends the sampling ticks covered by one line cell.
    pub fn push(&mut self, level: bool, out: &mut Vec<bool>) {
        // The line cell starts first on ties.
        self.scheduler.next();
        while self.scheduler.peek() == Domain::Second {
            self.scheduler.next();
            out.push(level);
        }
    }

    pub fn expand(&mut self, levels: &[bool]) -> Vec<bool> {
        let mut out = Vec::new();
        for &level in levels {
            self.push(level, &mut out);
        }
        out
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub ticks: u64,
    pub frames: u64,
    pub lock_acquisitions: u64,
    pub lock_losses: u64,
    pub sync_losses: u64,
    pub partial_frames: u64,
}

/// Decodes line levels sampled at the receiver clock into frames.
///
/// ```rust,no_run
/// use adat::process::decode::LineDecoder;
///
/// let mut decoder = LineDecoder::new(100_000_000, 48_000)?;
/// let levels: Vec<bool> = Vec::new(); // one level per sampling tick
///
/// decoder.push_levels(&levels);
/// decoder.flush();
///
/// for frame in &mut decoder {
///     let frame = frame?;
///     println!("user bits {}, channel 0 = {:06X}", frame.user_bits, frame.samples[0]);
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct LineDecoder {
    receiver: Receiver,
    collector: FrameCollector,
    levels: VecDeque<bool>,
    last_level: bool,
    invalid_frame: bool,
    flush_pending: bool,
    was_locked: bool,
    stats: DecodeStats,
    pub fail_level: Level,
}

impl LineDecoder {
    pub fn new(clock_hz: u64, sample_rate: u32) -> Result<Self, ConfigError> {
        Ok(Self {
            receiver: Receiver::new(clock_hz, sample_rate)?,
            collector: FrameCollector::default(),
            levels: VecDeque::with_capacity(1 << 16),
            last_level: false,
            invalid_frame: false,
            flush_pending: false,
            was_locked: false,
            stats: DecodeStats::default(),
            fail_level: Level::Error,
        })
    }

    pub fn set_fail_level(&mut self, level: Level) {
        self.fail_level = level;
    }

    /// Holds the external invalid-frame input at `invalid` for the ticks that
    /// follow.
    pub fn set_invalid_frame(&mut self, invalid: bool) {
        self.invalid_frame = invalid;
    }

    pub fn push_levels(&mut self, levels: &[bool]) {
        if let Some(&last) = levels.last() {
            self.last_level = last;
        }
        self.levels.extend(levels);
    }

    /// Marks the end of the input: once the pushed levels run out, the line
    /// is held at its last level just long enough for the final cell to be
    /// sampled.
    pub fn flush(&mut self) {
        self.flush_pending = true;
    }

    pub fn stats(&self) -> DecodeStats {
        DecodeStats {
            partial_frames: self.collector.dropped(),
            ..self.stats
        }
    }

    pub fn is_locked(&self) -> bool {
        self.was_locked
    }

    fn report(&self, err: ReceiveError) -> Result<(), ReceiveError> {
        log_or_err!(self, Level::Warn, err);
        Ok(())
    }
}

impl Iterator for LineDecoder {
    type Item = Result<Frame, ReceiveError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(level) = self.levels.pop_front() {
            let tick = self.stats.ticks;
            self.stats.ticks += 1;

            let out = self.receiver.step(level, self.invalid_frame);

            if out.locked != self.was_locked {
                self.was_locked = out.locked;
                if out.locked {
                    self.stats.lock_acquisitions += 1;
                    info!("Locked to line at tick {tick}");
                } else {
                    self.stats.lock_losses += 1;
                    self.collector.reset();
                    if let Err(err) = self.report(ReceiveError::LockLost(tick)) {
                        return Some(Err(err));
                    }
                }
            }

            if let Some(reason) = out.misaligned {
                self.stats.sync_losses += 1;
                self.collector.reset();
                if let Err(err) = self.report(ReceiveError::SyncLost { tick, reason }) {
                    return Some(Err(err));
                }
            }

            let Some((channel, sample)) = out.strobe else {
                continue;
            };
            if let Some(frame) = self.collector.push(channel, sample, out.user_bits) {
                self.stats.frames += 1;
                return Some(Ok(frame));
            }
        }

        if self.flush_pending {
            self.flush_pending = false;
            // Half a bit period: the final cell gets sampled, the one after it does not.
            let hold = (self.receiver.clock().period_q8() >> 9) as usize;
            if hold > 0 {
                self.levels.extend(std::iter::repeat_n(self.last_level, hold));
                return self.next();
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{CHANNELS, line_rate};
    use crate::structs::frame::UserBits;
    use crate::utils::nrzi::encode_bits;

    const USER_BITS: UserBits = UserBits::new(0b0101);

    fn numbered_frame(index: u32) -> Frame {
        let mut samples = [0; CHANNELS];
        for (channel, sample) in samples.iter_mut().enumerate() {
            *sample = (channel as u32) << 20 | index;
        }
        Frame::new(USER_BITS, samples)
    }

    /// A silent frame, then sixteen numbered frames with a 64-bit gap after
    /// the first.
    fn interrupted_stream() -> Vec<bool> {
        let mut bits = Frame::new(USER_BITS, [0; CHANNELS]).to_bits();
        bits.extend(numbered_frame(0).to_bits());
        bits.extend([false; 64]);
        for index in 1..16 {
            bits.extend(numbered_frame(index).to_bits());
        }
        bits
    }

    fn line_levels(bits: &[bool]) -> Vec<bool> {
        let mut levels = vec![true];
        levels.extend(encode_bits(bits, true));
        levels
    }

    fn decode(
        levels: &[bool],
        clock_hz: u64,
        sample_rate: u32,
    ) -> anyhow::Result<(Vec<Frame>, DecodeStats)> {
        let mut oversampler = Oversampler::new(line_rate(sample_rate)?, clock_hz)?;
        let mut decoder = LineDecoder::new(clock_hz, sample_rate)?;

        decoder.push_levels(&oversampler.expand(levels));
        decoder.flush();
        let frames = (&mut decoder).collect::<Result<Vec<_>, _>>()?;
        Ok((frames, decoder.stats()))
    }

    #[test]
    fn oversampler_keeps_exact_ratio() -> anyhow::Result<()> {
        let mut oversampler = Oversampler::new(3, 10)?;
        let out = oversampler.expand(&[true, false, true]);
        assert_eq!(out.len(), 10);
        assert_eq!(out, [true, true, true, true, false, false, false, true, true, true]);
        Ok(())
    }

    #[test]
    fn interrupted_stream_loses_one_frame() -> anyhow::Result<()> {
        let levels = line_levels(&interrupted_stream());

        for (clock_hz, sample_rate) in [
            (100_000_000, 48_000),
            (100_000_000, 44_100),
            (50_000_000, 48_000),
            (50_000_000, 44_100),
        ] {
            let (frames, stats) = decode(&levels, clock_hz, sample_rate)?;

            let expected = [0]
                .into_iter()
                .chain(2..16)
                .map(numbered_frame)
                .collect::<Vec<_>>();
            assert_eq!(frames, expected, "{clock_hz} Hz / {sample_rate} Hz");
            assert_eq!(stats.lock_acquisitions, 2);
            assert_eq!(stats.lock_losses, 1);
        }
        Ok(())
    }

    #[test]
    fn corrupted_marker_loses_only_its_frame() -> anyhow::Result<()> {
        let mut bits = Frame::new(USER_BITS, [0; CHANNELS]).to_bits();
        for index in 0..16 {
            let mut frame_bits = numbered_frame(index).to_bits();
            if index == 5 {
                // Marker in front of channel 3's top nibble.
                frame_bits[16 + 3 * 30] = false;
            }
            bits.extend(frame_bits);
        }

        let (frames, stats) = decode(&line_levels(&bits), 100_000_000, 48_000)?;
        let expected = (0..16)
            .filter(|&i| i != 5)
            .map(numbered_frame)
            .collect::<Vec<_>>();
        assert_eq!(frames, expected);
        assert_eq!(stats.sync_losses, 1);
        assert_eq!(stats.lock_acquisitions, 1);
        assert_eq!(stats.lock_losses, 0);
        Ok(())
    }

    #[test]
    fn polarity_does_not_matter() -> anyhow::Result<()> {
        let mut bits = Frame::new(USER_BITS, [0; CHANNELS]).to_bits();
        for index in 0..4 {
            bits.extend(numbered_frame(index).to_bits());
        }
        let inverted = line_levels(&bits)
            .into_iter()
            .map(|level| !level)
            .collect::<Vec<_>>();

        let (frames, _) = decode(&inverted, 100_000_000, 44_100)?;
        assert_eq!(frames, (0..4).map(numbered_frame).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn strict_mode_reports_sync_loss() -> anyhow::Result<()> {
        let levels = line_levels(&interrupted_stream());
        let mut oversampler = Oversampler::new(line_rate(48_000)?, 100_000_000)?;
        let mut decoder = LineDecoder::new(100_000_000, 48_000)?;
        decoder.set_fail_level(Level::Warn);
        decoder.push_levels(&oversampler.expand(&levels));

        let first = decoder.next().unwrap()?;
        assert_eq!(first, numbered_frame(0));
        assert!(matches!(
            decoder.next(),
            Some(Err(ReceiveError::SyncLost { .. }))
        ));
        Ok(())
    }

    #[test]
    fn invalid_frame_input_drops_lock() -> anyhow::Result<()> {
        let mut bits = Frame::new(USER_BITS, [0; CHANNELS]).to_bits();
        for index in 0..3 {
            bits.extend(numbered_frame(index).to_bits());
        }
        let mut oversampler = Oversampler::new(line_rate(48_000)?, 100_000_000)?;
        let ticks = oversampler.expand(&line_levels(&bits));

        let mut decoder = LineDecoder::new(100_000_000, 48_000)?;
        // Raise invalid-frame a little after frame 0 has been emitted.
        let cut = ticks.len() * 2 / 4 + 200;
        decoder.push_levels(&ticks[..cut]);
        let before = (&mut decoder).collect::<Result<Vec<_>, _>>()?;
        assert_eq!(before, [numbered_frame(0)]);

        decoder.set_invalid_frame(true);
        decoder.push_levels(&ticks[cut..cut + 16]);
        assert_eq!((&mut decoder).count(), 0);
        assert!(!decoder.is_locked());
        assert_eq!(decoder.stats().lock_losses, 1);
        Ok(())
    }
}

use std::collections::VecDeque;

use anyhow::Result;
use log::{debug, trace};

use crate::process::transmit::{ChannelWrite, TransmitStats, Transmitter};
use crate::process::{BITS_PER_FRAME, line_rate};
use crate::structs::frame::{ChannelIndex, Frame, UserBits};
use crate::utils::scheduler::{Domain, DomainScheduler};

/// Runs the transmit path over whole frames, interleaving the control-rate
/// and line-rate halves on one thread.
///
/// Frames are queued with [`push_frame`](Self::push_frame); [`run`](Self::run)
/// steps both domains until every queued write has been accepted, and
/// [`finish`](Self::finish) drains the line up to the end of the last frame.
/// Between calls the line keeps whatever is buffered, so feeding a long
/// stream in pieces produces the same line as feeding it at once.
#[derive(Debug)]
pub struct LineEncoder {
    transmitter: Transmitter,
    scheduler: DomainScheduler,
    pending: VecDeque<(UserBits, ChannelWrite)>,
    frames_pushed: u64,
    /// Line bits that belong to frames, as opposed to underflow idle bits.
    framed_bits: u64,
}

impl LineEncoder {
    pub fn new(control_hz: u64, sample_rate: u32, queue_capacity: usize) -> Result<Self> {
        let line_hz = line_rate(sample_rate)?;
        Ok(Self {
            transmitter: Transmitter::new(queue_capacity)?,
            scheduler: DomainScheduler::new(control_hz, line_hz)?,
            pending: VecDeque::new(),
            frames_pushed: 0,
            framed_bits: 0,
        })
    }

    pub fn push_frame(&mut self, frame: &Frame) {
        self.pending.extend(
            ChannelIndex::all()
                .map(|channel| (frame.user_bits, ChannelWrite::new(channel, frame.sample(channel)))),
        );
        self.frames_pushed += 1;
    }

    pub fn stats(&self) -> TransmitStats {
        self.transmitter.stats()
    }

    fn control_tick(&mut self) -> Result<()> {
        let write = if self.transmitter.ready() {
            self.pending.pop_front().map(|(user_bits, write)| {
                if write.channel == ChannelIndex::FIRST {
                    self.transmitter.assembler().set_user_bits(user_bits);
                }
                write
            })
        } else {
            None
        };

        self.transmitter.control_step(write)?;
        Ok(())
    }

    fn line_tick(&mut self, out: &mut Vec<bool>) {
        out.push(self.transmitter.line_step());
        if !self.transmitter.underflow() {
            self.framed_bits += 1;
        }
    }

    fn flushed(&self) -> bool {
        self.pending.is_empty()
            && self.transmitter.stats().frames_committed == self.frames_pushed
            && self.transmitter.ready()
    }

    /// Steps both domains until every pushed frame sits in the elastic queue.
    /// Line levels produced meanwhile are appended to `out`.
    pub fn run(&mut self, out: &mut Vec<bool>) -> Result<()> {
        while !self.flushed() {
            match self.scheduler.next() {
                Some(Domain::First) => self.control_tick()?,
                Some(Domain::Second) => self.line_tick(out),
                None => break,
            }
        }
        Ok(())
    }

    /// Runs until the last pushed frame has left the line.
    ///
    /// Once the queue holds everything, only the line domain advances, so no
    /// keep-alive frame is appended after the data.
    pub fn finish(&mut self, out: &mut Vec<bool>) -> Result<()> {
        self.run(out)?;

        let stats = self.transmitter.stats();
        let target = (stats.frames_committed + stats.keep_alive_frames) * BITS_PER_FRAME as u64;
        debug!(
            "Draining line: {} frames, {} keep-alive, {} underflow ticks",
            stats.frames_committed, stats.keep_alive_frames, stats.underflow_ticks
        );

        while self.framed_bits < target {
            if self.scheduler.next() == Some(Domain::Second) {
                self.line_tick(out);
            }
        }

        trace!("Line drained after {} levels", out.len());
        Ok(())
    }

    /// Encodes `frames` into line levels, one per line bit.
    pub fn encode(&mut self, frames: &[Frame]) -> Result<Vec<bool>> {
        let mut out = Vec::with_capacity((frames.len() + 1) * BITS_PER_FRAME);
        for frame in frames {
            self.push_frame(frame);
        }
        self.finish(&mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CHANNELS;
    use crate::process::decode::{LineDecoder, Oversampler};
    use crate::process::transmit::FrameAssembler;
    use crate::utils::elastic_queue::DEFAULT_CAPACITY;

    fn frames(count: u32) -> Vec<Frame> {
        (0..count)
            .map(|index| {
                let mut samples = [0; CHANNELS];
                for (channel, sample) in samples.iter_mut().enumerate() {
                    *sample = ((channel as u32 * 0x2F1B3) ^ (index * 0x9E37)) & 0xFF_FFFF;
                }
                Frame::new(UserBits::new(index as u8), samples)
            })
            .collect()
    }

    fn decode(levels: &[bool], clock_hz: u64, sample_rate: u32) -> anyhow::Result<Vec<Frame>> {
        let mut oversampler = Oversampler::new(line_rate(sample_rate)?, clock_hz)?;
        let mut decoder = LineDecoder::new(clock_hz, sample_rate)?;
        decoder.push_levels(&oversampler.expand(levels));
        decoder.flush();
        Ok(decoder.collect::<Result<Vec<_>, _>>()?)
    }

    #[test]
    fn round_trip_through_the_receiver() -> Result<()> {
        for (control_hz, sample_rate) in [(100_000_000, 48_000), (50_000_000, 44_100)] {
            let input = frames(12);
            let mut encoder = LineEncoder::new(control_hz, sample_rate, DEFAULT_CAPACITY)?;
            let levels = encoder.encode(&input)?;

            let stats = encoder.stats();
            assert_eq!(stats.frames_committed, 12);
            assert_eq!(stats.keep_alive_frames, 1);
            assert_eq!(stats.underflow_ticks, 0);
            assert_eq!(levels.len(), 13 * BITS_PER_FRAME);

            // The leading keep-alive frame trains the receiver.
            assert_eq!(decode(&levels, 100_000_000, sample_rate)?, input);
        }
        Ok(())
    }

    #[test]
    fn piecewise_feeding_matches_whole() -> Result<()> {
        let input = frames(6);

        let whole = LineEncoder::new(100_000_000, 48_000, DEFAULT_CAPACITY)?.encode(&input)?;

        let mut encoder = LineEncoder::new(100_000_000, 48_000, DEFAULT_CAPACITY)?;
        let mut pieces = Vec::new();
        for chunk in input.chunks(2) {
            for frame in chunk {
                encoder.push_frame(frame);
            }
            encoder.run(&mut pieces)?;
        }
        encoder.finish(&mut pieces)?;

        assert_eq!(pieces, whole);
        Ok(())
    }

    fn commit(assembler: &mut FrameAssembler, frame: &Frame) -> Result<()> {
        assembler.set_user_bits(frame.user_bits);
        for channel in ChannelIndex::all() {
            while !assembler.ready() {
                assembler.step(None)?;
            }
            assembler.step(Some(ChannelWrite::new(channel, frame.sample(channel))))?;
        }
        while !assembler.ready() {
            assembler.step(None)?;
        }
        Ok(())
    }

    #[test]
    fn single_underflow_does_not_corrupt_later_frames() -> Result<()> {
        let (mut assembler, mut serializer) = Transmitter::new(DEFAULT_CAPACITY)?.split();
        let input = frames(2);
        let mut levels = Vec::new();

        // Keep-alive plus the first frame.
        commit(&mut assembler, &input[0])?;
        levels.extend((0..2 * BITS_PER_FRAME).map(|_| serializer.step().level));

        let starved = serializer.step();
        assert!(starved.underflow);
        levels.push(starved.level);

        // The empty queue triggers another keep-alive ahead of the next frame.
        commit(&mut assembler, &input[1])?;
        let rest = (0..2 * BITS_PER_FRAME)
            .map(|_| serializer.step())
            .collect::<Vec<_>>();
        assert!(rest.iter().all(|out| !out.underflow));
        levels.extend(rest.iter().map(|out| out.level));
        assert_eq!(serializer.underflow_ticks(), 1);

        let decoded = decode(&levels, 100_000_000, 48_000)?;
        assert_eq!(
            decoded,
            [
                input[0],
                Frame::new(input[1].user_bits, [0; CHANNELS]),
                input[1]
            ]
        );
        Ok(())
    }
}

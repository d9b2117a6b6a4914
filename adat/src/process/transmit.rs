//! Transmit path.
//!
//! The [`FrameAssembler`] runs at the control rate: it buffers one channel
//! write per tick and, once a frame is committed, pushes a header and eight
//! samples into the elastic queue, one entry per tick. The [`LineSerializer`]
//! runs at the line rate: it expands queue entries into bit patterns and drives
//! the line through an NRZI encoder, one bit per tick.
//!
//! The two halves share nothing but the queue, so they can live on different
//! threads. [`Transmitter`] keeps both for callers stepping them together.

use anyhow::Result;
use log::{debug, trace, warn};

use crate::process::{CHANNELS, FRAME_ENTRIES, HEADER_BITS, SAMPLE_BITS};
use crate::structs::frame::{ChannelIndex, SAMPLE_MASK, UserBits, expand_header, expand_sample};
use crate::utils::elastic_queue::{Consumer, Producer, QueueEntry, elastic_queue};
use crate::utils::errors::TransmitError;
use crate::utils::nrzi::NrziEncoder;
use crate::utils::shift_register::BitSerializer;

const ALL_CHANNELS: u8 = 0xFF;

/// One control-rate write of a channel sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelWrite {
    pub channel: ChannelIndex,
    pub sample: u32,
    /// Commits the frame after this write.
    pub last: bool,
}

impl ChannelWrite {
    pub fn new(channel: ChannelIndex, sample: u32) -> Self {
        Self {
            channel,
            sample,
            last: channel == ChannelIndex::LAST,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    pub frames_committed: u64,
    pub keep_alive_frames: u64,
    pub rejected_frames: u64,
}

#[derive(Debug)]
struct Flush {
    entries: [QueueEntry; FRAME_ENTRIES],
    next: usize,
}

impl Flush {
    fn new(user_bits: UserBits, samples: &[u32; CHANNELS]) -> Self {
        let mut entries = [QueueEntry::Header(user_bits); FRAME_ENTRIES];
        for (entry, &sample) in entries[1..].iter_mut().zip(samples) {
            *entry = QueueEntry::Sample(sample);
        }
        Self { entries, next: 0 }
    }
}

/// Control-rate half of the transmitter.
#[derive(Debug)]
pub struct FrameAssembler {
    producer: Producer,
    samples: [u32; CHANNELS],
    written: u8,
    user_bits: UserBits,
    flush: Option<Flush>,
    stats: AssemblerStats,
}

impl FrameAssembler {
    fn new(producer: Producer) -> Self {
        Self {
            producer,
            samples: [0; CHANNELS],
            written: 0,
            user_bits: UserBits::default(),
            flush: None,
            stats: AssemblerStats::default(),
        }
    }

    /// Whether a write offered on the next tick would be accepted.
    pub fn ready(&self) -> bool {
        self.flush.is_none() && self.producer.free() >= FRAME_ENTRIES
    }

    /// User bits for the next committed frame and for keep-alive frames.
    pub fn set_user_bits(&mut self, user_bits: UserBits) {
        self.user_bits = user_bits;
    }

    /// Entries currently waiting in the queue.
    pub fn fill_level(&self) -> usize {
        self.producer.len()
    }

    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    fn discard(&mut self, err: TransmitError) -> TransmitError {
        debug!("Discarding partial frame: {err}");
        self.written = 0;
        self.stats.rejected_frames += 1;
        err
    }

    fn accept(&mut self, write: ChannelWrite) -> Result<(), TransmitError> {
        if !self.ready() {
            return Err(TransmitError::NotReady);
        }

        let bit = 1 << write.channel.get();
        if self.written & bit != 0 {
            return Err(self.discard(TransmitError::ChannelRepeated(write.channel.get())));
        }

        self.samples[write.channel.as_usize()] = write.sample & SAMPLE_MASK;
        self.written |= bit;

        if write.last {
            if self.written != ALL_CHANNELS {
                let written = self.written;
                return Err(self.discard(TransmitError::ChannelSkipped(written)));
            }

            trace!("Committing frame, user bits {}", self.user_bits);
            self.flush = Some(Flush::new(self.user_bits, &self.samples));
            self.written = 0;
            self.stats.frames_committed += 1;
        }

        Ok(())
    }

    fn push_pending(&mut self) {
        let Some(flush) = self.flush.as_mut() else {
            return;
        };

        if self.producer.push(flush.entries[flush.next]).is_ok() {
            flush.next += 1;
            if flush.next == FRAME_ENTRIES {
                self.flush = None;
            }
        }
    }

    /// Advances one control-rate tick, optionally with a channel write.
    ///
    /// A rejected write discards the partial frame but leaves the assembler
    /// running; the error is returned for the caller to log or propagate.
    pub fn step(&mut self, write: Option<ChannelWrite>) -> Result<(), TransmitError> {
        let accepted = write.map_or(Ok(()), |write| self.accept(write));

        if self.flush.is_none() && self.producer.is_empty() {
            trace!("Queue starved, pushing keep-alive frame");
            self.flush = Some(Flush::new(self.user_bits, &[0; CHANNELS]));
            self.stats.keep_alive_frames += 1;
        }

        self.push_pending();
        accepted
    }
}

/// What the line-rate half produced on one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineOutput {
    pub level: bool,
    /// No entry was available when one was due; the idle bit was sent.
    pub underflow: bool,
}

/// Line-rate half of the transmitter.
#[derive(Debug)]
pub struct LineSerializer {
    consumer: Consumer,
    serializer: BitSerializer,
    encoder: NrziEncoder,
    underflow_ticks: u64,
}

impl LineSerializer {
    fn new(consumer: Consumer) -> Self {
        Self {
            consumer,
            serializer: BitSerializer::new(false),
            encoder: NrziEncoder::default(),
            underflow_ticks: 0,
        }
    }

    pub fn underflow_ticks(&self) -> u64 {
        self.underflow_ticks
    }

    /// Whether the current entry has been shifted out completely.
    pub fn is_idle(&self) -> bool {
        self.serializer.is_empty()
    }

    pub fn step(&mut self) -> LineOutput {
        let mut underflow = false;

        if self.serializer.is_empty() {
            match self.consumer.pop() {
                Some(QueueEntry::Header(user_bits)) => {
                    self.serializer.load(expand_header(user_bits), HEADER_BITS)
                }
                Some(QueueEntry::Sample(sample)) => {
                    self.serializer.load(expand_sample(sample), SAMPLE_BITS)
                }
                None => {
                    if self.underflow_ticks == 0 {
                        warn!("Transmit queue underflow, holding the line");
                    }
                    underflow = true;
                    self.underflow_ticks += 1;
                }
            }
        }

        let bit = self.serializer.shift_out().unwrap_or(false);
        LineOutput {
            level: self.encoder.push(bit),
            underflow,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransmitStats {
    pub frames_committed: u64,
    pub keep_alive_frames: u64,
    pub rejected_frames: u64,
    pub underflow_ticks: u64,
}

/// Both transmitter halves owned together.
#[derive(Debug)]
pub struct Transmitter {
    assembler: FrameAssembler,
    serializer: LineSerializer,
    underflow: bool,
}

impl Transmitter {
    pub fn new(queue_capacity: usize) -> Result<Self> {
        let (producer, consumer) = elastic_queue(queue_capacity)?;
        Ok(Self {
            assembler: FrameAssembler::new(producer),
            serializer: LineSerializer::new(consumer),
            underflow: false,
        })
    }

    /// Separates the halves for stepping on different threads.
    pub fn split(self) -> (FrameAssembler, LineSerializer) {
        (self.assembler, self.serializer)
    }

    pub fn assembler(&mut self) -> &mut FrameAssembler {
        &mut self.assembler
    }

    pub fn ready(&self) -> bool {
        self.assembler.ready()
    }

    pub fn fill_level(&self) -> usize {
        self.assembler.fill_level()
    }

    /// Underflow flag of the most recent line tick.
    pub fn underflow(&self) -> bool {
        self.underflow
    }

    pub fn control_step(&mut self, write: Option<ChannelWrite>) -> Result<(), TransmitError> {
        self.assembler.step(write)
    }

    pub fn line_step(&mut self) -> bool {
        let out = self.serializer.step();
        self.underflow = out.underflow;
        out.level
    }

    pub fn stats(&self) -> TransmitStats {
        let assembler = self.assembler.stats();
        TransmitStats {
            frames_committed: assembler.frames_committed,
            keep_alive_frames: assembler.keep_alive_frames,
            rejected_frames: assembler.rejected_frames,
            underflow_ticks: self.serializer.underflow_ticks(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    use crate::process::decode::{LineDecoder, Oversampler};
    use crate::process::{BITS_PER_FRAME, line_rate};
    use crate::structs::frame::Frame;
    use crate::utils::elastic_queue::DEFAULT_CAPACITY;
    use crate::utils::nrzi::decode_levels;

    fn write(channel: u8, sample: u32) -> Option<ChannelWrite> {
        Some(ChannelWrite::new(ChannelIndex::new(channel).unwrap(), sample))
    }

    fn commit_frame(tx: &mut Transmitter, user_bits: u8, samples: [u32; CHANNELS]) -> Result<()> {
        while !tx.ready() {
            tx.control_step(None)?;
        }
        tx.assembler().set_user_bits(UserBits::new(user_bits));
        for (i, &sample) in samples.iter().enumerate() {
            tx.control_step(write(i as u8, sample))?;
        }
        Ok(())
    }

    fn line_bits(tx: &mut Transmitter, count: usize) -> Vec<bool> {
        let levels = (0..count).map(|_| tx.line_step()).collect::<Vec<_>>();
        decode_levels(&levels, false)
    }

    #[test]
    fn keep_alive_then_committed_frame() -> Result<()> {
        let mut tx = Transmitter::new(DEFAULT_CAPACITY)?;
        let samples = [0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x80];

        // First tick finds the queue empty and starts a keep-alive frame.
        tx.control_step(None)?;
        assert!(!tx.ready());
        commit_frame(&mut tx, 0xA, samples)?;
        for _ in 0..FRAME_ENTRIES {
            tx.control_step(None)?;
        }
        assert_eq!(tx.fill_level(), 2 * FRAME_ENTRIES);

        let bits = line_bits(&mut tx, 2 * crate::process::BITS_PER_FRAME);
        assert_eq!(bits[..256], Frame::new(UserBits::new(0), [0; CHANNELS]).to_bits());
        assert_eq!(bits[256..], Frame::new(UserBits::new(0xA), samples).to_bits());

        let stats = tx.stats();
        assert_eq!(stats.frames_committed, 1);
        assert_eq!(stats.keep_alive_frames, 1);
        assert_eq!(stats.underflow_ticks, 0);
        Ok(())
    }

    #[test]
    fn not_ready_while_flushing() -> Result<()> {
        let mut tx = Transmitter::new(DEFAULT_CAPACITY)?;
        tx.control_step(None)?;
        assert_eq!(tx.control_step(write(0, 1)), Err(TransmitError::NotReady));
        Ok(())
    }

    #[test]
    fn repeated_and_skipped_channels_are_rejected() -> Result<()> {
        let mut tx = Transmitter::new(DEFAULT_CAPACITY)?;
        tx.control_step(None)?;
        while !tx.ready() {
            tx.control_step(None)?;
        }

        tx.control_step(write(0, 1))?;
        assert_eq!(
            tx.control_step(write(0, 2)),
            Err(TransmitError::ChannelRepeated(0))
        );

        for i in 0..7 {
            if i != 3 {
                tx.control_step(write(i, 1))?;
            }
        }
        assert_eq!(
            tx.control_step(write(7, 1)),
            Err(TransmitError::ChannelSkipped(0b1111_0111))
        );
        assert_eq!(tx.stats().rejected_frames, 2);
        assert_eq!(tx.stats().frames_committed, 0);

        // The assembler keeps running.
        commit_frame(&mut tx, 0, [5; CHANNELS])?;
        assert_eq!(tx.stats().frames_committed, 1);
        Ok(())
    }

    #[test]
    fn underflow_flags_one_tick_and_holds_line() -> Result<()> {
        let (mut assembler, mut serializer) = Transmitter::new(DEFAULT_CAPACITY)?.split();

        assembler.step(None)?;
        for _ in 0..FRAME_ENTRIES {
            assembler.step(None)?;
        }
        // Keep-alive frame queued; drain it completely.
        let mut outputs = (0..256).map(|_| serializer.step()).collect::<Vec<_>>();
        assert!(outputs.iter().all(|o| !o.underflow));

        let held = outputs.last().unwrap().level;
        let starved = serializer.step();
        assert!(starved.underflow);
        assert_eq!(starved.level, held);
        assert_eq!(serializer.underflow_ticks(), 1);

        // Refill: the next tick loads a header and is not flagged.
        assembler.step(None)?;
        outputs.clear();
        outputs.push(serializer.step());
        assert!(!outputs[0].underflow);
        assert_ne!(outputs[0].level, held, "header starts with a sync edge");
        assert_eq!(serializer.underflow_ticks(), 1);
        Ok(())
    }

    #[test]
    fn halves_run_on_separate_threads() -> Result<()> {
        let (mut assembler, mut serializer) = Transmitter::new(DEFAULT_CAPACITY)?.split();
        let input = (0..6u32)
            .map(|i| Frame::new(UserBits::new(i as u8), [i << 8 | 0x5A; CHANNELS]))
            .collect::<Vec<_>>();

        // One message per frame fully queued; the line side then sends one
        // frame's worth of bits, staying a frame behind the control side.
        let (queued_tx, queued_rx) = mpsc::channel();
        let frames = input.clone();
        let control = thread::spawn(move || -> Result<AssemblerStats> {
            for frame in &frames {
                while !assembler.ready() {
                    assembler.step(None)?;
                }
                assembler.set_user_bits(frame.user_bits);
                for channel in ChannelIndex::all() {
                    assembler.step(Some(ChannelWrite::new(channel, frame.sample(channel))))?;
                }
                while !assembler.ready() {
                    assembler.step(None)?;
                }
                queued_tx.send(())?;
            }
            Ok(assembler.stats())
        });

        let line = thread::spawn(move || {
            let mut levels = Vec::new();
            for () in queued_rx {
                levels.extend((0..BITS_PER_FRAME).map(|_| serializer.step().level));
            }
            levels.extend((0..BITS_PER_FRAME).map(|_| serializer.step().level));
            (levels, serializer)
        });

        let stats = control.join().expect("control thread")?;
        let (levels, serializer) = line.join().expect("line thread");

        assert_eq!(stats.frames_committed, 6);
        assert_eq!(stats.keep_alive_frames, 1);
        assert_eq!(serializer.underflow_ticks(), 0);
        assert!(serializer.is_idle());
        assert_eq!(levels.len(), 7 * BITS_PER_FRAME);

        let mut oversampler = Oversampler::new(line_rate(48_000)?, 100_000_000)?;
        let mut decoder = LineDecoder::new(100_000_000, 48_000)?;
        decoder.push_levels(&oversampler.expand(&levels));
        decoder.flush();
        assert_eq!(decoder.collect::<Result<Vec<_>, _>>()?, input);
        Ok(())
    }
}

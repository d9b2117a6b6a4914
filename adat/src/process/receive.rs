//! Receive path: frame demultiplexing.
//!
//! [`FrameReceiver`] consumes recovered bits and sync pulses from
//! [`BitClockRecovery`] and turns them into per-channel sample strobes.
//! [`Receiver`] wires the whole path together for one raw line level per
//! sampling tick.
//!
//! The frame cursor starts on the second sync cell, which is checked like any
//! marker. Cursor layout within one frame:
//!
//! | cursor     | content                                  |
//! |------------|------------------------------------------|
//! | 0          | second sync cell (must be 1)             |
//! | 1..=4      | user bits, MSB first                     |
//! | 5..=244    | eight 30-cell channel spans              |
//! | preamble   | sync cell, ten zeros, then the sync edge |

use log::{debug, trace};

use crate::process::clock::{BitClockRecovery, ClockOutput};
use crate::process::{CHANNELS, SAMPLE_BITS, SYNC_ZEROS};
use crate::structs::frame::{ChannelIndex, UserBits};
use crate::utils::edge::EdgeDetector;
use crate::utils::errors::ConfigError;
use crate::utils::nrzi;
use crate::utils::shift_register::BitAccumulator;
use crate::utils::synchronizer::Synchronizer;

const USER_BITS_END: u32 = 4;
const CHANNELS_START: u32 = USER_BITS_END + 1;
const FRAME_CELLS: u32 = CHANNELS_START + CHANNELS as u32 * SAMPLE_BITS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    WaitingLock,
    /// `training` frames are checked but their samples are not emitted.
    ReadingFrame { cursor: u32, training: bool },
    ReadingPreamble { seen_sync: bool, zeros: u32 },
}

/// One tick of frame demultiplexer output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameEvent {
    pub strobe: Option<(ChannelIndex, u32)>,
    /// Set on the tick alignment was lost, with the cause.
    pub misaligned: Option<&'static str>,
}

#[derive(Debug)]
pub struct FrameReceiver {
    state: ReceiverState,
    lock_edge: EdgeDetector,
    user_acc: BitAccumulator,
    sample_acc: BitAccumulator,
    user_bits: UserBits,
}

impl Default for FrameReceiver {
    fn default() -> Self {
        Self {
            state: ReceiverState::WaitingLock,
            lock_edge: EdgeDetector::default(),
            user_acc: BitAccumulator::new(4),
            sample_acc: BitAccumulator::new(24),
            user_bits: UserBits::default(),
        }
    }
}

impl FrameReceiver {
    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// User bits of the most recently received preamble.
    pub fn user_bits(&self) -> UserBits {
        self.user_bits
    }

    pub fn is_synced(&self) -> bool {
        self.state != ReceiverState::WaitingLock
    }

    fn lose_alignment(&mut self, event: &mut FrameEvent, reason: &'static str) {
        debug!("Frame alignment lost: {reason}");
        event.misaligned = Some(reason);
        self.state = ReceiverState::WaitingLock;
    }

    pub fn step(&mut self, clock: &ClockOutput) -> FrameEvent {
        let mut event = FrameEvent::default();
        let fresh_lock = self.lock_edge.step(clock.locked);

        if !clock.locked {
            self.state = ReceiverState::WaitingLock;
            return event;
        }

        if clock.sync {
            let aligned = matches!(
                self.state,
                ReceiverState::ReadingPreamble {
                    seen_sync: true,
                    zeros: SYNC_ZEROS
                }
            );
            if !aligned && self.state != ReceiverState::WaitingLock {
                debug!("Sync edge outside a preamble, realigning");
                event.misaligned = Some("sync edge outside a preamble");
            }

            if fresh_lock {
                trace!("Fresh lock, next frame is a training frame");
            }

            self.state = ReceiverState::ReadingFrame {
                cursor: 0,
                training: fresh_lock,
            };
            self.user_acc.clear();
            self.sample_acc.clear();
        }

        if let Some(bit) = clock.bit {
            self.on_bit(bit, &mut event);
        }

        event
    }

    fn on_bit(&mut self, bit: bool, event: &mut FrameEvent) {
        match self.state {
            ReceiverState::WaitingLock => {}

            ReceiverState::ReadingFrame { cursor, training } => {
                if cursor % 5 == 0 {
                    if !bit {
                        self.lose_alignment(event, "marker bit is zero");
                        return;
                    }
                } else if cursor <= USER_BITS_END {
                    self.user_acc.shift_in(bit);
                    if cursor == USER_BITS_END {
                        self.user_bits = UserBits::new(self.user_acc.value() as u8);
                    }
                } else {
                    self.sample_acc.shift_in(bit);
                    let offset = cursor - CHANNELS_START;
                    if offset % SAMPLE_BITS == SAMPLE_BITS - 1 {
                        let channel = ChannelIndex::new((offset / SAMPLE_BITS) as u8)
                            .unwrap_or(ChannelIndex::LAST);
                        let sample = self.sample_acc.value();
                        self.sample_acc.clear();

                        if !training {
                            trace!("Channel {channel}: {sample:06X}");
                            event.strobe = Some((channel, sample));
                        }
                    }
                }

                self.state = if cursor + 1 == FRAME_CELLS {
                    ReceiverState::ReadingPreamble {
                        seen_sync: false,
                        zeros: 0,
                    }
                } else {
                    ReceiverState::ReadingFrame {
                        cursor: cursor + 1,
                        training,
                    }
                };
            }

            ReceiverState::ReadingPreamble { seen_sync, zeros } => match (seen_sync, bit) {
                (false, true) => {
                    self.state = ReceiverState::ReadingPreamble {
                        seen_sync: true,
                        zeros,
                    }
                }
                (false, false) => self.lose_alignment(event, "missing leading sync bit"),
                (true, true) => self.lose_alignment(event, "one inside the sync run"),
                (true, false) if zeros >= SYNC_ZEROS => {
                    self.lose_alignment(event, "sync run longer than ten bits")
                }
                (true, false) => {
                    self.state = ReceiverState::ReadingPreamble {
                        seen_sync,
                        zeros: zeros + 1,
                    }
                }
            },
        }
    }
}

/// Everything the receive path reports for one sampling tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverOutput {
    pub strobe: Option<(ChannelIndex, u32)>,
    pub user_bits: UserBits,
    pub locked: bool,
    pub synced: bool,
    pub misaligned: Option<&'static str>,
}

/// The full receive path, stepped once per sampling tick.
#[derive(Debug)]
pub struct Receiver {
    line_sync: Synchronizer,
    invalid_sync: Synchronizer,
    last_level: bool,
    clock: BitClockRecovery,
    frames: FrameReceiver,
}

impl Receiver {
    pub fn new(clock_hz: u64, sample_rate: u32) -> Result<Self, ConfigError> {
        Ok(Self {
            line_sync: Synchronizer::default(),
            invalid_sync: Synchronizer::default(),
            last_level: false,
            clock: BitClockRecovery::new(clock_hz, sample_rate)?,
            frames: FrameReceiver::default(),
        })
    }

    pub fn clock(&self) -> &BitClockRecovery {
        &self.clock
    }

    pub fn step(&mut self, line_level: bool, invalid_frame: bool) -> ReceiverOutput {
        let level = self.line_sync.step(line_level);
        let invalid = self.invalid_sync.step(invalid_frame);

        let edge = nrzi::decode(self.last_level, level);
        self.last_level = level;

        let clock = self.clock.step(edge, invalid);
        let event = self.frames.step(&clock);

        ReceiverOutput {
            strobe: event.strobe,
            user_bits: self.frames.user_bits(),
            locked: clock.locked,
            synced: self.frames.is_synced(),
            misaligned: event.misaligned,
        }
    }
}

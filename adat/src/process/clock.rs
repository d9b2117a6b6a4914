//! Bit clock recovery.
//!
//! The only interval on the line longer than five bit cells is the preamble's
//! run from the first sync edge to the second: one sync cell plus ten zero
//! cells. Measuring that run in sampling ticks and dividing by eleven gives the
//! bit period, which then drives a mid-cell bit sampler whose phase restarts on
//! every edge.
//!
//! All durations are kept in Q8 fixed point (ticks × 256) so the period keeps
//! its fractional part without floating point.

use log::{debug, trace};

use crate::process::{BASE_SAMPLE_RATE, SYNC_ZEROS, check_clock};
use crate::utils::errors::ConfigError;

const Q8: u64 = 256;

/// Bit cells spanned by the edge-to-edge preamble interval.
const PREAMBLE_CELLS: u64 = SYNC_ZEROS as u64 + 1;
/// Shortest interval, in base-rate bit times, accepted as a preamble.
const PREAMBLE_MIN_BITS: u64 = 7;
/// Longest interval, in base-rate bit times, still accepted as a preamble.
const IDLE_BITS: u64 = 12;
/// Bit periods without an edge after which the lock is dropped.
const DEAD_SIGNAL_BITS: u64 = 16;

/// What the clock recovery reports for one sampling tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClockOutput {
    pub locked: bool,
    /// High for the single tick on which a preamble's second sync edge arrives.
    pub sync: bool,
    /// A recovered bit, sampled at the middle of its cell.
    pub bit: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct BitClockRecovery {
    /// One bit time at the base sample rate, Q8 ticks.
    base_bit_q8: u64,
    /// Ticks since the last edge; `None` before the first edge or after a reset.
    counter: Option<u64>,
    /// Latched bit period, Q8 ticks.
    period_q8: u64,
    locked: bool,

    phase_q8: u64,
    next_sample_q8: u64,
    edge_pending: bool,
}

impl BitClockRecovery {
    /// Creates a recovery loop for a sampling clock of `clock_hz`.
    ///
    /// `sample_rate` only bounds the check that the clock is fast enough; the
    /// loop itself locks to any supported rate.
    pub fn new(clock_hz: u64, sample_rate: u32) -> Result<Self, ConfigError> {
        check_clock(clock_hz, sample_rate)?;

        Ok(Self {
            // clock_hz / (BASE_SAMPLE_RATE * 256) ticks, times 256.
            base_bit_q8: clock_hz / BASE_SAMPLE_RATE as u64,
            counter: None,
            period_q8: 0,
            locked: false,
            phase_q8: 0,
            next_sample_q8: 0,
            edge_pending: false,
        })
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Latched bit period in Q8 ticks, zero while no estimate is held.
    pub fn period_q8(&self) -> u64 {
        self.period_q8
    }

    fn unlock(&mut self) {
        self.locked = false;
        self.period_q8 = 0;
        self.edge_pending = false;
    }

    /// Advances one sampling tick.
    ///
    /// `edge` is the NRZI-decoded line transition for this tick; `invalid`
    /// is the external invalid-frame level, which holds the loop unlocked.
    pub fn step(&mut self, edge: bool, invalid: bool) -> ClockOutput {
        let mut out = ClockOutput::default();

        if invalid {
            if self.locked {
                debug!("Bit clock invalidated externally");
            }
            self.unlock();
            self.counter = None;
            return out;
        }

        if edge {
            self.on_edge(&mut out);
        } else if let Some(counter) = self.counter.as_mut() {
            *counter = counter.saturating_add(1);

            if self.locked && *counter * Q8 >= DEAD_SIGNAL_BITS * self.period_q8 {
                debug!("No edge for {} ticks, dropping bit clock", *counter);
                self.unlock();
            }
        }

        if self.locked {
            if !edge {
                self.phase_q8 += Q8;
            }
            if self.phase_q8 >= self.next_sample_q8 {
                out.bit = Some(self.edge_pending);
                self.edge_pending = false;
                self.next_sample_q8 += self.period_q8;
            }
        }

        out.locked = self.locked;
        out
    }

    fn on_edge(&mut self, out: &mut ClockOutput) {
        if let Some(counter) = self.counter {
            let interval_q8 = (counter + 1) * Q8;

            if interval_q8 > IDLE_BITS * self.base_bit_q8 {
                trace!("Idle interval of {} ticks", counter + 1);
            } else if interval_q8 > PREAMBLE_MIN_BITS * self.base_bit_q8 {
                self.period_q8 = interval_q8 / PREAMBLE_CELLS;
                if !self.locked {
                    debug!(
                        "Bit clock locked, period {:.3} ticks",
                        self.period_q8 as f64 / Q8 as f64
                    );
                }
                self.locked = true;
                out.sync = true;
            }
        }

        self.counter = Some(0);
        self.phase_q8 = 0;
        self.next_sample_q8 = self.period_q8 / 2;
        self.edge_pending = true;
    }
}

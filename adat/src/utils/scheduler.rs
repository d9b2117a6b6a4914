//! Exact interleaving of two fixed-rate timing domains.
//!
//! Tick `n` of a domain running at `f` Hz happens at time `n / f`. Ordering is
//! decided by cross-multiplying tick counts with the other domain's rate, so
//! the interleaving never drifts however long it runs.

use crate::utils::errors::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    First,
    Second,
}

#[derive(Debug, Clone)]
pub struct DomainScheduler {
    first_hz: u64,
    second_hz: u64,
    first_ticks: u64,
    second_ticks: u64,
}

impl DomainScheduler {
    pub fn new(first_hz: u64, second_hz: u64) -> Result<Self, ConfigError> {
        if first_hz == 0 || second_hz == 0 {
            return Err(ConfigError::ZeroClockRate);
        }

        Ok(Self {
            first_hz,
            second_hz,
            first_ticks: 0,
            second_ticks: 0,
        })
    }

    /// Ticks already issued to each domain.
    pub fn ticks(&self) -> (u64, u64) {
        (self.first_ticks, self.second_ticks)
    }

    /// Returns the domain whose next tick comes first, without consuming it.
    /// Simultaneous ticks go to the first domain.
    pub fn peek(&self) -> Domain {
        let first_at = self.first_ticks as u128 * self.second_hz as u128;
        let second_at = self.second_ticks as u128 * self.first_hz as u128;

        if first_at <= second_at {
            Domain::First
        } else {
            Domain::Second
        }
    }
}

impl Iterator for DomainScheduler {
    type Item = Domain;

    fn next(&mut self) -> Option<Self::Item> {
        let domain = self.peek();
        match domain {
            Domain::First => self.first_ticks += 1,
            Domain::Second => self.second_ticks += 1,
        }
        Some(domain)
    }
}

use std::fs;
use std::path::Path;

use adat::process::{CHANNELS, FRAME_ENTRIES, check_clock, line_rate};
use adat::structs::frame::UserBits;
use adat::utils::elastic_queue::DEFAULT_CAPACITY;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use super::command::LinkArgs;

/// Link parameters, loaded from `--config` and overridden by flags.
///
/// ```yaml
/// sample_rate: 48000
/// clock_hz: 100000000
/// control_hz: 100000000
/// queue_capacity: 32
/// user_bits: 0
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    pub sample_rate: u32,
    pub clock_hz: u64,
    pub control_hz: u64,
    pub queue_capacity: usize,
    pub user_bits: u8,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            clock_hz: 100_000_000,
            control_hz: 100_000_000,
            queue_capacity: DEFAULT_CAPACITY,
            user_bits: 0,
        }
    }
}

impl LinkConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(text)?)
    }

    /// Loads `path` when given, applies `args` on top and validates the result.
    pub fn resolve(path: Option<&Path>, args: &LinkArgs) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                Self::from_yaml(&text).with_context(|| format!("parsing {}", path.display()))?
            }
            None => Self::default(),
        };

        config.apply(args);
        config.validate()?;
        log::debug!("Link configuration: {config:?}");
        Ok(config)
    }

    pub fn apply(&mut self, args: &LinkArgs) {
        if let Some(sample_rate) = args.sample_rate {
            self.sample_rate = sample_rate;
        }
        if let Some(clock_hz) = args.clock_hz {
            self.clock_hz = clock_hz;
        }
        if let Some(control_hz) = args.control_hz {
            self.control_hz = control_hz;
        }
        if let Some(queue_capacity) = args.queue_capacity {
            self.queue_capacity = queue_capacity;
        }
        if let Some(user_bits) = args.user_bits {
            self.user_bits = user_bits;
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_clock(self.clock_hz, self.sample_rate)?;

        // Eight channel writes plus nine queue pushes per frame.
        let min_control_hz = self.sample_rate as u64 * (CHANNELS + FRAME_ENTRIES) as u64;
        if self.control_hz < min_control_hz {
            bail!(
                "control clock {} Hz cannot keep up with {} Hz frames (needs at least {min_control_hz} Hz)",
                self.control_hz,
                self.sample_rate
            );
        }
        if self.user_bits > 0xF {
            bail!("user bits must fit in four bits, got {}", self.user_bits);
        }
        Ok(())
    }

    pub fn line_hz(&self) -> Result<u64> {
        Ok(line_rate(self.sample_rate)?)
    }

    pub fn user_bits(&self) -> UserBits {
        UserBits::new(self.user_bits)
    }
}

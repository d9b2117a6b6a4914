use std::collections::BTreeSet;

use adat::process::decode::{LineDecoder, Oversampler};
use adat::utils::bitstream_io::unpack_levels;
use anyhow::Result;
use indicatif::MultiProgress;
use log::Level;
use serde::Serialize;

use super::command::{Cli, InfoArgs};
use super::config::LinkConfig;
use super::progress::create_progress_bar;
use crate::input::InputReader;
use crate::timestamp::duration_str;

#[derive(Debug, Serialize)]
pub struct LineReport {
    pub sample_rate: u32,
    pub clock_hz: u64,
    pub line_bits: u64,
    pub line_duration: String,
    pub frames: u64,
    pub decoded_duration: String,
    pub lock_acquisitions: u64,
    pub lock_losses: u64,
    pub sync_losses: u64,
    pub partial_frames: u64,
    pub user_bits_seen: Vec<String>,
}

/// Decodes a line capture chunk by chunk, keeping only statistics.
pub struct LineAnalysis {
    config: LinkConfig,
    oversampler: Oversampler,
    decoder: LineDecoder,
    ticks: Vec<bool>,
    line_bits: u64,
    user_bits_seen: BTreeSet<u8>,
}

impl LineAnalysis {
    pub fn new(config: LinkConfig, strict: bool) -> Result<Self> {
        let mut decoder = LineDecoder::new(config.clock_hz, config.sample_rate)?;
        decoder.set_fail_level(if strict { Level::Warn } else { Level::Error });

        Ok(Self {
            oversampler: Oversampler::new(config.line_hz()?, config.clock_hz)?,
            decoder,
            config,
            ticks: Vec::new(),
            line_bits: 0,
            user_bits_seen: BTreeSet::new(),
        })
    }

    pub fn push_packed(&mut self, bytes: &[u8]) -> Result<()> {
        for level in unpack_levels(bytes)? {
            self.oversampler.push(level, &mut self.ticks);
            self.line_bits += 1;
        }
        self.decoder.push_levels(&self.ticks);
        self.ticks.clear();
        self.drain()
    }

    fn drain(&mut self) -> Result<()> {
        for frame in self.decoder.by_ref() {
            let frame = frame?;
            if self.user_bits_seen.insert(frame.user_bits.value()) {
                log::debug!("New user bits {}", frame.user_bits);
            }
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<LineReport> {
        self.decoder.flush();
        self.drain()?;

        let stats = self.decoder.stats();
        let line_frames = self.line_bits / adat::process::BITS_PER_FRAME as u64;
        Ok(LineReport {
            sample_rate: self.config.sample_rate,
            clock_hz: self.config.clock_hz,
            line_bits: self.line_bits,
            line_duration: duration_str(line_frames, self.config.sample_rate),
            frames: stats.frames,
            decoded_duration: duration_str(stats.frames, self.config.sample_rate),
            lock_acquisitions: stats.lock_acquisitions,
            lock_losses: stats.lock_losses,
            sync_losses: stats.sync_losses,
            partial_frames: stats.partial_frames,
            user_bits_seen: self
                .user_bits_seen
                .iter()
                .map(|bits| format!("{bits:04b}"))
                .collect(),
        })
    }
}

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing ADAT line capture: {}", args.input.display());

    let config = LinkConfig::resolve(cli.config.as_deref(), &args.link)?;
    let mut input = InputReader::new(&args.input)?;
    let pb = multi
        .map(|multi| create_progress_bar(multi, input.size_hint(), "bytes", "analyzing"))
        .transpose()?;

    let mut analysis = LineAnalysis::new(config, cli.strict)?;
    input.process_chunks(64 * 1024, |chunk| {
        analysis.push_packed(chunk)?;
        if let Some(pb) = &pb {
            pb.inc(chunk.len() as u64);
        }
        Ok(true)
    })?;

    let report = analysis.finish()?;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    if report.lock_acquisitions == 0 {
        println!("The receiver never locked; this doesn't appear to be an ADAT line capture.");
    }
    print!("{}", serde_yaml_ng::to_string(&report)?);

    Ok(())
}

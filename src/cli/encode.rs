use std::fs::File;
use std::io::{BufWriter, Write};

use adat::process::CHANNELS;
use adat::process::encode::LineEncoder;
use adat::structs::frame::{Frame, UserBits};
use adat::utils::bitstream_io::LevelWriter;
use anyhow::{Context, Result, bail};
use indicatif::MultiProgress;
use log::{info, warn};

use super::command::{Cli, EncodeArgs};
use super::config::LinkConfig;
use super::progress::create_progress_bar;
use crate::input::InputReader;

/// Bytes per interleaved PCM frame.
pub const PCM_FRAME_BYTES: usize = CHANNELS * 3;

const FRAMES_PER_CHUNK: usize = 4096;

/// Builds a frame from one interleaved record of 24-bit little-endian samples.
pub fn pcm_frame(record: &[u8], user_bits: UserBits) -> Frame {
    let mut samples = [0; CHANNELS];
    for (sample, bytes) in samples.iter_mut().zip(record.chunks_exact(3)) {
        *sample = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]);
    }
    Frame::new(user_bits, samples)
}

pub fn cmd_encode(args: &EncodeArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let config = LinkConfig::resolve(cli.config.as_deref(), &args.link)?;
    info!(
        "Encoding {} at {} Hz (line {} Hz, control {} Hz)",
        args.input.display(),
        config.sample_rate,
        config.line_hz()?,
        config.control_hz
    );

    let mut input = InputReader::new(&args.input)?;
    let output = File::create(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    let mut writer = LevelWriter::new(BufWriter::new(output));

    let mut encoder = LineEncoder::new(config.control_hz, config.sample_rate, config.queue_capacity)?;
    let user_bits = config.user_bits();

    let pb = multi
        .map(|multi| {
            let total = input.size_hint().map(|bytes| bytes / PCM_FRAME_BYTES as u64);
            create_progress_bar(multi, total, "frames", "encoding")
        })
        .transpose()?;

    let mut levels = Vec::new();
    let trailing = input.process_records(PCM_FRAME_BYTES, FRAMES_PER_CHUNK, |records| {
        for record in records.chunks_exact(PCM_FRAME_BYTES) {
            encoder.push_frame(&pcm_frame(record, user_bits));
        }
        encoder.run(&mut levels)?;
        writer.put_all(&levels)?;
        levels.clear();

        if let Some(pb) = &pb {
            pb.inc((records.len() / PCM_FRAME_BYTES) as u64);
        }
        Ok(true)
    })?;

    if trailing > 0 {
        warn!("Ignoring {trailing} trailing bytes that do not form a whole frame");
    }

    encoder.finish(&mut levels)?;
    writer.put_all(&levels)?;

    let line_bits = writer.written();
    writer.finish()?.flush()?;

    if let Some(pb) = pb {
        pb.finish_with_message("done");
    }

    let stats = encoder.stats();
    info!(
        "Wrote {line_bits} line bits: {} frames, {} keep-alive frames",
        stats.frames_committed, stats.keep_alive_frames
    );

    if stats.underflow_ticks > 0 {
        warn!(
            "Line underflowed for {} ticks; the control clock is too slow",
            stats.underflow_ticks
        );
        if cli.strict {
            bail!("line underflow in strict mode");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_records_map_to_channels() {
        let mut record = [0u8; PCM_FRAME_BYTES];
        record[0..3].copy_from_slice(&[0x56, 0x34, 0x12]);
        record[21..24].copy_from_slice(&[0x01, 0x00, 0x80]);

        let frame = pcm_frame(&record, UserBits::new(0b1001));
        assert_eq!(frame.samples[0], 0x123456);
        assert_eq!(frame.samples[7], 0x800001);
        assert_eq!(frame.pcm()[7], -0x7F_FFFF);
        assert_eq!(frame.user_bits, UserBits::new(0b1001));
    }
}

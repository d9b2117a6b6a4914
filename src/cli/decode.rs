use std::fs::File;
use std::io::{self, BufWriter, Seek, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use adat::process::decode::{DecodeStats, LineDecoder, Oversampler};
use adat::structs::frame::Frame;
use adat::utils::bitstream_io::unpack_levels;
use anyhow::{Context, Result, anyhow, bail};
use indicatif::{MultiProgress, ProgressBar};
use log::{Level, info, warn};

use super::command::{AudioFormat, Cli, DecodeArgs};
use super::config::LinkConfig;
use super::encode::PCM_FRAME_BYTES;
use super::progress::create_progress_bar;
use crate::input::InputReader;
use crate::wav::W64Writer;

const CHUNK_BYTES: usize = 64 * 1024;

/// Where decoded frames end up.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> io::Result<()>;
    fn finish(self: Box<Self>) -> io::Result<()>;
}

/// Interleaved 24-bit little-endian PCM with no header.
pub struct PcmSink<W: Write>(pub W);

impl<W: Write> FrameSink for PcmSink<W> {
    fn write_frame(&mut self, frame: &Frame) -> io::Result<()> {
        let mut bytes = [0u8; PCM_FRAME_BYTES];
        for (dst, sample) in bytes.chunks_exact_mut(3).zip(frame.samples) {
            dst.copy_from_slice(&sample.to_le_bytes()[..3]);
        }
        self.0.write_all(&bytes)
    }

    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.0.flush()
    }
}

impl<W: Write + Seek> FrameSink for W64Writer<W> {
    fn write_frame(&mut self, frame: &Frame) -> io::Result<()> {
        W64Writer::write_frame(self, frame)
    }

    fn finish(self: Box<Self>) -> io::Result<()> {
        W64Writer::finish(*self)?.flush()
    }
}

fn create_sink(args: &DecodeArgs, sample_rate: u32) -> Result<Box<dyn FrameSink>> {
    let to_stdout = args.output.as_os_str() == "-";

    match (args.format, to_stdout) {
        (AudioFormat::Pcm, true) => Ok(Box::new(PcmSink(BufWriter::new(io::stdout().lock())))),
        (AudioFormat::W64, true) => bail!("Wave64 output needs a seekable file, not stdout"),
        (format, false) => {
            let file = File::create(&args.output)
                .with_context(|| format!("creating {}", args.output.display()))?;
            let sink: Box<dyn FrameSink> = match format {
                AudioFormat::Pcm => Box::new(PcmSink(BufWriter::new(file))),
                AudioFormat::W64 => Box::new(W64Writer::new(file, sample_rate)?),
            };
            Ok(sink)
        }
    }
}

pub struct DecoderThreadConfig {
    pub input_path: PathBuf,
    pub config: LinkConfig,
    pub strict_mode: bool,
    pub tx: mpsc::Sender<Frame>,
    pub pb: Option<ProgressBar>,
}

/// Reads packed line levels, oversamples them onto the receiver clock and
/// sends every decoded frame to `tx`.
pub fn spawn_decoder_thread(config: DecoderThreadConfig) -> thread::JoinHandle<Result<DecodeStats>> {
    thread::spawn(move || -> Result<DecodeStats> {
        let DecoderThreadConfig {
            input_path,
            config,
            strict_mode,
            tx,
            pb,
        } = config;

        let mut input = InputReader::new(&input_path)?;
        let mut oversampler = Oversampler::new(config.line_hz()?, config.clock_hz)?;
        let mut decoder = LineDecoder::new(config.clock_hz, config.sample_rate)?;
        decoder.set_fail_level(if strict_mode { Level::Warn } else { Level::Error });

        let mut ticks = Vec::new();
        let mut receiver_gone = false;

        input.process_chunks(CHUNK_BYTES, |chunk| {
            for level in unpack_levels(chunk)? {
                oversampler.push(level, &mut ticks);
            }
            decoder.push_levels(&ticks);
            ticks.clear();

            receiver_gone = !forward_frames(&mut decoder, &tx)?;
            if let Some(pb) = &pb {
                pb.inc(chunk.len() as u64);
            }
            Ok(!receiver_gone)
        })?;

        if !receiver_gone {
            decoder.flush();
            forward_frames(&mut decoder, &tx)?;
        }

        let stats = decoder.stats();
        info!(
            "Decoding complete: {} frames from {} ticks",
            stats.frames, stats.ticks
        );
        Ok(stats)
    })
}

/// Returns `false` once the receiving side has hung up.
fn forward_frames(decoder: &mut LineDecoder, tx: &mpsc::Sender<Frame>) -> Result<bool> {
    for frame in decoder.by_ref() {
        if tx.send(frame?).is_err() {
            return Ok(false);
        }
    }
    Ok(true)
}

pub fn cmd_decode(args: &DecodeArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let config = LinkConfig::resolve(cli.config.as_deref(), &args.link)?;
    info!(
        "Decoding {} at {} Hz with a {} Hz receiver clock",
        args.input.display(),
        config.sample_rate,
        config.clock_hz
    );

    let pb = multi
        .map(|multi| {
            let total = InputReader::new(&args.input)?.size_hint();
            create_progress_bar(multi, total, "bytes", "decoding")
        })
        .transpose()?;

    let mut sink = create_sink(args, config.sample_rate)?;

    let (tx, rx) = mpsc::channel();
    let handle = spawn_decoder_thread(DecoderThreadConfig {
        input_path: args.input.clone(),
        config: config.clone(),
        strict_mode: cli.strict,
        tx,
        pb: pb.clone(),
    });

    let mut written = 0u64;
    let mut write_result = Ok(());
    for frame in rx {
        if let Err(err) = sink.write_frame(&frame) {
            write_result = Err(err);
            break;
        }
        written += 1;
    }

    let stats = handle
        .join()
        .map_err(|_| anyhow!("decoder thread panicked"))??;
    write_result.context("writing decoded audio")?;
    sink.finish()?;

    if let Some(pb) = pb {
        pb.finish_with_message("done");
    }

    info!(
        "Wrote {written} frames; {} lock acquisitions, {} sync losses",
        stats.lock_acquisitions, stats.sync_losses
    );
    if stats.partial_frames > 0 {
        warn!("Dropped {} partially received frames", stats.partial_frames);
    }

    Ok(())
}

use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};

#[derive(Debug, ClapParser)]
#[command(
    name       = env!("CARGO_PKG_NAME"),
    version    = env!("CARGO_PKG_VERSION"),
    author     = env!("CARGO_PKG_AUTHORS"),
    about      = "Tools for encoding, decoding and inspecting ADAT Lightpipe line captures",
    long_about = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on first warning).
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// YAML link configuration; explicit flags take precedence.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Encode 8-channel 24-bit PCM into ADAT line levels.
    Encode(EncodeArgs),

    /// Decode ADAT line levels into PCM audio.
    Decode(DecodeArgs),

    /// Print line capture information
    Info(InfoArgs),
}

/// Link parameters shared by every command.
#[derive(Debug, Default, Args)]
pub struct LinkArgs {
    /// Audio sample rate (44100 or 48000).
    #[arg(long, value_name = "HZ")]
    pub sample_rate: Option<u32>,

    /// Receiver sampling clock.
    #[arg(long, value_name = "HZ")]
    pub clock_hz: Option<u64>,

    /// Transmitter control clock.
    #[arg(long, value_name = "HZ")]
    pub control_hz: Option<u64>,

    /// Elastic queue capacity in entries.
    #[arg(long, value_name = "ENTRIES")]
    pub queue_capacity: Option<usize>,

    /// User bits sent with every frame (0-15).
    #[arg(long, value_name = "BITS")]
    pub user_bits: Option<u8>,
}

#[derive(Debug, Args)]
pub struct EncodeArgs {
    /// Raw interleaved 8-channel 24-bit little-endian PCM (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output file for packed line levels.
    #[arg(long, value_name = "LINE")]
    pub output: PathBuf,

    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// Packed line levels, one bit per line cell (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output path for decoded audio (use "-" for stdout with raw PCM).
    #[arg(long, value_name = "PATH")]
    pub output: PathBuf,

    /// Audio format for output.
    #[arg(long, value_enum, default_value_t = AudioFormat::W64)]
    pub format: AudioFormat,

    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Packed line levels.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum AudioFormat {
    /// Raw PCM format (8 channels, 24-bit little-endian).
    Pcm,
    /// Sony Wave64.
    W64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn link_flags_are_optional() {
        let cli = Cli::parse_from(["adatd", "--strict", "info", "capture.line", "--sample-rate", "44100"]);
        assert!(cli.strict);
        let Commands::Info(args) = cli.command else {
            panic!("expected info command");
        };
        assert_eq!(args.link.sample_rate, Some(44_100));
        assert_eq!(args.link.clock_hz, None);
    }
}

#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransmitError {
    #[error("Channel write offered while the transmitter is not ready")]
    NotReady,

    #[error("Channel {0} written twice in the same frame")]
    ChannelRepeated(u8),

    #[error("Frame committed with missing channels (written mask {0:#04X})")]
    ChannelSkipped(u8),

    #[error("Channel index out of range: {0}")]
    InvalidChannel(u8),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReceiveError {
    #[error("Frame alignment lost at tick {tick}: {reason}")]
    SyncLost { tick: u64, reason: &'static str },

    #[error("Bit clock lock lost at tick {0}")]
    LockLost(u64),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unsupported sample rate {0} Hz (expected 44100 or 48000)")]
    UnsupportedSampleRate(u32),

    #[error("Sampling clock {clock_hz} Hz is too slow for line rate {line_hz} Hz")]
    ClockTooSlow { clock_hz: u64, line_hz: u64 },

    #[error("Queue capacity {0} cannot hold a whole frame plus headroom")]
    QueueTooSmall(usize),

    #[error("Clock rate must be non-zero")]
    ZeroClockRate,
}

//! ADAT Lightpipe line codec.
//!
//! ## Technical Overview
//!
//! ADAT carries eight 24-bit audio channels and four user bits per frame over
//! a self-clocking NRZI line. Every frame is 256 bit cells long:
//!
//! - a preamble of one sync bit, ten zero bits, a second sync bit and the
//!   four user bits;
//! - eight channel spans of six nibbles, each nibble preceded by a marker bit
//!   fixed to 1.
//!
//! The line bit rate is 256 times the sample rate (11.2896 MHz at 44.1 kHz,
//! 12.288 MHz at 48 kHz). The preamble's ten zeros are the only run longer
//! than four cells, so the receiver recovers the bit clock from it on every
//! frame.
//!
//! ### Receive path
//!
//! Raw line level → two-stage synchronizer → NRZI edge →
//! [`BitClockRecovery`](process::clock::BitClockRecovery) →
//! [`FrameReceiver`](process::receive::FrameReceiver) → channel strobes.
//!
//! ### Transmit path
//!
//! Channel writes → [`FrameAssembler`](process::transmit::FrameAssembler) →
//! elastic queue → [`LineSerializer`](process::transmit::LineSerializer) →
//! NRZI → line level.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use adat::process::decode::{LineDecoder, Oversampler};
//! use adat::process::encode::LineEncoder;
//! use adat::process::line_rate;
//! use adat::structs::frame::{Frame, UserBits};
//! use adat::utils::elastic_queue::DEFAULT_CAPACITY;
//!
//! let frames = vec![Frame::new(UserBits::new(0b0101), [0x123456; 8]); 4];
//!
//! // One line level per line bit.
//! let mut encoder = LineEncoder::new(100_000_000, 48_000, DEFAULT_CAPACITY)?;
//! let levels = encoder.encode(&frames)?;
//!
//! // Resample onto the receiver clock and decode.
//! let mut oversampler = Oversampler::new(line_rate(48_000)?, 100_000_000)?;
//! let mut decoder = LineDecoder::new(100_000_000, 48_000)?;
//! decoder.push_levels(&oversampler.expand(&levels));
//! decoder.flush();
//!
//! for frame in decoder {
//!     let frame = frame?;
//!     println!("{:06X?} user bits {}", frame.samples, frame.user_bits);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

/// Receive and transmit state machines and their bulk drivers.
///
/// 1. **Clock recovery** ([`process::clock`]): bit period and bit sampling.
/// 2. **Receiving** ([`process::receive`]): frame demultiplexing.
/// 3. **Transmitting** ([`process::transmit`]): frame assembly and serialization.
/// 4. **Decoding** ([`process::decode`]) and **encoding** ([`process::encode`]):
///    whole-buffer drivers.
pub mod process;

/// Frames, channel indices and user bits.
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Line coding** ([`utils::nrzi`])
/// - **Shift registers** ([`utils::shift_register`])
/// - **Elastic queue** ([`utils::elastic_queue`]) and **scheduler** ([`utils::scheduler`])
/// - **Level packing** ([`utils::bitstream_io`])
/// - **Error Handling** ([`utils::errors`])
pub mod utils;

//! Data structures representing the wire format.
//!
//! Frames, channel indices, user bits and the bit patterns each of them
//! expands to on the line.

pub mod frame;

//! Utility functions and supporting infrastructure.
//!
//! Line coding, shift registers, edge and re-sampling helpers, the elastic
//! queue between timing domains, the domain scheduler and error types.

pub mod bitstream_io;
pub mod edge;
pub mod elastic_queue;
pub mod errors;
pub mod nrzi;
pub mod scheduler;
pub mod shift_register;
pub mod synchronizer;

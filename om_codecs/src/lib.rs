//! Numeric compression kernels for the OM chunked array format.
//!
//! Everything in this crate operates on in-memory slices and knows nothing
//! about files, headers, or chunk geometry. The `om_core` crate composes
//! these kernels into the per-chunk pipeline:
//!
//! ```text
//! write:  quantize → 2D delta → bitpack        (integer modes)
//!         copy     → 2D XOR   → bitpack        (float mode)
//! read:   the exact inverse, in reverse order
//! ```
//!
//! Each coder guarantees a worst-case output bound (`max_compressed_len`)
//! so callers can preallocate, and each decoder reports the number of bytes
//! it consumed so callers can detect size mismatches against their index.

pub mod bitpack;
pub mod delta2d;
pub mod fpxcodec;
pub mod intcodec;
pub mod lutcodec;
pub mod quantize;

pub use bitpack::{BitReader, BitWriter};

use thiserror::Error;

/// Errors produced while decoding compressed kernel payloads.
///
/// Encoding never fails: encoders write into caller-provided buffers sized
/// with `max_compressed_len` and an undersized buffer is a caller bug.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The compressed input ended before all expected values were decoded.
    #[error("compressed input truncated at byte {offset}")]
    Truncated { offset: usize },

    /// A stored bit width exceeds what the value type can hold.
    #[error("bit width {width} out of range (max {max})")]
    BitWidth { width: u8, max: u8 },
}

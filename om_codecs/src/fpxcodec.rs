//! Entropy coder for f32 chunk payloads: bit-pattern bit-packing.
//!
//! Operates on raw IEEE 754 bit patterns so every value, NaN payloads
//! included, round-trips exactly. After the 2D XOR-delta stage most words
//! share their high bits with zero (sign, exponent, and high mantissa bits
//! cancel between neighbouring rows), which the shared-width packing
//! exploits:
//!
//! ```text
//! [width: u8][u32 bit patterns packed at `width` bits each][bit padding]
//! ```

use crate::bitpack::{bits_for, BitReader, BitWriter};
use crate::CodecError;

/// Worst-case compressed size for `n` values.
pub fn max_compressed_len(n: usize) -> usize {
    1 + 4 * n
}

/// Compress `values` into `out`, returning the bytes written.
///
/// `out` must hold at least [`max_compressed_len`]`(values.len())` bytes.
pub fn compress(values: &[f32], out: &mut [u8]) -> usize {
    let mut all = 0u32;
    for &v in values {
        all |= v.to_bits();
    }
    let width = bits_for(u64::from(all));
    out[0] = width;
    let mut w = BitWriter::new(&mut out[1..]);
    for &v in values {
        w.put(u64::from(v.to_bits()), width);
    }
    1 + w.finish()
}

/// Decompress exactly `out.len()` values from `data`.
///
/// Returns the number of bytes consumed.
pub fn decompress(data: &[u8], out: &mut [f32]) -> Result<usize, CodecError> {
    let width = *data.first().ok_or(CodecError::Truncated { offset: 0 })?;
    if width > 32 {
        return Err(CodecError::BitWidth { width, max: 32 });
    }
    let mut r = BitReader::new(&data[1..]);
    for slot in out.iter_mut() {
        *slot = f32::from_bits(r.get(width)? as u32);
    }
    Ok(1 + r.consumed())
}

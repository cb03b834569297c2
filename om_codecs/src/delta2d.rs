//! 2D delta stage: successive-row differencing over a chunk matrix.
//!
//! The chunk's elements are viewed as a row-major `[rows × cols]` matrix
//! where `cols` is the chunk's extent along the last (fastest) dimension.
//! Each row after the first is replaced by its element-wise difference
//! (integer modes) or bit-pattern XOR (float mode) with the previous row.
//! The fast axis is left untouched; the entropy coder's zigzag handles the
//! remaining within-row structure.
//!
//! Encoding walks rows backwards so every subtraction sees the original
//! previous row; decoding walks forwards, accumulating.

/// In-place row differencing. `data.len()` must be `rows * cols`.
pub fn encode_i16(rows: usize, cols: usize, data: &mut [i16]) {
    debug_assert_eq!(data.len(), rows * cols);
    for r in (1..rows).rev() {
        let (head, cur) = data.split_at_mut(r * cols);
        let prev = &head[(r - 1) * cols..];
        for (c, p) in cur[..cols].iter_mut().zip(prev) {
            *c = c.wrapping_sub(*p);
        }
    }
}

/// Inverse of [`encode_i16`]: prefix-sum down the rows.
pub fn decode_i16(rows: usize, cols: usize, data: &mut [i16]) {
    debug_assert_eq!(data.len(), rows * cols);
    for r in 1..rows {
        let (head, cur) = data.split_at_mut(r * cols);
        let prev = &head[(r - 1) * cols..];
        for (c, p) in cur[..cols].iter_mut().zip(prev) {
            *c = c.wrapping_add(*p);
        }
    }
}

/// In-place row XOR over f32 bit patterns. `data.len()` must be `rows * cols`.
pub fn encode_f32(rows: usize, cols: usize, data: &mut [f32]) {
    debug_assert_eq!(data.len(), rows * cols);
    for r in (1..rows).rev() {
        let (head, cur) = data.split_at_mut(r * cols);
        let prev = &head[(r - 1) * cols..];
        for (c, p) in cur[..cols].iter_mut().zip(prev) {
            *c = f32::from_bits(c.to_bits() ^ p.to_bits());
        }
    }
}

/// Inverse of [`encode_f32`]: cumulative XOR down the rows.
pub fn decode_f32(rows: usize, cols: usize, data: &mut [f32]) {
    debug_assert_eq!(data.len(), rows * cols);
    for r in 1..rows {
        let (head, cur) = data.split_at_mut(r * cols);
        let prev = &head[(r - 1) * cols..];
        for (c, p) in cur[..cols].iter_mut().zip(prev) {
            *c = f32::from_bits(c.to_bits() ^ p.to_bits());
        }
    }
}

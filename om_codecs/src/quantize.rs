//! Scale quantization between f32 values and i16 with a NaN sentinel.
//!
//! `i16::MAX` is reserved for NaN. Finite values saturate into
//! `[i16::MIN + 1, i16::MAX − 1]`, so no finite input can alias the
//! sentinel and `i16::MIN` is never produced at all.
//!
//! The log variant works in `log10(1 + v)` space, which keeps relative
//! precision for quantities spanning orders of magnitude (precipitation
//! accumulations are the canonical case).

/// Encoded representation of NaN.
pub const NAN_SENTINEL: i16 = i16::MAX;

const Q_MIN: f32 = (i16::MIN + 1) as f32;
const Q_MAX: f32 = (i16::MAX - 1) as f32;

/// `round(v · scale)`, saturating; NaN maps to the sentinel.
#[inline]
pub fn encode_linear(v: f32, scale: f32) -> i16 {
    if v.is_nan() {
        return NAN_SENTINEL;
    }
    (v * scale).round().clamp(Q_MIN, Q_MAX) as i16
}

/// Inverse of [`encode_linear`]; the sentinel restores NaN.
#[inline]
pub fn decode_linear(q: i16, scale: f32) -> f32 {
    if q == NAN_SENTINEL {
        f32::NAN
    } else {
        f32::from(q) / scale
    }
}

/// `round(log10(1 + v) · scale)`, saturating; NaN maps to the sentinel.
#[inline]
pub fn encode_log10(v: f32, scale: f32) -> i16 {
    if v.is_nan() {
        return NAN_SENTINEL;
    }
    ((1.0 + v).log10() * scale).round().clamp(Q_MIN, Q_MAX) as i16
}

/// Inverse of [`encode_log10`]: `10^(q / scale) − 1`.
#[inline]
pub fn decode_log10(q: i16, scale: f32) -> f32 {
    if q == NAN_SENTINEL {
        f32::NAN
    } else {
        10.0f32.powf(f32::from(q) / scale) - 1.0
    }
}

//! Integer fraction helpers.
//!
//! Periods, amplitudes and envelope volumes are stored as integer ratios so
//! that long-running phase accumulation never drifts. These helpers keep the
//! products of such ratios inside 64-bit arithmetic.

/// Shift a fraction right until neither part needs more than 32 bits.
///
/// Both parts are shifted by the same amount, so the ratio is preserved
/// approximately. The product of two normalized fractions always fits in a
/// `u64`. The denominator never collapses below 1.
///
/// ```rust
/// use resono_core::normalize_fract;
///
/// assert_eq!(normalize_fract(3, 2), (3, 2));
/// let (n, d) = normalize_fract(3 << 40, 2 << 40);
/// assert!(n <= u64::from(u32::MAX) && d <= u64::from(u32::MAX));
/// assert_eq!(n * 2, d * 3);
/// ```
#[inline]
pub fn normalize_fract(num: u64, denom: u64) -> (u64, u64) {
    let bits = 64 - (num | denom).leading_zeros();
    if bits <= 32 {
        return (num, denom.max(1));
    }
    let shift = bits - 32;
    (num >> shift, (denom >> shift).max(1))
}

/// Multiply two normalized fractions and renormalize the result.
#[inline]
pub fn mul_fract(a: (u64, u64), b: (u64, u64)) -> (u64, u64) {
    let a = normalize_fract(a.0, a.1);
    let b = normalize_fract(b.0, b.1);
    normalize_fract(a.0 * b.0, a.1 * b.1)
}

/// Integer linear interpolation from `a` to `b` at `num / denom`.
///
/// A zero denominator yields `b`.
#[inline]
pub fn lerp_i64(a: i64, b: i64, num: i64, denom: i64) -> i64 {
    if denom == 0 {
        return b;
    }
    let delta = i128::from(b - a) * i128::from(num) / i128::from(denom);
    a + delta as i64
}

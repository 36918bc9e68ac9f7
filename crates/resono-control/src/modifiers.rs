//! Pure value transforms applied between a raw input and its action.

/// Advance the toggle machine with a digital input.
///
/// States: `0` off and released, `1` on and held, `2` on and released,
/// `3` off and held. Returns the next state and the value to emit, if any.
/// Only the two pressing edges emit.
///
/// ```rust
/// use resono_control::toggle_step;
///
/// assert_eq!(toggle_step(0, true), (1, Some(1.0)));
/// assert_eq!(toggle_step(1, false), (2, None));
/// assert_eq!(toggle_step(2, true), (3, Some(0.0)));
/// assert_eq!(toggle_step(3, false), (0, None));
/// ```
pub fn toggle_step(state: u8, digital: bool) -> (u8, Option<f64>) {
    match (state, digital) {
        (0, true) => (1, Some(1.0)),
        (1, false) => (2, None),
        (2, true) => (3, Some(0.0)),
        (3, false) => (0, None),
        (s, _) => (s.min(3), None),
    }
}

/// Digital reading of a value.
#[inline]
pub fn is_active(value: f64) -> bool {
    value > 0.5
}

/// Map a continuous axis through a deadzone of half-width `threshold`
/// around `origin`, rescaling what remains so full deflection is kept.
pub fn compute_deadzone(value: f64, origin: f64, threshold: f64) -> f64 {
    let d = value - origin;
    if d.abs() < threshold {
        return origin;
    }
    origin + d.signum() * (d.abs() - threshold) / (1.0 - threshold).max(0.5)
}

/// Flip an axis: around zero when signed, around one when not.
#[inline]
pub fn invert_value(value: f64, is_signed: bool) -> f64 {
    if is_signed { -value } else { 1.0 - value }
}

/// Fold a signed or unbounded axis reading into `[0, 1]`.
pub fn normalize_unit(value: f64, is_signed: bool) -> f64 {
    let v = if is_signed { (value + 1.0) * 0.5 } else { value };
    v.clamp(0.0, 1.0)
}

/// Multiplier for a bind value: linear from `1` to `max_mul` for direct
/// input, exponential for accumulated input so the integral can range
/// freely in both directions.
pub fn multiplier(max_mul: f64, value: f64, cumulative: bool) -> f64 {
    if cumulative {
        max_mul.powf(value)
    } else {
        1.0 + (max_mul - 1.0) * value
    }
}

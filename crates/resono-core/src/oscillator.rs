//! Integer waveform generators.
//!
//! Every waveform maps a signed 32-bit phase argument, where the full `i32`
//! range spans one period, to a signed 32-bit sample in
//! `[-i32::MAX, i32::MAX]`.

use alloc::vec::Vec;

use crate::fract::normalize_fract;

/// Fixed multiplier applied to periods so a signed sub-integer fine offset
/// can be carried alongside the integer numerator.
pub const PERIOD_MUL: i64 = 65536;

/// Largest magnitude produced by any waveform.
const FULL_SCALE: i64 = i32::MAX as i64;

/// Q30 Taylor coefficients of `sin(pi/2 * u)` for `u` in `[-1, 1]`.
const SINE_COEFFS: [i64; 6] = [1686629713, -693598668, 85569306, -5026995, 172272, -3864];

/// Waveform shape for an [`Oscillator`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Waveform {
    /// Odd polynomial sine
    #[default]
    Sine,
    /// `±i32::MAX` by phase sign
    Square,
    /// Peaks at phase 0, troughs at half period
    Triangle,
    /// Phase passed straight through
    Saw,
    /// Integer hash of the phase
    Noise,
}

impl Waveform {
    /// All waveforms, in file-format order.
    pub const ALL: [Waveform; 5] = [
        Waveform::Sine,
        Waveform::Square,
        Waveform::Triangle,
        Waveform::Saw,
        Waveform::Noise,
    ];

    /// Evaluate the waveform at phase `t`.
    #[inline]
    pub fn sample(self, t: i32) -> i32 {
        match self {
            Waveform::Sine => sine(t),
            Waveform::Square => square(t),
            Waveform::Triangle => triangle(t),
            Waveform::Saw => saw(t),
            Waveform::Noise => noise(t),
        }
    }

    /// Upper-case name used by instrument files.
    pub fn name(self) -> &'static str {
        match self {
            Waveform::Sine => "SINE",
            Waveform::Square => "SQUARE",
            Waveform::Triangle => "TRIANGLE",
            Waveform::Saw => "SAW",
            Waveform::Noise => "NOISE",
        }
    }

    /// Parse a waveform name, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|w| w.name().eq_ignore_ascii_case(name))
    }
}

/// Integer sine.
///
/// The argument is folded into the quarter-period range `[-2^30, 2^30]`,
/// which keeps odd symmetry exact, then evaluated with a 64-bit Horner scheme.
///
/// ```rust
/// use resono_core::oscillator::sine;
///
/// assert_eq!(sine(0), 0);
/// assert!(sine(1 << 30) > 2_147_480_000);
/// assert_eq!(sine(-(1 << 30)), -sine(1 << 30));
/// ```
#[inline]
pub fn sine(t: i32) -> i32 {
    let mut x = i64::from(t);
    if x > 0x4000_0000 {
        x = 0x8000_0000 - x;
    } else if x < -0x4000_0000 {
        x = -0x8000_0000 - x;
    }
    let negative = x < 0;
    let x = x.abs();
    let x2 = (x * x) >> 30;
    let mut acc = SINE_COEFFS[5];
    for &c in SINE_COEFFS[..5].iter().rev() {
        acc = ((acc * x2) >> 30) + c;
    }
    let y = ((acc * x) >> 29).min(FULL_SCALE);
    if negative { -y as i32 } else { y as i32 }
}

/// Integer square wave.
#[inline]
pub fn square(t: i32) -> i32 {
    if t < 0 { -i32::MAX } else { i32::MAX }
}

/// Integer triangle wave.
#[inline]
pub fn triangle(t: i32) -> i32 {
    let v = FULL_SCALE - 2 * i64::from(t).abs();
    v.clamp(-FULL_SCALE, FULL_SCALE) as i32
}

/// Integer sawtooth.
#[inline]
pub fn saw(t: i32) -> i32 {
    t
}

/// Integer hash noise. Deterministic in the phase.
#[inline]
pub fn noise(t: i32) -> i32 {
    let x = (t >> 13) ^ t;
    let inner = x
        .wrapping_mul(x)
        .wrapping_mul(60493)
        .wrapping_add(19990303);
    x.wrapping_mul(inner).wrapping_add(1376312589)
}

/// Per-voice runtime state of one oscillator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OscillatorState {
    /// Phase accumulator
    pub phase: u32,
    /// Base phase increment for the owning voice's pitch
    pub increment: u32,
    /// Most recent amplitude-scaled output
    pub output: i32,
}

/// A single node of an FM graph.
///
/// Amplitude is the signed ratio `amp_num / amp_denom`. The period is the
/// unsigned ratio `period_num / period_denom` relative to the parent (or to
/// the voice pitch for carriers), plus `period_fine / PERIOD_MUL`.
///
/// ```rust
/// use resono_core::{Oscillator, Waveform};
///
/// let osc = Oscillator::new(Waveform::Sine)
///     .with_amplitude(1, 2)
///     .with_period(2, 1);
/// assert_eq!(osc.amplitude(), (1, 2));
/// assert_eq!(osc.period_fract(), (2, 1));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Oscillator {
    waveform: Waveform,
    amp_num: i64,
    amp_denom: i64,
    period_num: u64,
    period_denom: u64,
    period_fine: i64,
    phase_constant: u32,
    pub(crate) modulators: Vec<usize>,
}

impl Default for Oscillator {
    fn default() -> Self {
        Self::new(Waveform::Sine)
    }
}

impl Oscillator {
    /// Unit amplitude, unit period oscillator with no modulators.
    pub fn new(waveform: Waveform) -> Self {
        Self {
            waveform,
            amp_num: 1,
            amp_denom: 1,
            period_num: 1,
            period_denom: 1,
            period_fine: 0,
            phase_constant: 0,
            modulators: Vec::new(),
        }
    }

    /// Builder form of [`set_amplitude`](Self::set_amplitude).
    pub fn with_amplitude(mut self, num: i64, denom: i64) -> Self {
        self.set_amplitude(num, denom);
        self
    }

    /// Builder form of [`set_period`](Self::set_period).
    pub fn with_period(mut self, num: u64, denom: u64) -> Self {
        self.set_period(num, denom);
        self
    }

    /// Builder form of [`set_period_fine`](Self::set_period_fine).
    pub fn with_period_fine(mut self, fine: i64) -> Self {
        self.set_period_fine(fine);
        self
    }

    /// Builder form of [`set_phase_constant`](Self::set_phase_constant).
    pub fn with_phase_constant(mut self, phase: u32) -> Self {
        self.phase_constant = phase;
        self
    }

    /// Builder form of [`set_modulators`](Self::set_modulators).
    pub fn with_modulators(mut self, modulators: &[usize]) -> Self {
        self.set_modulators(modulators);
        self
    }

    /// Waveform.
    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    /// Set the waveform.
    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    /// Amplitude as `(num, denom)`.
    pub fn amplitude(&self) -> (i64, i64) {
        (self.amp_num, self.amp_denom)
    }

    /// Set the amplitude ratio. A zero denominator is replaced by 1.
    pub fn set_amplitude(&mut self, num: i64, denom: i64) {
        self.amp_num = num;
        self.amp_denom = if denom == 0 { 1 } else { denom };
    }

    /// Period as `(num, denom)` without the fine offset.
    pub fn period(&self) -> (u64, u64) {
        (self.period_num, self.period_denom)
    }

    /// Set the period ratio. A zero denominator is replaced by 1, and the
    /// fine offset is re-clamped so the effective period stays non-negative.
    pub fn set_period(&mut self, num: u64, denom: u64) {
        self.period_num = num;
        self.period_denom = denom.max(1);
        self.set_period_fine(self.period_fine);
    }

    /// Fine period offset in units of `1 / PERIOD_MUL`.
    pub fn period_fine(&self) -> i64 {
        self.period_fine
    }

    /// Set the fine period offset, clamped so `period_num + fine >= 0`.
    pub fn set_period_fine(&mut self, fine: i64) {
        let floor = -(self.period_num.min(i64::MAX as u64 / PERIOD_MUL as u64) as i64 * PERIOD_MUL);
        self.period_fine = fine.max(floor);
    }

    /// Initial phase applied when a voice is pressed.
    pub fn phase_constant(&self) -> u32 {
        self.phase_constant
    }

    /// Set the initial phase.
    pub fn set_phase_constant(&mut self, phase: u32) {
        self.phase_constant = phase;
    }

    /// Indices of the oscillators modulating this one.
    pub fn modulators(&self) -> &[usize] {
        &self.modulators
    }

    /// Replace the modulator list. Takes effect after the owning graph's
    /// `finish_changes`.
    pub fn set_modulators(&mut self, modulators: &[usize]) {
        self.modulators.clear();
        self.modulators.extend_from_slice(modulators);
    }

    /// Effective period including the fine offset, normalized to 32 bits.
    pub fn period_fract(&self) -> (u64, u64) {
        if self.period_fine == 0 {
            return normalize_fract(self.period_num, self.period_denom);
        }
        let num = i128::from(self.period_num) * i128::from(PERIOD_MUL) + i128::from(self.period_fine);
        let denom = i128::from(self.period_denom) * i128::from(PERIOD_MUL);
        let num = num.clamp(0, i128::from(u64::MAX)) as u64;
        let denom = denom.clamp(1, i128::from(u64::MAX)) as u64;
        normalize_fract(num, denom)
    }

    /// Apply the amplitude ratio to a raw waveform sample.
    #[inline]
    pub fn scale(&self, sample: i32) -> i32 {
        let v = i128::from(sample) * i128::from(self.amp_num) / i128::from(self.amp_denom);
        v.clamp(-i128::from(FULL_SCALE), i128::from(FULL_SCALE)) as i32
    }

    /// Advance the phase by `increment` and evaluate at `phase + offset`.
    #[inline]
    pub fn advance(&self, state: &mut OscillatorState, increment: u32, offset: u32) -> i32 {
        state.phase = state.phase.wrapping_add(increment);
        let raw = self.waveform.sample(state.phase.wrapping_add(offset) as i32);
        state.output = self.scale(raw);
        state.output
    }

    /// Reset runtime state to the initial phase.
    #[inline]
    pub fn reset(&self, state: &mut OscillatorState) {
        state.phase = self.phase_constant;
        state.output = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUARTER: i32 = 1 << 30;

    #[test]
    fn test_sine_landmarks() {
        assert_eq!(sine(0), 0);
        assert_eq!(sine(i32::MIN), 0);
        let peak = sine(QUARTER);
        assert!(peak > 2_147_480_000, "peak {peak}");
        assert_eq!(sine(-QUARTER), -peak);
    }

    #[test]
    fn test_sine_odd_symmetry() {
        for t in [1, 1000, 123_456_789, QUARTER - 1, QUARTER + 17, i32::MAX] {
            assert_eq!(sine(-t), -sine(t), "t = {t}");
        }
    }

    #[test]
    fn test_sine_accuracy() {
        for i in 0..=64 {
            let t = (i64::from(i32::MIN) + i * (1i64 << 26)) as i32;
            let expected = libm::sin(f64::from(t) / 2_147_483_648.0 * core::f64::consts::PI);
            let got = f64::from(sine(t)) / 2_147_483_647.0;
            assert!((got - expected).abs() < 1e-6, "t={t} got={got} expected={expected}");
        }
    }

    #[test]
    fn test_square_and_saw() {
        assert_eq!(square(-1), -i32::MAX);
        assert_eq!(square(0), i32::MAX);
        assert_eq!(saw(-42), -42);
    }

    #[test]
    fn test_triangle_shape() {
        assert_eq!(triangle(0), i32::MAX);
        assert_eq!(triangle(i32::MIN), -i32::MAX);
        assert_eq!(triangle(QUARTER), -1);
        assert_eq!(triangle(-QUARTER), triangle(QUARTER));
    }

    #[test]
    fn test_noise_is_deterministic() {
        assert_eq!(noise(12345), noise(12345));
        assert_ne!(noise(1), noise(2));
    }

    #[test]
    fn test_waveform_names() {
        for w in Waveform::ALL {
            assert_eq!(Waveform::from_name(w.name()), Some(w));
        }
        assert_eq!(Waveform::from_name("saw"), Some(Waveform::Saw));
        assert_eq!(Waveform::from_name("pulse"), None);
    }

    #[test]
    fn test_zero_denominators_sanitized() {
        let osc = Oscillator::new(Waveform::Sine)
            .with_amplitude(3, 0)
            .with_period(2, 0);
        assert_eq!(osc.amplitude(), (3, 1));
        assert_eq!(osc.period(), (2, 1));
    }

    #[test]
    fn test_period_fine_clamped_non_negative() {
        let osc = Oscillator::new(Waveform::Sine)
            .with_period(1, 1)
            .with_period_fine(-10 * PERIOD_MUL);
        assert_eq!(osc.period_fine(), -PERIOD_MUL);
        assert_eq!(osc.period_fract().0, 0);
    }

    #[test]
    fn test_period_fract_with_fine() {
        let osc = Oscillator::new(Waveform::Sine)
            .with_period(1, 1)
            .with_period_fine(PERIOD_MUL / 2);
        let (n, d) = osc.period_fract();
        assert_eq!(n * 2, d * 3);
    }

    #[test]
    fn test_scale_and_advance() {
        let osc = Oscillator::new(Waveform::Saw).with_amplitude(-1, 2);
        assert_eq!(osc.scale(1000), -500);

        let mut state = OscillatorState::default();
        let out = osc.advance(&mut state, 100, 0);
        assert_eq!(state.phase, 100);
        assert_eq!(out, -50);
        let out = osc.advance(&mut state, 100, 800);
        assert_eq!(out, -500);
    }

    #[test]
    fn test_reset_uses_phase_constant() {
        let osc = Oscillator::new(Waveform::Sine).with_phase_constant(0x4000_0000);
        let mut state = OscillatorState {
            phase: 7,
            increment: 0,
            output: 9,
        };
        osc.reset(&mut state);
        assert_eq!(state.phase, 0x4000_0000);
        assert_eq!(state.output, 0);
    }
}

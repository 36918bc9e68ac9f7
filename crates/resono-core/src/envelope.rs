//! Integer ADSR envelope.
//!
//! Volumes are fractions of `volume_denom`; stage lengths are sample counts.
//! The envelope itself is stateless: a voice's press and release timers are
//! fed to [`Envelope::target`] every sample to get its target volume.

use crate::fract::lerp_i64;
use crate::voice::VOLUME_DENOM;

/// Attack/decay/sustain/release shape shared by all voices of an instrument.
///
/// ## Invariants
/// - `volume_denom > 0`
/// - `0 <= sustain_volume_num <= peak_volume_num <= volume_denom`
///
/// ```rust
/// use resono_core::Envelope;
///
/// let env = Envelope::from_seconds(1.0, 0.5, 0.01, 0.1, 0.2, 48000);
/// assert_eq!(env.attack_length(), 480);
/// assert_eq!(env.decay_length(), 4800);
/// assert_eq!(env.release_length(), 9600);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Envelope {
    peak_volume_num: i64,
    sustain_volume_num: i64,
    volume_denom: i64,
    attack_length: u32,
    decay_length: u32,
    release_length: u32,
}

impl Default for Envelope {
    /// Full-scale organ envelope: instant attack, full sustain, no release.
    fn default() -> Self {
        Self::new(1, 1, 1, 0, 0, 0)
    }
}

impl Envelope {
    /// Create an envelope, clamping volumes into the legal ordering.
    pub fn new(
        peak_volume_num: i64,
        sustain_volume_num: i64,
        volume_denom: i64,
        attack_length: u32,
        decay_length: u32,
        release_length: u32,
    ) -> Self {
        let volume_denom = volume_denom.max(1);
        let peak_volume_num = peak_volume_num.clamp(0, volume_denom);
        let sustain_volume_num = sustain_volume_num.clamp(0, peak_volume_num);
        Self {
            peak_volume_num,
            sustain_volume_num,
            volume_denom,
            attack_length,
            decay_length,
            release_length,
        }
    }

    /// Create an envelope from unit volumes and stage lengths in seconds.
    pub fn from_seconds(
        peak: f64,
        sustain: f64,
        attack_s: f64,
        decay_s: f64,
        release_s: f64,
        sample_rate: u32,
    ) -> Self {
        Self::new(
            (peak * VOLUME_DENOM as f64).round() as i64,
            (sustain * VOLUME_DENOM as f64).round() as i64,
            VOLUME_DENOM,
            seconds_to_samples(attack_s, sample_rate),
            seconds_to_samples(decay_s, sample_rate),
            seconds_to_samples(release_s, sample_rate),
        )
    }

    /// Peak volume numerator.
    pub fn peak_volume_num(&self) -> i64 {
        self.peak_volume_num
    }

    /// Sustain volume numerator.
    pub fn sustain_volume_num(&self) -> i64 {
        self.sustain_volume_num
    }

    /// Shared volume denominator.
    pub fn volume_denom(&self) -> i64 {
        self.volume_denom
    }

    /// Attack length in samples.
    pub fn attack_length(&self) -> u32 {
        self.attack_length
    }

    /// Decay length in samples.
    pub fn decay_length(&self) -> u32 {
        self.decay_length
    }

    /// Release length in samples.
    pub fn release_length(&self) -> u32 {
        self.release_length
    }

    /// Total samples from press to sustain.
    pub fn press_length(&self) -> u32 {
        self.attack_length.saturating_add(self.decay_length)
    }

    /// Peak volume rescaled to [`VOLUME_DENOM`].
    pub fn peak_volume(&self) -> i64 {
        self.peak_volume_num * VOLUME_DENOM / self.volume_denom
    }

    /// Sustain volume rescaled to [`VOLUME_DENOM`].
    pub fn sustain_volume(&self) -> i64 {
        self.sustain_volume_num * VOLUME_DENOM / self.volume_denom
    }

    /// Copy with each stage scaled by a multiplier.
    ///
    /// Stage lengths are multiplied and rounded; the sustain volume is
    /// multiplied and clamped to the peak.
    pub fn scaled(&self, attack: f64, decay: f64, sustain: f64, release: f64) -> Self {
        let scale_len = |len: u32, mul: f64| -> u32 {
            let v = libm::round(f64::from(len) * mul.max(0.0));
            if v >= f64::from(u32::MAX) { u32::MAX } else { v as u32 }
        };
        let sustain_num = libm::round(self.sustain_volume_num as f64 * sustain.max(0.0)) as i64;
        Self::new(
            self.peak_volume_num,
            sustain_num,
            self.volume_denom,
            scale_len(self.attack_length, attack),
            scale_len(self.decay_length, decay),
            scale_len(self.release_length, release),
        )
    }

    /// Target volume, out of [`VOLUME_DENOM`], for a voice with the given
    /// timers.
    ///
    /// `press_timer` counts down from `attack + decay`; `release_timer`
    /// counts down from `release` once the voice is released.
    #[inline]
    pub fn target(&self, press_timer: u32, release_timer: u32, pressed: bool) -> i64 {
        let peak = self.peak_volume();
        let sustain = self.sustain_volume();
        let attack_t = i64::from(press_timer) - i64::from(self.decay_length);

        let mut target = if attack_t > 0 {
            lerp_i64(peak, 0, attack_t, i64::from(self.attack_length))
        } else if press_timer > 0 {
            lerp_i64(sustain, peak, i64::from(press_timer), i64::from(self.decay_length))
        } else {
            sustain
        };

        if !pressed {
            target = if self.release_length == 0 {
                0
            } else {
                target * i64::from(release_timer) / i64::from(self.release_length)
            };
        }
        target
    }
}

/// Convert seconds to a whole number of samples, rounding to nearest.
pub fn seconds_to_samples(seconds: f64, sample_rate: u32) -> u32 {
    let samples = libm::round(seconds.max(0.0) * f64::from(sample_rate));
    if samples >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        samples as u32
    }
}

/// Convert a sample count back to seconds.
pub fn samples_to_seconds(samples: u32, sample_rate: u32) -> f64 {
    f64::from(samples) / f64::from(sample_rate.max(1))
}

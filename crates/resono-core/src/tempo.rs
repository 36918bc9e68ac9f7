//! Beat clock for loop alignment.

/// Default tempo for new sessions.
pub const DEFAULT_BPM: f64 = 120.0;

/// Global sample counter plus the tempo used to quantize loops.
///
/// `loop_t` only ever moves forward; every loop slot measures its phase
/// against it.
///
/// ```rust
/// use resono_core::BeatClock;
///
/// let mut clock = BeatClock::new(44100, 120.0);
/// assert_eq!(clock.beat_length(), 22050);
/// clock.advance(33075);
/// assert_eq!(clock.beat_position(), 1.5);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BeatClock {
    bpm: f64,
    sample_rate: u32,
    beat_length: u64,
    loop_t: u64,
}

impl Default for BeatClock {
    fn default() -> Self {
        Self::new(48000, DEFAULT_BPM)
    }
}

impl BeatClock {
    /// Create a clock at `loop_t = 0`.
    pub fn new(sample_rate: u32, bpm: f64) -> Self {
        let mut clock = Self {
            bpm: DEFAULT_BPM,
            sample_rate: sample_rate.max(1),
            beat_length: 1,
            loop_t: 0,
        };
        clock.set_bpm(bpm);
        clock
    }

    /// Tempo in beats per minute.
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Set the tempo. Non-finite or non-positive values are ignored.
    pub fn set_bpm(&mut self, bpm: f64) {
        if !bpm.is_finite() || bpm <= 0.0 {
            return;
        }
        self.bpm = bpm;
        self.beat_length = Self::beat_length_for(self.sample_rate, bpm);
    }

    /// Sample rate the clock counts in.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Change the sample rate, keeping the tempo.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate.max(1);
        self.beat_length = Self::beat_length_for(self.sample_rate, self.bpm);
    }

    fn beat_length_for(sample_rate: u32, bpm: f64) -> u64 {
        let len = libm::round(f64::from(sample_rate) * 60.0 / bpm);
        if len < 1.0 { 1 } else { len as u64 }
    }

    /// Samples per beat, at least 1.
    pub fn beat_length(&self) -> u64 {
        self.beat_length
    }

    /// Global sample counter.
    pub fn loop_t(&self) -> u64 {
        self.loop_t
    }

    /// Advance the global counter.
    #[inline]
    pub fn advance(&mut self, frames: usize) {
        self.loop_t += frames as u64;
    }

    /// Position of the counter in beats.
    pub fn beat_position(&self) -> f64 {
        self.loop_t as f64 / self.beat_length as f64
    }

    /// Convert a beat count to samples, rounded to nearest.
    pub fn beats_to_samples(&self, beats: f64) -> i64 {
        libm::round(beats * self.beat_length as f64) as i64
    }

    /// Convert samples to beats.
    pub fn samples_to_beats(&self, samples: i64) -> f64 {
        samples as f64 / self.beat_length as f64
    }
}

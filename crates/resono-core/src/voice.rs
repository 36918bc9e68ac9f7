//! Voice pool for polyphonic synthesis.
//!
//! A fixed array of [`Voice`]s tracks envelope timers, key velocity and the
//! slew-limited output volume for each sounding note. Voices are addressed by
//! [`VoiceId`] tickets handed out on press, so a note that lost its voice to a
//! steal can never release the new owner.

use alloc::vec::Vec;

use crate::envelope::Envelope;

/// Denominator for every internal volume fraction.
pub const VOLUME_DENOM: i64 = 1 << 16;

/// Largest instrument volume, sixteen times unity.
pub const MAX_VOLUME: i64 = 16 * VOLUME_DENOM;

/// Tuning reference: A4 in Hz.
pub const DEFAULT_BASE_FREQ: f64 = 440.0;

/// Opaque ticket identifying one press of one voice.
pub type VoiceId = u64;

/// Compute the slew limit for a sample rate: one full-scale swing takes
/// about 1/32 of a second.
pub fn max_volume_skip(sample_rate: u32) -> i64 {
    (32 * VOLUME_DENOM / i64::from(sample_rate.max(1))).max(1)
}

/// Phase increment for a semitone offset from the base frequency.
///
/// `round(f * 2^32 / sample_rate)` with `f = base_freq * 2^(semitone / 12)`,
/// saturating at the Nyquist-unsafe upper end.
pub fn semitone_increment(base_freq: f64, semitone: i32, sample_rate: u32) -> u32 {
    let freq = base_freq * libm::exp2(f64::from(semitone) / 12.0);
    let inc = libm::round(freq * 4_294_967_296.0 / f64::from(sample_rate.max(1)));
    if inc <= 0.0 {
        0
    } else if inc >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        inc as u32
    }
}

/// One slot of the voice pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Voice {
    id: VoiceId,
    enabled: bool,
    pressed: bool,
    press_timer: u32,
    release_timer: u32,
    semitone: i32,
    volume_num: i64,
    volume: i64,
}

impl Voice {
    /// Ticket of the press currently owning this voice.
    pub fn id(&self) -> VoiceId {
        self.id
    }

    /// True from press until the release tail ends.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// True while the key is held.
    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    /// Samples left until sustain.
    pub fn press_timer(&self) -> u32 {
        self.press_timer
    }

    /// Samples left in the release tail.
    pub fn release_timer(&self) -> u32 {
        self.release_timer
    }

    /// Semitone offset from the base frequency.
    pub fn semitone(&self) -> i32 {
        self.semitone
    }

    /// Key velocity out of [`VOLUME_DENOM`].
    pub fn volume_num(&self) -> i64 {
        self.volume_num
    }

    /// Current slew-limited volume out of [`VOLUME_DENOM`].
    pub fn volume(&self) -> i64 {
        self.volume
    }

    /// Advance timers by one sample and slew the volume toward the envelope
    /// target.
    #[inline]
    pub fn step(&mut self, envelope: &Envelope, instrument_volume: i64, max_skip: i64) {
        if self.enabled {
            if self.pressed {
                self.press_timer = self.press_timer.saturating_sub(1);
            } else if self.release_timer > 0 {
                self.release_timer -= 1;
                if self.release_timer == 0 {
                    self.enabled = false;
                }
            }
        }

        let target = if self.enabled {
            let t = envelope.target(self.press_timer, self.release_timer, self.pressed);
            let denom = i128::from(VOLUME_DENOM);
            let target = i128::from(t) * i128::from(self.volume_num) / denom
                * i128::from(instrument_volume)
                / denom;
            target.clamp(0, i128::from(MAX_VOLUME)) as i64
        } else {
            0
        };
        self.volume += (target - self.volume).clamp(-max_skip, max_skip);
    }
}

/// Fixed-size pool of voices with press/release bookkeeping.
#[derive(Clone, Debug)]
pub struct VoicePool {
    voices: Vec<Voice>,
    base_freq: f64,
    volume_num: i64,
    max_volume_skip: i64,
    next_id: VoiceId,
}

impl VoicePool {
    /// Create a pool. Polyphony is clamped to at least 1.
    pub fn new(polyphony: usize, sample_rate: u32) -> Self {
        Self {
            voices: alloc::vec![Voice::default(); polyphony.max(1)],
            base_freq: DEFAULT_BASE_FREQ,
            volume_num: VOLUME_DENOM,
            max_volume_skip: max_volume_skip(sample_rate),
            next_id: 1,
        }
    }

    /// Number of voices.
    pub fn polyphony(&self) -> usize {
        self.voices.len()
    }

    /// Recreate the voice array. All sounding notes are dropped.
    pub fn set_polyphony(&mut self, polyphony: usize) {
        self.voices.clear();
        self.voices.resize(polyphony.max(1), Voice::default());
    }

    /// Recompute the slew limit for a new sample rate.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.max_volume_skip = max_volume_skip(sample_rate);
    }

    /// Largest per-sample volume change.
    pub fn max_volume_skip(&self) -> i64 {
        self.max_volume_skip
    }

    /// Tuning reference in Hz.
    pub fn base_freq(&self) -> f64 {
        self.base_freq
    }

    /// Set the tuning reference in Hz.
    pub fn set_base_freq(&mut self, base_freq: f64) {
        self.base_freq = base_freq;
    }

    /// Instrument volume out of [`VOLUME_DENOM`].
    pub fn volume(&self) -> i64 {
        self.volume_num
    }

    /// Set the instrument volume out of [`VOLUME_DENOM`], clamped to
    /// `0..=MAX_VOLUME`.
    pub fn set_volume(&mut self, volume_num: i64) {
        self.volume_num = volume_num.clamp(0, MAX_VOLUME);
    }

    /// All voices.
    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// Voice at `index`.
    pub fn voice(&self, index: usize) -> Option<&Voice> {
        self.voices.get(index)
    }

    /// Number of voices still enabled.
    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.enabled).count()
    }

    /// Allocate a ticket without pressing. Used when the caller must know the
    /// id before the press reaches the audio thread.
    pub fn reserve_id(&mut self) -> VoiceId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Index of the enabled voice owning `id`.
    pub fn find(&self, id: VoiceId) -> Option<usize> {
        self.voices.iter().position(|v| v.enabled && v.id == id)
    }

    /// Choose the voice a new press should take.
    ///
    /// Prefers a disabled voice that has already faded out, then any disabled
    /// voice, then steals the enabled voice closest to the end of its
    /// release.
    pub fn allocate(&self) -> usize {
        if let Some(i) = self.voices.iter().position(|v| !v.enabled && v.volume == 0) {
            return i;
        }
        if let Some(i) = self.voices.iter().position(|v| !v.enabled) {
            return i;
        }
        self.voices
            .iter()
            .enumerate()
            .min_by_key(|(_, v)| v.release_timer)
            .map_or(0, |(i, _)| i)
    }

    /// Press a voice with a fresh ticket. Returns the voice index and ticket.
    pub fn press(&mut self, envelope: &Envelope, semitone: i32, volume_num: i64) -> (usize, VoiceId) {
        let id = self.reserve_id();
        (self.press_with_id(id, envelope, semitone, volume_num), id)
    }

    /// Press a voice under a ticket obtained from [`reserve_id`](Self::reserve_id).
    pub fn press_with_id(&mut self, id: VoiceId, envelope: &Envelope, semitone: i32, volume_num: i64) -> usize {
        if id >= self.next_id {
            self.next_id = id + 1;
        }
        let index = self.allocate();
        let voice = &mut self.voices[index];
        voice.id = id;
        voice.enabled = true;
        voice.pressed = true;
        voice.press_timer = envelope.press_length();
        voice.release_timer = envelope.release_length();
        voice.semitone = semitone;
        voice.volume_num = volume_num.clamp(0, VOLUME_DENOM);
        index
    }

    /// Release the voice owning `id`. Returns false if it is gone.
    pub fn release(&mut self, id: VoiceId) -> bool {
        let Some(index) = self.find(id) else {
            return false;
        };
        let voice = &mut self.voices[index];
        voice.pressed = false;
        if voice.release_timer == 0 {
            voice.enabled = false;
        }
        true
    }

    /// Release every held voice.
    pub fn release_all(&mut self) {
        for voice in &mut self.voices {
            if voice.enabled && voice.pressed {
                voice.pressed = false;
                if voice.release_timer == 0 {
                    voice.enabled = false;
                }
            }
        }
    }

    /// Update the key velocity of the voice owning `id`.
    pub fn set_voice_volume(&mut self, id: VoiceId, volume_num: i64) -> bool {
        let Some(index) = self.find(id) else {
            return false;
        };
        self.voices[index].volume_num = volume_num.clamp(0, VOLUME_DENOM);
        true
    }

    /// Step voice `index` by one sample. Returns its new volume.
    #[inline]
    pub fn step_voice(&mut self, index: usize, envelope: &Envelope) -> i64 {
        let (volume, skip) = (self.volume_num, self.max_volume_skip);
        let voice = &mut self.voices[index];
        voice.step(envelope, volume, skip);
        voice.volume
    }

    /// Phase increment for voice `index` at the current tuning.
    pub fn increment(&self, index: usize, sample_rate: u32) -> u32 {
        let semitone = self.voices.get(index).map_or(0, |v| v.semitone);
        semitone_increment(self.base_freq, semitone, sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_volume_skip() {
        assert_eq!(max_volume_skip(44100), 47);
        assert_eq!(max_volume_skip(48000), 43);
        assert_eq!(max_volume_skip(0), 32 * VOLUME_DENOM);
        assert_eq!(max_volume_skip(u32::MAX), 1);
    }

    #[test]
    fn test_semitone_increment() {
        // 440 Hz at 44100 Hz
        let inc = semitone_increment(440.0, 0, 44100);
        assert_eq!(inc, 42852281);
        let octave = semitone_increment(440.0, 12, 44100);
        assert!((i64::from(octave) - 2 * i64::from(inc)).abs() <= 1);
    }

    #[test]
    fn test_polyphony_clamped() {
        let mut pool = VoicePool::new(0, 44100);
        assert_eq!(pool.polyphony(), 1);
        pool.set_polyphony(4);
        assert_eq!(pool.polyphony(), 4);
    }

    #[test]
    fn test_press_and_release() {
        let env = Envelope::new(1, 1, 1, 10, 0, 5);
        let mut pool = VoicePool::new(2, 44100);
        let (index, id) = pool.press(&env, 3, VOLUME_DENOM);
        let voice = pool.voice(index).copied().unwrap_or_default();
        assert!(voice.is_enabled() && voice.is_pressed());
        assert_eq!(voice.press_timer(), 10);
        assert_eq!(voice.release_timer(), 5);
        assert_eq!(voice.semitone(), 3);

        assert!(pool.release(id));
        assert!(!pool.voices()[index].is_pressed());
        assert!(pool.voices()[index].is_enabled());
        for _ in 0..5 {
            pool.step_voice(index, &env);
        }
        assert!(!pool.voices()[index].is_enabled());
        assert!(!pool.release(id));
    }

    #[test]
    fn test_zero_release_disables_immediately() {
        let env = Envelope::default();
        let mut pool = VoicePool::new(1, 44100);
        let (_, id) = pool.press(&env, 0, VOLUME_DENOM);
        assert!(pool.release(id));
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn test_steal_prefers_shortest_release() {
        let env = Envelope::new(1, 1, 1, 0, 0, 100);
        let mut pool = VoicePool::new(2, 44100);
        let (a, id_a) = pool.press(&env, 0, VOLUME_DENOM);
        let (b, _) = pool.press(&env, 4, VOLUME_DENOM);
        assert_ne!(a, b);

        pool.release(id_a);
        for _ in 0..10 {
            pool.step_voice(a, &env);
            pool.step_voice(b, &env);
        }
        let (stolen, id_c) = pool.press(&env, 7, VOLUME_DENOM);
        assert_eq!(stolen, a);
        // The old ticket no longer reaches the stolen voice.
        assert!(!pool.release(id_a));
        assert_eq!(pool.find(id_c), Some(a));
    }

    #[test]
    fn test_volume_slew_limited() {
        let env = Envelope::default();
        let mut pool = VoicePool::new(1, 44100);
        let (index, _) = pool.press(&env, 0, VOLUME_DENOM);
        let skip = pool.max_volume_skip();
        let mut prev = 0;
        for _ in 0..3000 {
            let v = pool.step_voice(index, &env);
            assert!((v - prev).abs() <= skip);
            prev = v;
        }
        assert_eq!(prev, VOLUME_DENOM);
    }

    #[test]
    fn test_velocity_and_instrument_volume_scale_target() {
        let env = Envelope::default();
        let mut pool = VoicePool::new(1, 44100);
        pool.set_volume(VOLUME_DENOM / 2);
        let (index, id) = pool.press(&env, 0, VOLUME_DENOM);
        assert!(pool.set_voice_volume(id, VOLUME_DENOM / 2));
        for _ in 0..3000 {
            pool.step_voice(index, &env);
        }
        assert_eq!(pool.voices()[index].volume(), VOLUME_DENOM / 4);
    }

    #[test]
    fn test_instrument_volume_clamped() {
        let env = Envelope::default();
        let mut pool = VoicePool::new(1, 44100);
        pool.set_volume(i64::MAX);
        assert_eq!(pool.volume(), MAX_VOLUME);
        pool.set_volume(-5);
        assert_eq!(pool.volume(), 0);

        pool.set_volume(i64::MAX);
        let (index, _) = pool.press(&env, 0, VOLUME_DENOM);
        for _ in 0..100_000 {
            pool.step_voice(index, &env);
        }
        assert_eq!(pool.voices()[index].volume(), MAX_VOLUME);
    }

    #[test]
    fn test_step_never_overflows_with_large_volume() {
        let env = Envelope::default();
        let mut voice = Voice {
            enabled: true,
            pressed: true,
            volume_num: VOLUME_DENOM,
            ..Voice::default()
        };
        voice.step(&env, i64::MAX, i64::MAX);
        assert_eq!(voice.volume(), MAX_VOLUME);
    }
}

//! Polyphonic FM instrument: a voice pool driving one shared FM graph.

use alloc::vec::Vec;

use crate::envelope::Envelope;
use crate::fm::{FmGraph, VoiceGraphState};
use crate::patch::Patch;
use crate::voice::{VOLUME_DENOM, Voice, VoiceId, VoicePool};

/// FM instrument rendering signed 32-bit mono samples.
///
/// Each voice owns a [`VoiceGraphState`]; the graph itself is shared. Voice
/// outputs are scaled by `1 / polyphony` so a full chord cannot clip.
///
/// ```rust
/// use resono_core::FmInstrument;
///
/// let mut synth = FmInstrument::new(44100, 4);
/// let id = synth.press_voice(0, 1 << 16);
/// let mut buf = [0i32; 256];
/// synth.synthesize(&mut buf);
/// synth.release_voice(id);
/// ```
#[derive(Clone, Debug)]
pub struct FmInstrument {
    graph: FmGraph,
    envelope: Envelope,
    pool: VoicePool,
    states: Vec<VoiceGraphState>,
    sample_rate: u32,
}

impl FmInstrument {
    /// A sine instrument with the default envelope.
    pub fn new(sample_rate: u32, polyphony: usize) -> Self {
        let graph = FmGraph::sine();
        let pool = VoicePool::new(polyphony, sample_rate);
        let states = (0..pool.polyphony()).map(|_| graph.new_voice_state()).collect();
        Self {
            graph,
            envelope: Envelope::default(),
            pool,
            states,
            sample_rate: sample_rate.max(1),
        }
    }

    /// Build an instrument from a patch.
    pub fn from_patch(patch: &Patch, sample_rate: u32) -> Self {
        let mut instrument = Self::new(sample_rate, patch.polyphony);
        instrument.set_envelope(patch.envelope);
        instrument.set_synth(patch.graph.clone());
        instrument
    }

    /// The running graph.
    pub fn graph(&self) -> &FmGraph {
        &self.graph
    }

    /// The running envelope.
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// The voice pool.
    pub fn pool(&self) -> &VoicePool {
        &self.pool
    }

    /// All voices.
    pub fn voices(&self) -> &[Voice] {
        self.pool.voices()
    }

    /// Output sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of voices.
    pub fn polyphony(&self) -> usize {
        self.pool.polyphony()
    }

    /// Voices still sounding.
    pub fn active_voices(&self) -> usize {
        self.pool.active_count()
    }

    /// Install a graph and return the previous one.
    pub fn set_synth(&mut self, mut graph: FmGraph) -> FmGraph {
        self.swap_synth(&mut graph);
        graph
    }

    /// Install the graph in `graph`, leaving the previous graph in its place.
    ///
    /// Index-compatible graphs keep every voice's phase state so parameter
    /// edits are click-free. Any other graph resets all voice states.
    pub fn swap_synth(&mut self, graph: &mut FmGraph) {
        if graph.needs_finish() {
            graph.finish_changes();
        }
        let compatible = self.graph.is_index_compatible(graph);
        core::mem::swap(&mut self.graph, graph);

        if compatible {
            self.refresh_increments();
        } else {
            for state in &mut self.states {
                self.graph.reset_voice(state);
            }
            self.refresh_increments();

            #[cfg(feature = "tracing")]
            tracing::debug!(oscillators = self.graph.len(), "voice states reset for new graph shape");
        }
    }

    /// Install `graph` together with voice states built for it elsewhere,
    /// leaving the previous graph and states in the arguments.
    ///
    /// Sounding voices restart from initial phases, as with an incompatible
    /// [`swap_synth`](Self::swap_synth), but nothing is allocated here. When
    /// `states` does not fit the graph or the polyphony it is left untouched
    /// and the install falls back to [`swap_synth`](Self::swap_synth).
    pub fn swap_synth_with_states(
        &mut self,
        graph: &mut FmGraph,
        states: &mut Vec<VoiceGraphState>,
    ) {
        if graph.needs_finish() {
            graph.finish_changes();
        }
        let fits = states.len() == self.states.len()
            && states.iter().all(|s| graph.fits_voice_state(s));
        if !fits {
            self.swap_synth(graph);
            return;
        }
        core::mem::swap(&mut self.graph, graph);
        core::mem::swap(&mut self.states, states);
        self.refresh_increments();
    }

    /// Fresh voice states for `graph`, one per voice, for
    /// [`swap_synth_with_states`](Self::swap_synth_with_states).
    pub fn voice_states_for(graph: &FmGraph, polyphony: usize) -> Vec<VoiceGraphState> {
        (0..polyphony.max(1)).map(|_| graph.new_voice_state()).collect()
    }

    /// Replace the envelope. Affects sounding voices immediately.
    pub fn set_envelope(&mut self, envelope: Envelope) {
        self.envelope = envelope;
    }

    /// Set the tuning reference in Hz and retune every voice.
    pub fn set_tuning(&mut self, base_freq: f64) {
        if self.pool.base_freq() == base_freq {
            return;
        }
        self.pool.set_base_freq(base_freq);
        self.refresh_increments();
    }

    /// Tuning reference in Hz.
    pub fn tuning(&self) -> f64 {
        self.pool.base_freq()
    }

    /// Set the instrument volume out of [`VOLUME_DENOM`].
    pub fn set_volume(&mut self, volume_num: i64) {
        self.pool.set_volume(volume_num);
    }

    /// Instrument volume out of [`VOLUME_DENOM`].
    pub fn volume(&self) -> i64 {
        self.pool.volume()
    }

    /// Change the number of voices, clamped to at least 1. Silences all
    /// voices.
    pub fn set_polyphony(&mut self, polyphony: usize) {
        self.pool.set_polyphony(polyphony);
        self.states.clear();
        self.states
            .resize_with(self.pool.polyphony(), || self.graph.new_voice_state());

        #[cfg(feature = "tracing")]
        tracing::debug!(polyphony = self.pool.polyphony(), "polyphony changed");
    }

    /// Change the output sample rate, retuning voices and the slew limit.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate.max(1);
        self.pool.set_sample_rate(self.sample_rate);
        self.refresh_increments();
    }

    /// Press a voice at `semitone` from the tuning reference with velocity
    /// `volume_num / VOLUME_DENOM`.
    pub fn press_voice(&mut self, semitone: i32, volume_num: i64) -> VoiceId {
        let id = self.pool.reserve_id();
        self.press_voice_with_id(id, semitone, volume_num);
        id
    }

    /// Press a voice under a ticket reserved by the caller.
    pub fn press_voice_with_id(&mut self, id: VoiceId, semitone: i32, volume_num: i64) {
        let index = self.pool.press_with_id(id, &self.envelope, semitone, volume_num);
        let increment = self.pool.increment(index, self.sample_rate);
        let state = &mut self.states[index];
        self.graph.reset_voice(state);
        self.graph.set_voice_increment(state, increment);
    }

    /// Reserve a voice ticket for a later [`press_voice_with_id`](Self::press_voice_with_id).
    pub fn reserve_voice_id(&mut self) -> VoiceId {
        self.pool.reserve_id()
    }

    /// Release the voice pressed under `id`.
    pub fn release_voice(&mut self, id: VoiceId) -> bool {
        self.pool.release(id)
    }

    /// Release every held voice.
    pub fn release_all(&mut self) {
        self.pool.release_all();
    }

    /// Update the velocity of the voice pressed under `id`.
    pub fn set_voice_volume(&mut self, id: VoiceId, volume_num: i64) -> bool {
        self.pool.set_voice_volume(id, volume_num)
    }

    fn refresh_increments(&mut self) {
        for (index, state) in self.states.iter_mut().enumerate() {
            let increment = self.pool.increment(index, self.sample_rate);
            self.graph.set_voice_increment(state, increment);
        }
    }

    /// Render `dst.len()` samples, overwriting `dst`.
    pub fn synthesize(&mut self, dst: &mut [i32]) {
        let denom = VOLUME_DENOM * self.pool.polyphony() as i64;
        for out in dst.iter_mut() {
            let mut s: i64 = 0;
            for (index, state) in self.states.iter_mut().enumerate() {
                let volume = self.pool.step_voice(index, &self.envelope);
                if volume == 0 {
                    continue;
                }
                self.graph.set_voice_volume(state, volume, denom);
                s = s.saturating_add(self.graph.step(state));
            }
            *out = s.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fm::ModulationMode;
    use crate::oscillator::{Oscillator, Waveform};

    #[test]
    fn test_silent_without_voices() {
        let mut synth = FmInstrument::new(44100, 2);
        let mut buf = [7i32; 64];
        synth.synthesize(&mut buf);
        assert!(buf.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_press_produces_sound() {
        let mut synth = FmInstrument::new(44100, 1);
        synth.press_voice(0, VOLUME_DENOM);
        let mut buf = [0i32; 4096];
        synth.synthesize(&mut buf);
        assert!(buf.iter().any(|&s| s > i32::MAX / 2));
        assert_eq!(synth.active_voices(), 1);
    }

    #[test]
    fn test_compatible_swap_keeps_phase() {
        let mut synth = FmInstrument::new(44100, 1);
        synth.press_voice(0, VOLUME_DENOM);
        let mut buf = [0i32; 100];
        synth.synthesize(&mut buf);
        let phase_before = synth.states[0].oscillators()[0].phase;

        let mut louder = synth.graph().clone();
        if let Some(osc) = louder.oscillator_mut(0) {
            osc.set_amplitude(1, 2);
        }
        synth.set_synth(louder);
        assert_eq!(synth.states[0].oscillators()[0].phase, phase_before);
    }

    #[test]
    fn test_incompatible_swap_resets_state() {
        let mut synth = FmInstrument::new(44100, 1);
        synth.press_voice(0, VOLUME_DENOM);
        let mut buf = [0i32; 100];
        synth.synthesize(&mut buf);

        let mut graph = FmGraph::new(ModulationMode::Frequency);
        let c = graph.add_oscillator(Oscillator::new(Waveform::Triangle));
        let m = graph.add_oscillator(Oscillator::new(Waveform::Sine).with_period(2, 1));
        graph.add_carrier(c);
        graph.connect(c, m);
        let old = synth.set_synth(graph);
        assert_eq!(old.len(), 1);
        assert_eq!(synth.states[0].len(), 2);
        assert!(synth.states[0].oscillators().iter().all(|s| s.phase == 0));
        assert!(synth.states[0].increment() > 0);
    }

    #[test]
    fn test_tuning_retunes_voices() {
        let mut synth = FmInstrument::new(44100, 1);
        synth.press_voice(0, VOLUME_DENOM);
        let before = synth.states[0].increment();
        synth.set_tuning(880.0);
        let after = synth.states[0].increment();
        assert!((i64::from(after) - 2 * i64::from(before)).abs() <= 1);
    }

    #[test]
    fn test_set_polyphony_rebuilds_states() {
        let mut synth = FmInstrument::new(44100, 2);
        synth.press_voice(0, VOLUME_DENOM);
        synth.set_polyphony(0);
        assert_eq!(synth.polyphony(), 1);
        assert_eq!(synth.states.len(), 1);
        assert_eq!(synth.active_voices(), 0);
    }

    #[test]
    fn test_swap_with_prepared_states() {
        let mut synth = FmInstrument::new(44100, 2);
        synth.press_voice(0, VOLUME_DENOM);
        let mut buf = [0i32; 64];
        synth.synthesize(&mut buf);

        let mut graph = FmGraph::new(ModulationMode::Frequency);
        let c = graph.add_oscillator(Oscillator::new(Waveform::Sine));
        let m = graph.add_oscillator(Oscillator::new(Waveform::Sine).with_amplitude(1, 4));
        graph.add_carrier(c);
        graph.connect(c, m);
        graph.finish_changes();

        let mut states = FmInstrument::voice_states_for(&graph, 2);
        let mut installed = graph.clone();
        synth.swap_synth_with_states(&mut installed, &mut states);
        assert_eq!(synth.graph(), &graph);
        assert_eq!(installed.len(), 1);
        assert_eq!(states.len(), 2);
        assert!(states.iter().all(|s| installed.fits_voice_state(s)));

        // the held voice keeps sounding at its pitch
        synth.synthesize(&mut buf);
        assert!(buf.iter().any(|&s| s != 0));
        assert_ne!(synth.states[0].increment(), 0);
    }

    #[test]
    fn test_swap_with_mismatched_states_falls_back() {
        let mut synth = FmInstrument::new(44100, 3);
        let mut graph = FmGraph::new(ModulationMode::Phase);
        let c = graph.add_oscillator(Oscillator::new(Waveform::Saw));
        let m = graph.add_oscillator(Oscillator::new(Waveform::Sine));
        graph.add_carrier(c);
        graph.connect(c, m);
        graph.finish_changes();

        let mut states = FmInstrument::voice_states_for(&graph, 1);
        synth.swap_synth_with_states(&mut graph, &mut states);
        assert_eq!(synth.graph().len(), 2);
        assert_eq!(states.len(), 1);
        assert!(synth.states.iter().all(|s| synth.graph().fits_voice_state(s)));
    }
}

//! FM oscillator graph.
//!
//! An [`FmGraph`] is a flat array of [`Oscillator`]s plus a list of carrier
//! indices. Each oscillator lists the indices of the oscillators that
//! modulate it. Edits may leave the graph in any shape; [`FmGraph::finish_changes`]
//! sanitizes it back to the evaluation invariants:
//!
//! - every index points inside the array, with no duplicates or self-references
//! - every non-carrier is referenced by at least one parent (no orphans)
//! - parents precede their children, so modulator indices are strictly larger
//!   than the index of the oscillator they modulate
//! - carrier and modulator lists are sorted ascending
//! - the cached period lookup matches the current periods
//!
//! Evaluation walks the array back to front so every modulator has already
//! produced its sample by the time its parent reads it.

use alloc::vec;
use alloc::vec::Vec;

use crate::fract::mul_fract;
use crate::oscillator::{Oscillator, OscillatorState, Waveform};

/// How modulator outputs act on their parent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ModulationMode {
    /// Modulators scale the parent's phase increment around unity.
    Frequency,
    /// Modulators offset the parent's phase.
    #[default]
    Phase,
}

impl ModulationMode {
    /// Upper-case name used by instrument files.
    pub fn name(self) -> &'static str {
        match self {
            ModulationMode::Frequency => "FREQUENCY",
            ModulationMode::Phase => "PHASE",
        }
    }

    /// Parse a mode name, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Self> {
        [ModulationMode::Frequency, ModulationMode::Phase]
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(name))
    }
}

/// Per-voice evaluation state for one graph shape.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VoiceGraphState {
    increment: u32,
    volume: i64,
    volume_denom: i64,
    oscillators: Vec<OscillatorState>,
}

impl VoiceGraphState {
    /// Voice pitch increment, in phase units per sample.
    pub fn increment(&self) -> u32 {
        self.increment
    }

    /// Per-oscillator runtime state.
    pub fn oscillators(&self) -> &[OscillatorState] {
        &self.oscillators
    }

    /// Number of oscillators this state was built for.
    pub fn len(&self) -> usize {
        self.oscillators.len()
    }

    /// True when built for an empty graph.
    pub fn is_empty(&self) -> bool {
        self.oscillators.is_empty()
    }
}

/// A directed acyclic graph of oscillators with designated carriers.
///
/// ```rust
/// use resono_core::{FmGraph, ModulationMode, Oscillator, Waveform};
///
/// let mut graph = FmGraph::new(ModulationMode::Phase);
/// let modulator = graph.add_oscillator(Oscillator::new(Waveform::Sine).with_period(2, 1));
/// let carrier = graph.add_oscillator(Oscillator::new(Waveform::Sine));
/// graph.add_carrier(carrier);
/// graph.connect(carrier, modulator);
/// graph.finish_changes();
///
/// // The carrier now precedes its modulator.
/// assert_eq!(graph.carriers(), &[0]);
/// assert_eq!(graph.oscillators()[0].modulators(), &[1]);
/// assert_eq!(graph.period_lookup(1), Some((2, 1)));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FmGraph {
    mode: ModulationMode,
    oscillators: Vec<Oscillator>,
    carriers: Vec<usize>,
    period_lookup: Vec<(u64, u64)>,
    dirty: bool,
}

impl Default for FmGraph {
    fn default() -> Self {
        Self::sine()
    }
}

impl FmGraph {
    /// An empty graph. Produces silence until a carrier is added.
    pub fn new(mode: ModulationMode) -> Self {
        Self {
            mode,
            oscillators: Vec::new(),
            carriers: Vec::new(),
            period_lookup: Vec::new(),
            dirty: false,
        }
    }

    /// A single unit sine carrier.
    pub fn sine() -> Self {
        let mut graph = Self::new(ModulationMode::Phase);
        let carrier = graph.add_oscillator(Oscillator::new(Waveform::Sine));
        graph.add_carrier(carrier);
        graph.finish_changes();
        graph
    }

    /// Build a graph from raw parts and sanitize it.
    pub fn from_parts(mode: ModulationMode, oscillators: Vec<Oscillator>, carriers: Vec<usize>) -> Self {
        let mut graph = Self {
            mode,
            oscillators,
            carriers,
            period_lookup: Vec::new(),
            dirty: true,
        };
        graph.finish_changes();
        graph
    }

    /// Modulation mode.
    pub fn mode(&self) -> ModulationMode {
        self.mode
    }

    /// Set the modulation mode.
    pub fn set_mode(&mut self, mode: ModulationMode) {
        self.mode = mode;
    }

    /// All oscillators in evaluation order (parents first).
    pub fn oscillators(&self) -> &[Oscillator] {
        &self.oscillators
    }

    /// Oscillator at `index`.
    pub fn oscillator(&self, index: usize) -> Option<&Oscillator> {
        self.oscillators.get(index)
    }

    /// Mutable oscillator at `index`. Marks the graph as needing
    /// [`finish_changes`](Self::finish_changes).
    pub fn oscillator_mut(&mut self, index: usize) -> Option<&mut Oscillator> {
        self.dirty = true;
        self.oscillators.get_mut(index)
    }

    /// Carrier indices.
    pub fn carriers(&self) -> &[usize] {
        &self.carriers
    }

    /// Number of oscillators.
    pub fn len(&self) -> usize {
        self.oscillators.len()
    }

    /// True when the graph has no oscillators.
    pub fn is_empty(&self) -> bool {
        self.oscillators.is_empty()
    }

    /// True when edits have been made since the last `finish_changes`.
    pub fn needs_finish(&self) -> bool {
        self.dirty
    }

    /// Append an oscillator and return its index.
    ///
    /// An oscillator nobody references is dropped by the next
    /// `finish_changes`, so connect it or make it a carrier first.
    pub fn add_oscillator(&mut self, oscillator: Oscillator) -> usize {
        self.dirty = true;
        self.oscillators.push(oscillator);
        self.oscillators.len() - 1
    }

    /// Remove the oscillator at `index`, dropping every reference to it and
    /// shifting later indices down.
    pub fn remove_oscillator(&mut self, index: usize) -> Option<Oscillator> {
        if index >= self.oscillators.len() {
            return None;
        }
        self.dirty = true;
        let removed = self.oscillators.remove(index);
        let remap = |i: usize| -> Option<usize> {
            match i.cmp(&index) {
                core::cmp::Ordering::Less => Some(i),
                core::cmp::Ordering::Equal => None,
                core::cmp::Ordering::Greater => Some(i - 1),
            }
        };
        self.carriers = self.carriers.iter().filter_map(|&c| remap(c)).collect();
        for osc in &mut self.oscillators {
            osc.modulators = osc.modulators.iter().filter_map(|&m| remap(m)).collect();
        }
        Some(removed)
    }

    /// Mark `index` as a carrier.
    pub fn add_carrier(&mut self, index: usize) {
        self.dirty = true;
        self.carriers.push(index);
    }

    /// Remove `index` from the carrier list.
    pub fn remove_carrier(&mut self, index: usize) {
        self.dirty = true;
        self.carriers.retain(|&c| c != index);
    }

    /// Make `child` a modulator of `parent`.
    pub fn connect(&mut self, parent: usize, child: usize) {
        self.dirty = true;
        if let Some(osc) = self.oscillators.get_mut(parent) {
            osc.modulators.push(child);
        }
    }

    /// Remove `child` from the modulators of `parent`.
    pub fn disconnect(&mut self, parent: usize, child: usize) {
        self.dirty = true;
        if let Some(osc) = self.oscillators.get_mut(parent) {
            osc.modulators.retain(|&m| m != child);
        }
    }

    /// Cached product of periods from the root carrier down to `index`.
    pub fn period_lookup(&self, index: usize) -> Option<(u64, u64)> {
        self.period_lookup.get(index).copied()
    }

    /// True when `other` has the same oscillator count, carriers and
    /// modulator lists, so per-voice state can be carried across a swap.
    pub fn is_index_compatible(&self, other: &FmGraph) -> bool {
        self.oscillators.len() == other.oscillators.len()
            && self.carriers == other.carriers
            && self
                .oscillators
                .iter()
                .zip(&other.oscillators)
                .all(|(a, b)| a.modulators == b.modulators)
    }

    /// Restore the graph invariants after arbitrary edits.
    ///
    /// Never fails: invalid references are dropped, orphans removed, and
    /// cycles broken at the lowest-indexed unplaced oscillator.
    pub fn finish_changes(&mut self) {
        loop {
            self.drop_invalid_references();
            self.drop_orphans();
            if !self.sort_topologically() {
                break;
            }
        }
        self.carriers.sort_unstable();
        for osc in &mut self.oscillators {
            osc.modulators.sort_unstable();
        }
        self.refresh_period_lookup();
        self.dirty = false;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            oscillators = self.oscillators.len(),
            carriers = self.carriers.len(),
            "fm graph finished"
        );
    }

    fn drop_invalid_references(&mut self) {
        let len = self.oscillators.len();
        self.carriers.retain(|&c| c < len);
        self.carriers.sort_unstable();
        self.carriers.dedup();
        for (i, osc) in self.oscillators.iter_mut().enumerate() {
            osc.modulators.retain(|&m| m < len && m != i);
            osc.modulators.sort_unstable();
            osc.modulators.dedup();
        }
    }

    fn drop_orphans(&mut self) {
        loop {
            let len = self.oscillators.len();
            let mut referenced = vec![false; len];
            for &c in &self.carriers {
                referenced[c] = true;
            }
            for osc in &self.oscillators {
                for &m in &osc.modulators {
                    referenced[m] = true;
                }
            }
            if referenced.iter().all(|&r| r) {
                return;
            }

            let mut remap = vec![None; len];
            let mut next = 0;
            for (old, &keep) in referenced.iter().enumerate() {
                if keep {
                    remap[old] = Some(next);
                    next += 1;
                }
            }
            let mut old_index = 0;
            self.oscillators.retain(|_| {
                let keep = referenced[old_index];
                old_index += 1;
                keep
            });
            self.remap_references(&remap);
        }
    }

    /// Reorder so parents precede children. Returns true when a cycle had to
    /// be broken, in which case orphans may have appeared.
    fn sort_topologically(&mut self) -> bool {
        let len = self.oscillators.len();
        let mut parents: Vec<Vec<usize>> = vec![Vec::new(); len];
        for (p, osc) in self.oscillators.iter().enumerate() {
            for &m in &osc.modulators {
                parents[m].push(p);
            }
        }

        let mut new_index: Vec<Option<usize>> = vec![None; len];
        let mut order = Vec::with_capacity(len);
        let mut broke_cycle = false;

        while order.len() < len {
            // Candidate key: (largest new index among placed parents, old index).
            let key = |i: usize| -> (isize, usize) {
                let max_parent = parents[i]
                    .iter()
                    .filter_map(|&p| new_index[p])
                    .max()
                    .map_or(-1, |n| n as isize);
                (max_parent, i)
            };

            let ready = (0..len)
                .filter(|&i| new_index[i].is_none())
                .filter(|&i| parents[i].iter().all(|&p| new_index[p].is_some()))
                .min_by_key(|&i| key(i));

            let chosen = match ready {
                Some(i) => i,
                None => {
                    let Some(i) = (0..len)
                        .filter(|&i| new_index[i].is_none())
                        .min_by_key(|&i| key(i))
                    else {
                        break;
                    };
                    for &p in &parents[i] {
                        if new_index[p].is_none() {
                            self.oscillators[p].modulators.retain(|&m| m != i);
                        }
                    }
                    parents[i].retain(|&p| new_index[p].is_some());
                    broke_cycle = true;
                    i
                }
            };
            new_index[chosen] = Some(order.len());
            order.push(chosen);
        }

        let mut slots: Vec<Option<Oscillator>> =
            core::mem::take(&mut self.oscillators).into_iter().map(Some).collect();
        self.oscillators = order.iter().filter_map(|&old| slots[old].take()).collect();
        self.remap_references(&new_index);

        // Any edge that does not point forward would be a cycle remnant.
        for (i, osc) in self.oscillators.iter_mut().enumerate() {
            let before = osc.modulators.len();
            osc.modulators.retain(|&m| m > i);
            broke_cycle |= osc.modulators.len() != before;
        }

        #[cfg(feature = "tracing")]
        if broke_cycle {
            tracing::debug!("fm graph cycle broken during sort");
        }

        broke_cycle
    }

    fn remap_references(&mut self, remap: &[Option<usize>]) {
        let map = |i: usize| remap.get(i).copied().flatten();
        self.carriers = self.carriers.iter().filter_map(|&c| map(c)).collect();
        for osc in &mut self.oscillators {
            osc.modulators = osc.modulators.iter().filter_map(|&m| map(m)).collect();
        }
    }

    fn refresh_period_lookup(&mut self) {
        let len = self.oscillators.len();
        let mut first_parent: Vec<Option<usize>> = vec![None; len];
        for (p, osc) in self.oscillators.iter().enumerate() {
            for &m in &osc.modulators {
                if first_parent[m].is_none() {
                    first_parent[m] = Some(p);
                }
            }
        }

        let mut is_carrier = vec![false; len];
        for &c in &self.carriers {
            is_carrier[c] = true;
        }

        self.period_lookup.clear();
        for i in 0..len {
            let base = if is_carrier[i] {
                (1, 1)
            } else {
                first_parent[i].map_or((1, 1), |p| self.period_lookup[p])
            };
            let own = self.oscillators[i].period_fract();
            self.period_lookup.push(mul_fract(base, own));
        }
    }

    /// Allocate evaluation state sized for this graph, at initial phases.
    pub fn new_voice_state(&self) -> VoiceGraphState {
        let mut state = VoiceGraphState {
            increment: 0,
            volume: 0,
            volume_denom: 1,
            oscillators: vec![OscillatorState::default(); self.oscillators.len()],
        };
        self.reset_voice(&mut state);
        state
    }

    /// True if `state` has one entry per oscillator of this graph, so
    /// evaluating it needs no resize.
    pub fn fits_voice_state(&self, state: &VoiceGraphState) -> bool {
        state.oscillators.len() == self.oscillators.len()
    }

    /// Reset every oscillator of `state` to its initial phase, resizing the
    /// state if the graph shape changed.
    pub fn reset_voice(&self, state: &mut VoiceGraphState) {
        state
            .oscillators
            .resize(self.oscillators.len(), OscillatorState::default());
        for (osc, s) in self.oscillators.iter().zip(&mut state.oscillators) {
            osc.reset(s);
        }
        let increment = state.increment;
        self.set_voice_increment(state, increment);
    }

    /// Set the voice pitch increment and derive each oscillator's increment
    /// from the period lookup.
    pub fn set_voice_increment(&self, state: &mut VoiceGraphState, increment: u32) {
        state.increment = increment;
        for (lookup, s) in self.period_lookup.iter().zip(&mut state.oscillators) {
            let (num, denom) = *lookup;
            s.increment = (u64::from(increment) * num / denom.max(1)) as u32;
        }
    }

    /// Set the output scale for one voice to `volume / denom`.
    #[inline]
    pub fn set_voice_volume(&self, state: &mut VoiceGraphState, volume: i64, denom: i64) {
        state.volume = volume;
        state.volume_denom = denom.max(1);
    }

    /// Evaluate one sample for one voice, returning the scaled carrier sum.
    #[inline]
    pub fn step(&self, state: &mut VoiceGraphState) -> i64 {
        match self.mode {
            ModulationMode::Phase => self.step_phase(state),
            ModulationMode::Frequency => self.step_frequency(state),
        }
        let sum: i64 = self
            .carriers
            .iter()
            .map(|&c| i64::from(state.oscillators[c].output))
            .sum();
        let scaled = i128::from(sum) * i128::from(state.volume) / i128::from(state.volume_denom);
        scaled.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }

    #[inline]
    fn modulator_sum(osc: &Oscillator, states: &[OscillatorState]) -> i64 {
        osc.modulators
            .iter()
            .map(|&m| i64::from(states[m].output))
            .sum()
    }

    fn step_phase(&self, state: &mut VoiceGraphState) {
        let states = &mut state.oscillators;
        for i in (0..self.oscillators.len()).rev() {
            let osc = &self.oscillators[i];
            let x = Self::modulator_sum(osc, states);
            let s = &mut states[i];
            let increment = s.increment;
            osc.advance(s, increment, x as u32);
        }
    }

    fn step_frequency(&self, state: &mut VoiceGraphState) {
        let states = &mut state.oscillators;
        for i in (0..self.oscillators.len()).rev() {
            let osc = &self.oscillators[i];
            let x = (1i64 << 31) + Self::modulator_sum(osc, states);
            let s = &mut states[i];
            let increment = (i128::from(s.increment) * i128::from(x)) >> 31;
            osc.advance(s, increment as u32, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine() -> Oscillator {
        Oscillator::new(Waveform::Sine)
    }

    #[test]
    fn test_default_is_single_sine_carrier() {
        let graph = FmGraph::default();
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.carriers(), &[0]);
        assert_eq!(graph.period_lookup(0), Some((1, 1)));
        assert!(!graph.needs_finish());
    }

    #[test]
    fn test_out_of_range_and_duplicate_references_dropped() {
        let mut graph = FmGraph::new(ModulationMode::Phase);
        graph.add_oscillator(sine().with_modulators(&[1, 1, 5, 0]));
        graph.add_oscillator(sine());
        graph.add_carrier(0);
        graph.add_carrier(0);
        graph.add_carrier(9);
        graph.finish_changes();

        assert_eq!(graph.carriers(), &[0]);
        assert_eq!(graph.oscillators()[0].modulators(), &[1]);
    }

    #[test]
    fn test_orphans_removed_transitively() {
        let mut graph = FmGraph::new(ModulationMode::Phase);
        let c = graph.add_oscillator(sine());
        let orphan = graph.add_oscillator(sine());
        let orphan_child = graph.add_oscillator(sine());
        graph.add_carrier(c);
        graph.connect(orphan, orphan_child);
        graph.finish_changes();

        assert_eq!(graph.len(), 1);
        assert_eq!(graph.carriers(), &[0]);
    }

    #[test]
    fn test_parents_sorted_before_children() {
        let mut graph = FmGraph::new(ModulationMode::Phase);
        let m2 = graph.add_oscillator(sine().with_period(3, 1));
        let m1 = graph.add_oscillator(sine().with_period(2, 1));
        let c = graph.add_oscillator(sine());
        graph.add_carrier(c);
        graph.connect(c, m1);
        graph.connect(m1, m2);
        graph.finish_changes();

        assert_eq!(graph.carriers(), &[0]);
        assert_eq!(graph.oscillators()[0].modulators(), &[1]);
        assert_eq!(graph.oscillators()[1].modulators(), &[2]);
        assert_eq!(graph.oscillators()[1].period(), (2, 1));
        assert_eq!(graph.period_lookup(2), Some((6, 1)));
    }

    #[test]
    fn test_cycle_is_broken() {
        let mut graph = FmGraph::new(ModulationMode::Phase);
        let a = graph.add_oscillator(sine());
        let b = graph.add_oscillator(sine());
        graph.add_carrier(a);
        graph.connect(a, b);
        graph.connect(b, a);
        graph.finish_changes();

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.oscillators()[0].modulators(), &[1]);
        assert!(graph.oscillators()[1].modulators().is_empty());
    }

    #[test]
    fn test_finish_changes_idempotent() {
        let mut graph = FmGraph::new(ModulationMode::Frequency);
        let m = graph.add_oscillator(sine().with_period(5, 4));
        let c1 = graph.add_oscillator(sine());
        let c2 = graph.add_oscillator(sine().with_period(1, 2));
        graph.add_carrier(c2);
        graph.add_carrier(c1);
        graph.connect(c1, m);
        graph.connect(c2, m);
        graph.finish_changes();
        let once = graph.clone();
        graph.finish_changes();
        assert_eq!(graph, once);
    }

    #[test]
    fn test_remove_oscillator_remaps() {
        let mut graph = FmGraph::new(ModulationMode::Phase);
        let c = graph.add_oscillator(sine());
        let m1 = graph.add_oscillator(sine());
        let m2 = graph.add_oscillator(sine());
        graph.add_carrier(c);
        graph.connect(c, m1);
        graph.connect(c, m2);
        graph.finish_changes();

        assert!(graph.remove_oscillator(1).is_some());
        graph.finish_changes();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.oscillators()[0].modulators(), &[1]);
        assert!(graph.remove_oscillator(7).is_none());
    }

    #[test]
    fn test_index_compatibility() {
        let a = FmGraph::sine();
        let mut b = a.clone();
        if let Some(osc) = b.oscillator_mut(0) {
            osc.set_amplitude(1, 2);
        }
        b.finish_changes();
        assert!(a.is_index_compatible(&b));

        let mut c = a.clone();
        let m = c.add_oscillator(sine());
        c.connect(0, m);
        c.finish_changes();
        assert!(!a.is_index_compatible(&c));
    }

    #[test]
    fn test_zero_amplitude_modulator_is_transparent() {
        let plain = FmGraph::sine();
        let mut modulated = FmGraph::sine();
        let m = modulated.add_oscillator(sine().with_amplitude(0, 1).with_period(7, 3));
        modulated.connect(0, m);
        modulated.finish_changes();

        let mut a = plain.new_voice_state();
        let mut b = modulated.new_voice_state();
        plain.set_voice_increment(&mut a, 40_000_000);
        modulated.set_voice_increment(&mut b, 40_000_000);
        plain.set_voice_volume(&mut a, 1, 1);
        modulated.set_voice_volume(&mut b, 1, 1);
        for _ in 0..1000 {
            assert_eq!(plain.step(&mut a), modulated.step(&mut b));
        }
    }

    #[test]
    fn test_step_scales_by_voice_volume() {
        let mut graph = FmGraph::new(ModulationMode::Phase);
        let c = graph.add_oscillator(Oscillator::new(Waveform::Square));
        graph.add_carrier(c);
        graph.finish_changes();

        let mut state = graph.new_voice_state();
        graph.set_voice_increment(&mut state, 1000);
        graph.set_voice_volume(&mut state, 1, 4);
        assert_eq!(graph.step(&mut state), i64::from(i32::MAX) / 4);
    }

    #[test]
    fn test_step_saturates_huge_volume() {
        let mut graph = FmGraph::new(ModulationMode::Phase);
        let c = graph.add_oscillator(Oscillator::new(Waveform::Square));
        graph.add_carrier(c);
        graph.finish_changes();

        let mut state = graph.new_voice_state();
        graph.set_voice_increment(&mut state, 1000);
        graph.set_voice_volume(&mut state, i64::MAX, 1);
        assert_eq!(graph.step(&mut state), i64::MAX);
    }
}

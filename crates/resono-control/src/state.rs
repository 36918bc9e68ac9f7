//! Accumulated control values and pending note events.
//!
//! [`ControlState`] lives on the UI thread. The bindings engine writes into
//! it as controller events arrive; once per frame [`ControlState::apply`]
//! folds everything into a modified copy of the patch and pushes the result
//! through an [`InstrumentSurface`].
//!
//! Every value is keyed by [`FullId`], so the same bind driven from two
//! controllers keeps two independent contributions. Multipliers combine by
//! product, offsets by sum.

use std::collections::{BTreeMap, VecDeque};

use resono_core::{
    DEFAULT_BASE_FREQ, LoopCommand, MAX_VOLUME, PERIOD_MUL, Patch, VOLUME_DENOM, VoiceId,
};

use crate::bind::EnvelopeStage;
use crate::bindings::Bindings;
use crate::error::{ControlError, Result};
use crate::event::FullId;
use crate::surface::InstrumentSurface;

/// Extra precision given to amplitude ratios before a float multiplier is
/// applied.
const AMPLITUDE_SCALE: i64 = 1 << 16;

/// Cumulative integrators saturate at this magnitude.
pub const CUMULATIVE_LIMIT: f64 = 16.0;

/// Integrated value of a cumulative bind.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CumulativeState {
    /// Running integral of `speed`
    pub accumulated: f64,
    /// Latest input, in units per second
    pub speed: f64,
}

/// Per-oscillator control contributions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OscillatorControls {
    /// Period offsets in period-numerator units, summed
    pub period_fine: BTreeMap<FullId, f64>,
    /// Amplitude multipliers, multiplied
    pub amplitude_mul: BTreeMap<FullId, f64>,
}

impl OscillatorControls {
    fn is_empty(&self) -> bool {
        self.period_fine.is_empty() && self.amplitude_mul.is_empty()
    }
}

/// A note that has been handed to the instrument.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PressedKey {
    /// Bind that pressed it
    pub id: FullId,
    /// Semitone offset
    pub semitone: i32,
    /// Velocity in `[0, 1]`
    pub velocity: f64,
    seq: u64,
    sent_volume: i64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct PendingPress {
    id: FullId,
    semitone: i32,
    velocity: f64,
    seq: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PendingRelease {
    id: FullId,
    seq: u64,
}

/// All control values and queues for one instrument.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlState {
    pub(crate) threshold_state: BTreeMap<FullId, i32>,
    pub(crate) toggle_state: BTreeMap<FullId, u8>,
    pub(crate) stacking: BTreeMap<FullId, u32>,
    pub(crate) stack_held: BTreeMap<FullId, bool>,
    pub(crate) cumulative_state: BTreeMap<FullId, CumulativeState>,
    freq_expt: BTreeMap<FullId, f64>,
    volume_mul: BTreeMap<FullId, f64>,
    osc: Vec<OscillatorControls>,
    env: [BTreeMap<FullId, f64>; 4],
    press_queue: VecDeque<PendingPress>,
    release_queue: VecDeque<PendingRelease>,
    loop_queue: VecDeque<LoopCommand>,
    pressed_keys: BTreeMap<VoiceId, PressedKey>,
    base_freq: f64,
    next_seq: u64,
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlState {
    /// Empty state tuned to A4 = 440 Hz.
    pub fn new() -> Self {
        Self {
            threshold_state: BTreeMap::new(),
            toggle_state: BTreeMap::new(),
            stacking: BTreeMap::new(),
            stack_held: BTreeMap::new(),
            cumulative_state: BTreeMap::new(),
            freq_expt: BTreeMap::new(),
            volume_mul: BTreeMap::new(),
            osc: Vec::new(),
            env: Default::default(),
            press_queue: VecDeque::new(),
            release_queue: VecDeque::new(),
            loop_queue: VecDeque::new(),
            pressed_keys: BTreeMap::new(),
            base_freq: DEFAULT_BASE_FREQ,
            next_seq: 0,
        }
    }

    /// Forget every value and pending event. Notes already handed to the
    /// instrument are not released.
    pub fn reset(&mut self) {
        let base_freq = self.base_freq;
        *self = Self::new();
        self.base_freq = base_freq;
    }

    /// Tuning reference before frequency exponents.
    pub fn base_freq(&self) -> f64 {
        self.base_freq
    }

    /// Set the tuning reference before frequency exponents.
    pub fn set_base_freq(&mut self, base_freq: f64) {
        if base_freq.is_finite() && base_freq > 0.0 {
            self.base_freq = base_freq;
        }
    }

    // ------------------------------------------------------------------
    // Modifier state
    // ------------------------------------------------------------------

    /// Last level of a threshold axis.
    pub fn threshold_state(&self, id: FullId) -> Option<i32> {
        self.threshold_state.get(&id).copied()
    }

    /// Toggle machine state, `0..=3`.
    pub fn toggle_state(&self, id: FullId) -> u8 {
        self.toggle_state.get(&id).copied().unwrap_or(0)
    }

    /// Press count of a stacking bind.
    pub fn stack_count(&self, id: FullId) -> u32 {
        self.stacking.get(&id).copied().unwrap_or(0)
    }

    /// Integrator of a cumulative bind.
    pub fn cumulative(&self, id: FullId) -> Option<CumulativeState> {
        self.cumulative_state.get(&id).copied()
    }

    /// Advance every cumulative integrator of `controller_id` by `dt`
    /// seconds and re-dispatch the affected binds. Returns true when any
    /// integrator moved.
    pub fn update(&mut self, controller_id: u32, bindings: &Bindings, dt: f64) -> bool {
        let range = FullId::new(controller_id, 0)..=FullId::new(controller_id, u32::MAX);
        let mut changed = false;
        for state in self.cumulative_state.range_mut(range).map(|(_, s)| s) {
            if state.speed != 0.0 {
                state.accumulated = (state.accumulated + state.speed * dt)
                    .clamp(-CUMULATIVE_LIMIT, CUMULATIVE_LIMIT);
                changed = true;
            }
        }
        if changed {
            bindings.cumulative_update(controller_id, self);
        }
        changed
    }

    // ------------------------------------------------------------------
    // Parameter contributions
    // ------------------------------------------------------------------

    /// Set a transposition in semitones.
    pub fn set_freq_expt(&mut self, id: FullId, semitones: f64) {
        self.freq_expt.insert(id, semitones);
    }

    /// Set an instrument volume multiplier.
    pub fn set_volume_mul(&mut self, id: FullId, mul: f64) {
        self.volume_mul.insert(id, mul);
    }

    /// Set a period offset on oscillator `index`.
    pub fn set_period_fine(&mut self, index: usize, id: FullId, fine: f64) {
        self.oscillator_entry(index).period_fine.insert(id, fine);
    }

    /// Set an amplitude multiplier on oscillator `index`.
    pub fn set_amplitude_mul(&mut self, index: usize, id: FullId, mul: f64) {
        self.oscillator_entry(index).amplitude_mul.insert(id, mul);
    }

    /// Set a multiplier on one envelope stage.
    pub fn set_envelope_mul(&mut self, stage: EnvelopeStage, id: FullId, mul: f64) {
        self.env[stage.index()].insert(id, mul);
    }

    fn oscillator_entry(&mut self, index: usize) -> &mut OscillatorControls {
        if self.osc.len() <= index {
            self.osc.resize_with(index + 1, OscillatorControls::default);
        }
        &mut self.osc[index]
    }

    /// Total transposition in semitones.
    pub fn freq_expt_sum(&self) -> f64 {
        self.freq_expt.values().sum()
    }

    /// Product of all volume multipliers.
    pub fn volume_mul_product(&self) -> f64 {
        self.volume_mul.values().product()
    }

    /// Product of the multipliers on one envelope stage.
    pub fn envelope_mul_product(&self, stage: EnvelopeStage) -> f64 {
        self.env[stage.index()].values().product()
    }

    /// Contributions for oscillator `index`, if any were ever set.
    pub fn oscillator(&self, index: usize) -> Option<&OscillatorControls> {
        self.osc.get(index)
    }

    // ------------------------------------------------------------------
    // Keys and looper
    // ------------------------------------------------------------------

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// True if the latest event for `id` was a press.
    pub fn is_key_active(&self, id: FullId) -> bool {
        let last_release = self
            .release_queue
            .iter()
            .filter(|r| r.id == id)
            .map(|r| r.seq)
            .max();
        match last_release {
            Some(seq) => self.press_queue.iter().any(|p| p.id == id && p.seq > seq),
            None => {
                self.press_queue.iter().any(|p| p.id == id)
                    || self.pressed_keys.values().any(|k| k.id == id)
            }
        }
    }

    /// Queue a note, or update its velocity if the key is already down.
    pub fn press_key(&mut self, id: FullId, semitone: i32, velocity: f64) {
        let velocity = velocity.clamp(0.0, 1.0);
        if self.is_key_active(id) {
            for press in self.press_queue.iter_mut().filter(|p| p.id == id) {
                press.velocity = velocity;
            }
            for key in self.pressed_keys.values_mut().filter(|k| k.id == id) {
                key.velocity = velocity;
            }
            return;
        }
        let seq = self.take_seq();
        self.press_queue.push_back(PendingPress {
            id,
            semitone,
            velocity,
            seq,
        });
    }

    /// Queue a release for every note `id` pressed so far.
    pub fn release_key(&mut self, id: FullId) {
        if !self.is_key_active(id) {
            return;
        }
        let seq = self.take_seq();
        self.release_queue.push_back(PendingRelease { id, seq });
    }

    /// Queue a looper command.
    pub fn queue_loop(&mut self, command: LoopCommand) {
        self.loop_queue.push_back(command);
    }

    /// Notes handed to the instrument and not yet released.
    pub fn pressed_keys(&self) -> &BTreeMap<VoiceId, PressedKey> {
        &self.pressed_keys
    }

    /// Number of sounding notes.
    pub fn pressed_count(&self) -> usize {
        self.pressed_keys.len()
    }

    /// Events waiting for the next [`apply`](Self::apply).
    pub fn pending_count(&self) -> usize {
        self.press_queue.len() + self.release_queue.len() + self.loop_queue.len()
    }

    // ------------------------------------------------------------------
    // Apply
    // ------------------------------------------------------------------

    /// Push the current control values to `surface` and drain the queues.
    ///
    /// The patch graph is copied, adjusted per oscillator and installed; the
    /// envelope is scaled per stage; tuning and volume are set. Then pending
    /// presses start voices, sounding keys get their current velocity and
    /// pending releases stop the keys pressed before them.
    ///
    /// # Errors
    ///
    /// [`ControlError::OscillatorOutOfRange`] if a contribution addresses an
    /// oscillator the patch does not have. Nothing is applied in that case.
    pub fn apply<S: InstrumentSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        master_volume: f64,
        patch: &Patch,
    ) -> Result<()> {
        let count = patch.graph.len();
        if let Some(index) = self
            .osc
            .iter()
            .enumerate()
            .skip(count)
            .find(|(_, c)| !c.is_empty())
            .map(|(i, _)| i)
        {
            return Err(ControlError::OscillatorOutOfRange { index, count });
        }

        let mut graph = patch.graph.clone();
        for (index, controls) in self.osc.iter().enumerate() {
            let Some(osc) = graph.oscillator_mut(index) else {
                continue;
            };
            let mul: f64 = controls.amplitude_mul.values().product();
            if mul != 1.0 {
                let (num, denom) = osc.amplitude();
                let scaled = (num as f64 * mul * AMPLITUDE_SCALE as f64).round();
                let scaled = scaled.clamp(i64::MIN as f64, i64::MAX as f64) as i64;
                osc.set_amplitude(scaled, denom.saturating_mul(AMPLITUDE_SCALE));
            }
            let fine: f64 = controls.period_fine.values().sum();
            if fine != 0.0 {
                let offset = (fine * PERIOD_MUL as f64).round() as i64;
                osc.set_period_fine(osc.period_fine().saturating_add(offset));
            }
        }
        graph.finish_changes();
        surface.set_synth(graph);

        surface.set_tuning(self.base_freq * 2f64.powf(self.freq_expt_sum() / 12.0));
        surface.set_envelope(patch.envelope.scaled(
            self.envelope_mul_product(EnvelopeStage::Attack),
            self.envelope_mul_product(EnvelopeStage::Decay),
            self.envelope_mul_product(EnvelopeStage::Sustain),
            self.envelope_mul_product(EnvelopeStage::Release),
        ));
        let volume = master_volume.max(0.0) * self.volume_mul_product() * VOLUME_DENOM as f64;
        surface.set_volume(volume.round().clamp(0.0, MAX_VOLUME as f64) as i64);

        while let Some(press) = self.press_queue.pop_front() {
            let sent_volume = velocity_num(press.velocity);
            let vid = surface.press_voice(press.semitone, sent_volume);
            self.pressed_keys.insert(
                vid,
                PressedKey {
                    id: press.id,
                    semitone: press.semitone,
                    velocity: press.velocity,
                    seq: press.seq,
                    sent_volume,
                },
            );
        }

        for (&vid, key) in &mut self.pressed_keys {
            let volume = velocity_num(key.velocity);
            if volume != key.sent_volume {
                surface.set_voice_volume(vid, volume);
                key.sent_volume = volume;
            }
        }

        while let Some(release) = self.release_queue.pop_front() {
            let released: Vec<VoiceId> = self
                .pressed_keys
                .iter()
                .filter(|(_, k)| k.id == release.id && k.seq < release.seq)
                .map(|(&vid, _)| vid)
                .collect();
            for vid in released {
                surface.release_voice(vid);
                self.pressed_keys.remove(&vid);
            }
        }

        while let Some(command) = self.loop_queue.pop_front() {
            surface.loop_command(command);
        }
        Ok(())
    }
}

fn velocity_num(velocity: f64) -> i64 {
    (velocity.clamp(0.0, 1.0) * VOLUME_DENOM as f64).round() as i64
}

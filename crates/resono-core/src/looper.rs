//! Beat-synchronized loop recorder and player.
//!
//! A [`Looper`] owns a fixed number of slots backed by one contiguous sample
//! buffer, partitioned statically so the audio path never allocates. Slots
//! record the instrument output, quantize their length to whole beats when
//! finished, and are then mixed back into every subsequent buffer.
//!
//! ## Slot lifecycle
//!
//! ```text
//! Unused --record--> Recording --finish--> Playing <--mute--> Muted
//!    ^                                        |                 |
//!    +-----------------clear------------------+-----------------+
//! ```
//!
//! Finishing keeps capturing input for `record_stop_timer` more samples so a
//! note's release tail bleeds into the next loop cycle instead of cutting off.

use alloc::vec;
use alloc::vec::Vec;

use crate::tempo::BeatClock;
use crate::voice::{VOLUME_DENOM, max_volume_skip};

/// Default number of loop slots.
pub const DEFAULT_LOOP_COUNT: usize = 8;

/// Default per-slot capacity in seconds.
pub const DEFAULT_MAX_LOOP_SECONDS: f64 = 30.0;

/// State of one loop slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LoopState {
    /// Empty
    #[default]
    Unused,
    /// Recorded but silent
    Muted,
    /// Mixed into the output
    Playing,
    /// Capturing the instrument output
    Recording,
}

impl LoopState {
    /// Upper-case display name.
    pub fn name(self) -> &'static str {
        match self {
            LoopState::Unused => "UNUSED",
            LoopState::Muted => "MUTED",
            LoopState::Playing => "PLAYING",
            LoopState::Recording => "RECORDING",
        }
    }
}

/// Operation carried by a [`LoopCommand`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoopOp {
    /// Start recording, or finish if already recording
    Record,
    /// Toggle between playing and muted
    Mute,
    /// Empty the slot
    Clear,
    /// Set the slot volume from the command value
    Volume,
    /// Make the slot the selected one
    Select,
    /// Set the loop length to the command value, in beats
    Length,
    /// Set the user delay to the command value, in beats
    Delay,
}

impl LoopOp {
    /// All operations, in file-format order.
    pub const ALL: [LoopOp; 7] = [
        LoopOp::Record,
        LoopOp::Mute,
        LoopOp::Clear,
        LoopOp::Volume,
        LoopOp::Select,
        LoopOp::Length,
        LoopOp::Delay,
    ];

    /// Upper-case name used by binding files.
    pub fn name(self) -> &'static str {
        match self {
            LoopOp::Record => "RECORD",
            LoopOp::Mute => "MUTE",
            LoopOp::Clear => "CLEAR",
            LoopOp::Volume => "VOLUME",
            LoopOp::Select => "SELECT",
            LoopOp::Length => "LENGTH",
            LoopOp::Delay => "DELAY",
        }
    }

    /// Parse an operation name, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name().eq_ignore_ascii_case(name))
    }

    /// True for operations that fire once per press rather than tracking a
    /// continuous value.
    pub fn is_trigger(self) -> bool {
        !matches!(self, LoopOp::Volume)
    }
}

/// Which slot a [`LoopCommand`] addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoopTarget {
    /// A fixed slot
    Slot(usize),
    /// The currently selected slot
    Selected,
    /// Every slot in turn
    All,
}

impl LoopTarget {
    /// Decode the file-format index: `-1` selected, `-2` all, otherwise a
    /// slot. Other negative values address the selected slot.
    pub fn from_index(index: i32) -> Self {
        match index {
            -2 => LoopTarget::All,
            i if i < 0 => LoopTarget::Selected,
            i => LoopTarget::Slot(i as usize),
        }
    }

    /// Encode as a file-format index.
    pub fn index(self) -> i32 {
        match self {
            LoopTarget::Slot(i) => i as i32,
            LoopTarget::Selected => -1,
            LoopTarget::All => -2,
        }
    }
}

/// A looper operation queued by the control layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoopCommand {
    /// Addressed slot(s)
    pub target: LoopTarget,
    /// Operation
    pub op: LoopOp,
    /// Control value; the volume for [`LoopOp::Volume`], beats for
    /// [`LoopOp::Length`] and [`LoopOp::Delay`]
    pub value: f64,
}

/// Bookkeeping for one loop slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopSlot {
    state: LoopState,
    target_volume_num: i64,
    volume_num: i64,
    start_t: i64,
    relative_start_t: i64,
    length: u64,
    record_stop_timer: u64,
    sample_count: usize,
}

impl Default for LoopSlot {
    fn default() -> Self {
        Self {
            state: LoopState::Unused,
            target_volume_num: VOLUME_DENOM,
            volume_num: 0,
            start_t: 0,
            relative_start_t: 0,
            length: 0,
            record_stop_timer: 0,
            sample_count: 0,
        }
    }
}

impl LoopSlot {
    /// Slot state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Requested volume out of [`VOLUME_DENOM`].
    pub fn target_volume(&self) -> i64 {
        self.target_volume_num
    }

    /// Current slew-limited volume out of [`VOLUME_DENOM`].
    pub fn volume(&self) -> i64 {
        self.volume_num
    }

    /// Global sample index of the cycle origin.
    pub fn start_t(&self) -> i64 {
        self.start_t
    }

    /// Cycle origin before the user delay.
    pub fn relative_start_t(&self) -> i64 {
        self.relative_start_t
    }

    /// User delay in samples.
    pub fn delay(&self) -> i64 {
        self.start_t - self.relative_start_t
    }

    /// Loop length in samples.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Samples of release tail still to capture.
    pub fn record_stop_timer(&self) -> u64 {
        self.record_stop_timer
    }

    /// Samples captured, including any tail past `length`.
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    fn is_audible(&self) -> bool {
        matches!(self.state, LoopState::Playing | LoopState::Muted) && self.length > 0
    }
}

/// Fixed-capacity multi-slot looper.
#[derive(Clone, Debug)]
pub struct Looper {
    slots: Vec<LoopSlot>,
    samples: Vec<i32>,
    capacity: usize,
    clock: BeatClock,
    selected: usize,
    max_volume_skip: i64,
}

impl Looper {
    /// Allocate `slot_count` slots of `max_loop_seconds` each.
    pub fn new(slot_count: usize, max_loop_seconds: f64, sample_rate: u32, bpm: f64) -> Self {
        let slot_count = slot_count.max(1);
        let capacity = libm::round(max_loop_seconds.max(0.0) * f64::from(sample_rate)) as usize;
        let capacity = capacity.max(1);
        Self {
            slots: vec![LoopSlot::default(); slot_count],
            samples: vec![0; slot_count * capacity],
            capacity,
            clock: BeatClock::new(sample_rate, bpm),
            selected: 0,
            max_volume_skip: max_volume_skip(sample_rate),
        }
    }

    /// Per-slot capacity in samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// All slots.
    pub fn slots(&self) -> &[LoopSlot] {
        &self.slots
    }

    /// Slot `index`.
    pub fn slot(&self, index: usize) -> Option<&LoopSlot> {
        self.slots.get(index)
    }

    /// Captured samples of slot `index`.
    pub fn slot_samples(&self, index: usize) -> &[i32] {
        match self.slots.get(index) {
            Some(slot) => {
                let base = index * self.capacity;
                &self.samples[base..base + slot.sample_count]
            }
            None => &[],
        }
    }

    /// The beat clock.
    pub fn clock(&self) -> &BeatClock {
        &self.clock
    }

    /// Change the tempo. Existing loop lengths are kept.
    pub fn set_bpm(&mut self, bpm: f64) {
        self.clock.set_bpm(bpm);
    }

    /// Index of the selected slot.
    pub fn selected(&self) -> usize {
        self.selected
    }

    /// Select slot `index`, clamped to the slot range.
    pub fn select(&mut self, index: usize) {
        self.selected = index.min(self.slots.len() - 1);
    }

    /// Advance the selection, wrapping around. Returns the new selection.
    pub fn select_next(&mut self) -> usize {
        self.selected = (self.selected + 1) % self.slots.len();
        self.selected
    }

    /// Start recording slot `index` at the current clock position.
    pub fn record(&mut self, index: usize) {
        let loop_t = self.clock.loop_t() as i64;
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        let target_volume_num = slot.target_volume_num;
        *slot = LoopSlot {
            state: LoopState::Recording,
            start_t: loop_t,
            relative_start_t: loop_t,
            volume_num: target_volume_num,
            target_volume_num,
            ..LoopSlot::default()
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(slot = index, loop_t, "loop recording started");
    }

    /// Finish recording slot `index`, keeping `tail` more samples of input.
    ///
    /// Returns false if the slot was not recording.
    pub fn finish(&mut self, index: usize, tail: u64) -> bool {
        let beat_length = self.clock.beat_length();
        let capacity = self.capacity;
        let Some(slot) = self.slots.get_mut(index) else {
            return false;
        };
        if slot.state != LoopState::Recording {
            return false;
        }
        Self::finish_slot(slot, beat_length, capacity, tail);

        #[cfg(feature = "tracing")]
        tracing::debug!(slot = index, length = slot.length, "loop recording finished");
        true
    }

    fn quantize(sample_count: usize, beat_length: u64, capacity: usize) -> u64 {
        let beats = ((sample_count as u64 + 3 * beat_length / 4) / beat_length).max(1);
        let fit = capacity as u64 / beat_length;
        if fit == 0 {
            capacity as u64
        } else {
            beats.min(fit) * beat_length
        }
    }

    fn finish_slot(slot: &mut LoopSlot, beat_length: u64, capacity: usize, tail: u64) {
        slot.length = Self::quantize(slot.sample_count, beat_length, capacity);
        slot.state = LoopState::Playing;
        slot.record_stop_timer = tail.min((capacity - slot.sample_count) as u64);
    }

    /// Unmute slot `index`.
    pub fn play(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            if slot.state == LoopState::Muted {
                slot.state = LoopState::Playing;
            }
        }
    }

    /// Mute slot `index`.
    pub fn mute(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            if slot.state == LoopState::Playing {
                slot.state = LoopState::Muted;
            }
        }
    }

    /// Toggle slot `index` between playing and muted.
    pub fn toggle_mute(&mut self, index: usize) {
        match self.slots.get(index).map(LoopSlot::state) {
            Some(LoopState::Playing) => self.mute(index),
            Some(LoopState::Muted) => self.play(index),
            _ => {}
        }
    }

    /// Empty slot `index`.
    pub fn clear(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = LoopSlot::default();

            #[cfg(feature = "tracing")]
            tracing::debug!(slot = index, "loop cleared");
        }
    }

    /// Set the volume of slot `index` out of [`VOLUME_DENOM`].
    pub fn set_volume(&mut self, index: usize, volume_num: i64) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.target_volume_num = volume_num.clamp(0, VOLUME_DENOM);
        }
    }

    /// Loop length of slot `index` in beats.
    pub fn length_beats(&self, index: usize) -> f64 {
        self.slots
            .get(index)
            .map_or(0.0, |s| self.clock.samples_to_beats(s.length as i64))
    }

    /// Change the length of a recorded slot, keeping the current phase and
    /// the user delay.
    pub fn set_length_beats(&mut self, index: usize, beats: f64) {
        let loop_t = self.clock.loop_t() as i64;
        let new_length = self.clock.beats_to_samples(beats).clamp(1, self.capacity as i64);
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        if !matches!(slot.state, LoopState::Playing | LoopState::Muted) {
            return;
        }
        let delay = slot.delay();
        let phase = (loop_t - slot.start_t).rem_euclid(new_length);
        slot.length = new_length as u64;
        slot.start_t = loop_t - phase;
        slot.relative_start_t = slot.start_t - delay;
    }

    /// User delay of slot `index` in beats.
    pub fn delay_beats(&self, index: usize) -> f64 {
        self.slots
            .get(index)
            .map_or(0.0, |s| self.clock.samples_to_beats(s.delay()))
    }

    /// Shift the cycle origin of slot `index` by `delay_beats` from where it
    /// was recorded.
    pub fn set_delay_beats(&mut self, index: usize, delay_beats: f64) {
        let delay = self.clock.beats_to_samples(delay_beats);
        if let Some(slot) = self.slots.get_mut(index) {
            slot.start_t = slot.relative_start_t + delay;
        }
    }

    /// Record from and mix into `buf`, then advance the clock.
    ///
    /// Recording captures `buf` as it arrives, before any loops are mixed in,
    /// so loops never re-record each other.
    pub fn apply(&mut self, buf: &mut [i32]) {
        let capacity = self.capacity;
        let beat_length = self.clock.beat_length();

        for (index, slot) in self.slots.iter_mut().enumerate() {
            let region = &mut self.samples[index * capacity..(index + 1) * capacity];
            match slot.state {
                LoopState::Recording => {
                    let n = buf.len().min(capacity - slot.sample_count);
                    region[slot.sample_count..slot.sample_count + n].copy_from_slice(&buf[..n]);
                    slot.sample_count += n;
                    slot.length = slot.sample_count as u64;
                    if slot.sample_count >= capacity {
                        Self::finish_slot(slot, beat_length, capacity, 0);
                    }
                }
                LoopState::Playing | LoopState::Muted if slot.record_stop_timer > 0 => {
                    let n = (buf.len() as u64).min(slot.record_stop_timer) as usize;
                    let n = n.min(capacity - slot.sample_count);
                    region[slot.sample_count..slot.sample_count + n].copy_from_slice(&buf[..n]);
                    slot.sample_count += n;
                    slot.record_stop_timer -= n as u64;
                    if slot.sample_count >= capacity {
                        slot.record_stop_timer = 0;
                    }
                }
                _ => {}
            }
        }

        let loop_t = self.clock.loop_t() as i64;
        let skip = self.max_volume_skip;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if !slot.is_audible() {
                continue;
            }
            let target = if slot.state == LoopState::Playing {
                slot.target_volume_num
            } else {
                0
            };
            if target == 0 && slot.volume_num == 0 {
                continue;
            }
            let region = &self.samples[index * capacity..index * capacity + slot.sample_count];
            let length = slot.length as i64;
            for (j, out) in buf.iter_mut().enumerate() {
                slot.volume_num += (target - slot.volume_num).clamp(-skip, skip);
                if slot.volume_num == 0 {
                    continue;
                }
                let mut t = (loop_t + j as i64 - slot.start_t).rem_euclid(length) as usize;
                let mut acc: i64 = 0;
                while t < region.len() {
                    acc += i64::from(region[t]);
                    t += length as usize;
                }
                let mixed = i64::from(*out) + acc * slot.volume_num / VOLUME_DENOM;
                *out = mixed.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
            }
        }

        self.clock.advance(buf.len());
    }
}

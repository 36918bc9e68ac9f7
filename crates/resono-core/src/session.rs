//! Instrument and looper wired into one render path.

use crate::instrument::FmInstrument;
use crate::looper::{DEFAULT_LOOP_COUNT, DEFAULT_MAX_LOOP_SECONDS, LoopCommand, LoopOp, LoopState, LoopTarget, Looper};
use crate::patch::Patch;
use crate::tempo::DEFAULT_BPM;
use crate::voice::VOLUME_DENOM;

/// Looper sizing and tempo for a new [`Session`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionConfig {
    /// Number of loop slots
    pub loop_count: usize,
    /// Per-slot capacity in seconds
    pub max_loop_seconds: f64,
    /// Initial tempo
    pub bpm: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            loop_count: DEFAULT_LOOP_COUNT,
            max_loop_seconds: DEFAULT_MAX_LOOP_SECONDS,
            bpm: DEFAULT_BPM,
        }
    }
}

/// The complete audio-side state: what the audio callback renders.
///
/// [`render`](Self::render) synthesizes the instrument into the buffer and
/// then lets the looper record from and mix into it.
#[derive(Clone, Debug)]
pub struct Session {
    instrument: FmInstrument,
    looper: Looper,
}

impl Session {
    /// Combine an instrument and a looper.
    pub fn new(instrument: FmInstrument, looper: Looper) -> Self {
        Self { instrument, looper }
    }

    /// Build a session from a patch.
    pub fn from_patch(patch: &Patch, sample_rate: u32, config: SessionConfig) -> Self {
        Self {
            instrument: FmInstrument::from_patch(patch, sample_rate),
            looper: Looper::new(config.loop_count, config.max_loop_seconds, sample_rate, config.bpm),
        }
    }

    /// The instrument.
    pub fn instrument(&self) -> &FmInstrument {
        &self.instrument
    }

    /// The instrument, mutably.
    pub fn instrument_mut(&mut self) -> &mut FmInstrument {
        &mut self.instrument
    }

    /// The looper.
    pub fn looper(&self) -> &Looper {
        &self.looper
    }

    /// The looper, mutably.
    pub fn looper_mut(&mut self) -> &mut Looper {
        &mut self.looper
    }

    /// Render one buffer.
    pub fn render(&mut self, buf: &mut [i32]) {
        self.instrument.synthesize(buf);
        self.looper.apply(buf);
    }

    /// Execute a looper command.
    ///
    /// A record on the selected slot moves to the next slot first when the
    /// selected one already holds a loop. Finishing a recording releases all
    /// voices and keeps capturing for the envelope's release length.
    pub fn loop_command(&mut self, command: LoopCommand) {
        match command.target {
            LoopTarget::Slot(index) => {
                if index < self.looper.slot_count() {
                    self.loop_op(index, command.op, command.value);
                }
            }
            LoopTarget::Selected => {
                let mut index = self.looper.selected();
                if command.op == LoopOp::Record {
                    let state = self.looper.slot(index).map(|s| s.state());
                    if !matches!(state, Some(LoopState::Unused | LoopState::Recording)) {
                        index = self.looper.select_next();
                    }
                }
                if command.op == LoopOp::Select {
                    self.looper.select_next();
                } else {
                    self.loop_op(index, command.op, command.value);
                }
            }
            LoopTarget::All => {
                if command.op == LoopOp::Select {
                    return;
                }
                for index in 0..self.looper.slot_count() {
                    self.loop_op(index, command.op, command.value);
                }
            }
        }
    }

    fn loop_op(&mut self, index: usize, op: LoopOp, value: f64) {
        match op {
            LoopOp::Record => {
                let recording = self.looper.slot(index).map(|s| s.state()) == Some(LoopState::Recording);
                if recording {
                    let tail = u64::from(self.instrument.envelope().release_length());
                    if self.looper.finish(index, tail) {
                        self.instrument.release_all();
                    }
                } else {
                    self.looper.record(index);
                }
            }
            LoopOp::Mute => self.looper.toggle_mute(index),
            LoopOp::Clear => self.looper.clear(index),
            LoopOp::Volume => {
                let volume = libm::round(value.clamp(0.0, 1.0) * VOLUME_DENOM as f64) as i64;
                self.looper.set_volume(index, volume);
            }
            LoopOp::Select => self.looper.select(index),
            LoopOp::Length => {
                if value.is_finite() && value > 0.0 {
                    self.looper.set_length_beats(index, value);
                }
            }
            LoopOp::Delay => {
                if value.is_finite() {
                    self.looper.set_delay_beats(index, value);
                }
            }
        }
    }
}

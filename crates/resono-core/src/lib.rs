//! Resono Core - integer FM synthesis and beat-synced looping
//!
//! This crate holds everything that runs on the audio thread. All sample
//! arithmetic is integer: oscillators produce signed 32-bit samples, periods
//! and amplitudes are integer ratios, and volumes are fractions of
//! [`VOLUME_DENOM`]. Nothing here allocates once a [`Session`] is built,
//! except when a graph of a different shape is installed.
//!
//! # Core Components
//!
//! ## Oscillators and graphs
//!
//! - [`Oscillator`] / [`Waveform`] - A waveform node with amplitude and period ratios
//! - [`FmGraph`] - Acyclic oscillator graph evaluated in [`ModulationMode::Phase`]
//!   or [`ModulationMode::Frequency`] mode
//!
//! ```rust
//! use resono_core::{FmGraph, ModulationMode, Oscillator, Waveform};
//!
//! let mut graph = FmGraph::new(ModulationMode::Phase);
//! let carrier = graph.add_oscillator(Oscillator::new(Waveform::Sine));
//! let modulator = graph.add_oscillator(
//!     Oscillator::new(Waveform::Sine).with_amplitude(1, 4).with_period(1, 2),
//! );
//! graph.add_carrier(carrier);
//! graph.connect(carrier, modulator);
//! graph.finish_changes();
//! ```
//!
//! ## Voices
//!
//! - [`Envelope`] - Integer ADSR shape
//! - [`VoicePool`] / [`Voice`] - Press/release, voice stealing, slew-limited volume
//! - [`FmInstrument`] - Voice pool plus graph, rendering mono `i32` buffers
//!
//! ## Looping
//!
//! - [`BeatClock`] - Tempo and the global sample counter
//! - [`Looper`] - Beat-quantized record/overdub slots
//! - [`Session`] - Instrument and looper on one render path
//!
//! ```rust
//! use resono_core::{LoopCommand, LoopOp, LoopTarget, Patch, Session, SessionConfig};
//!
//! let mut session = Session::from_patch(&Patch::default(), 48000, SessionConfig::default());
//! session.loop_command(LoopCommand { target: LoopTarget::Slot(0), op: LoopOp::Record, value: 1.0 });
//! session.instrument_mut().press_voice(0, 1 << 16);
//!
//! let mut buf = vec![0i32; 512];
//! session.render(&mut buf);
//! ```
//!
//! # no_std Support
//!
//! Disable the default `std` feature to build for targets without an OS.
//! The `alloc` crate is still required.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod envelope;
pub mod fm;
pub mod fract;
pub mod instrument;
pub mod looper;
pub mod oscillator;
pub mod patch;
pub mod session;
pub mod tempo;
pub mod voice;

pub use envelope::{Envelope, samples_to_seconds, seconds_to_samples};
pub use fm::{FmGraph, ModulationMode, VoiceGraphState};
pub use fract::{lerp_i64, mul_fract, normalize_fract};
pub use instrument::FmInstrument;
pub use looper::{
    DEFAULT_LOOP_COUNT, DEFAULT_MAX_LOOP_SECONDS, LoopCommand, LoopOp, LoopSlot, LoopState,
    LoopTarget, Looper,
};
pub use oscillator::{Oscillator, OscillatorState, PERIOD_MUL, Waveform};
pub use patch::{DEFAULT_POLYPHONY, Patch};
pub use session::{Session, SessionConfig};
pub use tempo::{BeatClock, DEFAULT_BPM};
pub use voice::{
    DEFAULT_BASE_FREQ, MAX_VOLUME, VOLUME_DENOM, Voice, VoiceId, VoicePool, max_volume_skip,
    semitone_increment,
};

//! Resono Control - controller bindings for the FM instrument
//!
//! Turns device-agnostic [`ControllerEvent`]s into instrument changes. A
//! [`Bindings`] set routes each event through its [`Bind`]s, applying the
//! modifier state machines (toggle, stacking, cumulative, thresholds and
//! deadzones) and writing the result into a [`ControlState`]. Once per frame
//! [`ControlState::apply`] pushes the accumulated values and queued notes
//! to anything implementing [`InstrumentSurface`].
//!
//! ```rust
//! use resono_control::{
//!     Action, Bindings, Control, ControlState, ControllerEvent, Modifiers,
//! };
//! use resono_core::{Patch, Session, SessionConfig};
//!
//! let patch = Patch::default();
//! let mut session = Session::from_patch(&patch, 48000, SessionConfig::default());
//!
//! let mut bindings = Bindings::new("Keys");
//! bindings.push(
//!     Control::ButtonPress { index: 0, active_state: None },
//!     Modifiers::default(),
//!     Action::Key { semitone: 3 },
//! );
//!
//! let mut state = ControlState::new();
//! bindings.handle_event(0, &ControllerEvent::button(0, 0, 1.0), &mut state);
//! state.apply(&mut session, 1.0, &patch).unwrap();
//! assert_eq!(state.pressed_count(), 1);
//! ```
//!
//! Everything here runs on the UI thread; nothing allocates on or blocks
//! the audio path.

pub mod bind;
pub mod bindings;
pub mod error;
pub mod event;
pub mod modifiers;
pub mod state;
pub mod surface;

pub use bind::{Action, Bind, Control, EnvelopeStage, ModifierMode, Modifiers};
pub use bindings::Bindings;
pub use error::{ControlError, Result};
pub use event::{ControllerEvent, FullId};
pub use modifiers::{compute_deadzone, invert_value, normalize_unit, toggle_step};
pub use state::{CUMULATIVE_LIMIT, ControlState, CumulativeState, OscillatorControls, PressedKey};
pub use surface::InstrumentSurface;

//! File formats and preset management for resono.
//!
//! # Features
//!
//! - **Instruments**: FM graph and envelope presets, envelope lengths in seconds
//! - **Bindings**: controller binding sets
//! - **Options**: audio device and recording settings
//! - **Paths**: platform-specific preset, options and recording directories
//! - **Factory Presets**: built-in instruments and a keyboard binding set
//!
//! All files are JSON. Enumeration skips files that do not parse; explicit
//! loads return [`ConfigError`].
//!
//! # Example
//!
//! ```rust
//! use resono_config::{get_factory_bindings, get_factory_instrument};
//! use resono_control::ControlState;
//! use resono_core::{Session, SessionConfig};
//!
//! let patch = get_factory_instrument("Bell").unwrap().to_patch(48000).unwrap();
//! let bindings = get_factory_bindings("Keyboard").unwrap().to_bindings().unwrap();
//! bindings.validate(&patch).unwrap();
//!
//! let mut session = Session::from_patch(&patch, 48000, SessionConfig::default());
//! let mut state = ControlState::new();
//! state.apply(&mut session, 1.0, &patch).unwrap();
//! ```

mod bindings_file;
mod error;
mod file;
mod instrument;
mod library;
mod options;

/// Platform-specific paths for presets, options and recordings.
pub mod paths;

/// Factory presets bundled with the library.
pub mod factory_presets;

pub use bindings_file::{
    ActionEntry, BindEntry, BindingsFile, ControlEntry, ControlKind, DEFAULT_AXIS_THRESHOLD,
    DEFAULT_DEADZONE,
};
pub use error::{ConfigError, Result};
pub use factory_presets::{
    FACTORY_INSTRUMENT_NAMES, factory_bindings, factory_instrument_names, factory_instruments,
    get_factory_bindings, get_factory_instrument, is_factory_instrument,
};
pub use instrument::{EnvelopeEntry, InstrumentFile, OscillatorEntry, SynthEntry};
pub use library::{
    Listed, PresetSource, all_bindings, all_instruments, find_bindings, find_instrument,
    scan_bindings, scan_instruments,
};
pub use options::{Options, RecordingFormat};
pub use paths::{
    bindings_dir, ensure_bindings_dir, ensure_instruments_dir, ensure_recordings_dir,
    instruments_dir, options_path, preset_name_from_path, recordings_dir, user_config_dir,
};

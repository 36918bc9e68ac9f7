//! Shared CLI helpers used across multiple commands.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use resono_config::{
    BindingsFile, InstrumentFile, Options, bindings_dir, find_bindings, find_instrument,
    instruments_dir, options_path,
};
use resono_core::{DEFAULT_BPM, DEFAULT_LOOP_COUNT, DEFAULT_MAX_LOOP_SECONDS, SessionConfig};

/// Looper settings shared by `render` and `play`.
#[derive(Args, Debug, Clone)]
pub struct LooperArgs {
    /// Looper tempo in beats per minute
    #[arg(long, default_value_t = DEFAULT_BPM)]
    pub bpm: f64,

    /// Number of loop slots
    #[arg(long, default_value_t = DEFAULT_LOOP_COUNT)]
    pub loops: usize,

    /// Longest loop in seconds
    #[arg(long, default_value_t = DEFAULT_MAX_LOOP_SECONDS)]
    pub max_loop_seconds: f64,
}

impl LooperArgs {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            loop_count: self.loops.max(1),
            max_loop_seconds: self.max_loop_seconds,
            bpm: self.bpm,
        }
    }
}

/// Load an instrument by file path, display name or file stem.
///
/// User instruments shadow factory ones of the same name.
pub fn load_instrument(name: &str) -> anyhow::Result<InstrumentFile> {
    find_instrument(name, &instruments_dir()).with_context(|| {
        format!("cannot load instrument '{name}'; use 'resono presets list' to see what is available")
    })
}

/// Load a bindings set by file path, display name or file stem.
pub fn load_bindings(name: &str) -> anyhow::Result<BindingsFile> {
    find_bindings(name, &bindings_dir()).with_context(|| {
        format!("cannot load bindings '{name}'; use 'resono presets list' to see what is available")
    })
}

/// Options from `path`, or from the user options file when `None`.
///
/// A missing or malformed file yields the defaults.
pub fn load_options(path: Option<&PathBuf>) -> Options {
    match path {
        Some(path) => Options::load_or_default(path),
        None => Options::load_or_default(options_path()),
    }
}

//! Platform-specific paths for presets, options and recordings.
//!
//! # Directory Structure
//!
//! - **Instruments**: `<config>/resono/instruments/`
//! - **Bindings**: `<config>/resono/bindings/`
//! - **Options**: `<config>/resono/options.json`
//! - **Recordings**: `<audio or home>/resono/`
//!
//! where `<config>` is `~/.config` on Linux, `~/Library/Application Support`
//! on macOS and `%APPDATA%` on Windows.
//!
//! # Example
//!
//! ```rust,no_run
//! use resono_config::paths;
//!
//! for path in paths::list_json_in_dir(&paths::instruments_dir()) {
//!     println!("{:?}", paths::preset_name_from_path(&path));
//! }
//! ```

use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

/// Application name used for directory paths.
const APP_NAME: &str = "resono";

const INSTRUMENTS_SUBDIR: &str = "instruments";
const BINDINGS_SUBDIR: &str = "bindings";
const OPTIONS_FILE: &str = "options.json";

/// Returns the user configuration directory.
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Directory holding user instrument files.
pub fn instruments_dir() -> PathBuf {
    user_config_dir().join(INSTRUMENTS_SUBDIR)
}

/// Directory holding user binding files.
pub fn bindings_dir() -> PathBuf {
    user_config_dir().join(BINDINGS_SUBDIR)
}

/// Path of the options file.
pub fn options_path() -> PathBuf {
    user_config_dir().join(OPTIONS_FILE)
}

/// Directory recordings are written to.
///
/// Prefers the platform audio directory, then the home directory.
pub fn recordings_dir() -> PathBuf {
    dirs::audio_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

fn ensure_dir(dir: PathBuf) -> Result<PathBuf> {
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| ConfigError::create_dir(&dir, e))?;
    }
    Ok(dir)
}

/// Ensure the instruments directory exists.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_instruments_dir() -> Result<PathBuf> {
    ensure_dir(instruments_dir())
}

/// Ensure the bindings directory exists.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_bindings_dir() -> Result<PathBuf> {
    ensure_dir(bindings_dir())
}

/// Ensure the recordings directory exists.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_recordings_dir() -> Result<PathBuf> {
    ensure_dir(recordings_dir())
}

/// List the `.json` files in `dir`, sorted by path.
///
/// Returns an empty vector if the directory doesn't exist or can't be read.
pub fn list_json_in_dir(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    files
}

/// Get the preset name from a file path (the file stem).
///
/// ```rust
/// use resono_config::paths::preset_name_from_path;
/// use std::path::Path;
///
/// let name = preset_name_from_path(Path::new("/path/to/bell.json"));
/// assert_eq!(name, Some("bell".to_string()));
/// ```
pub fn preset_name_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
}

/// File name for a preset called `name`: lower case, spaces replaced by
/// underscores, characters outside `[a-z0-9_-]` dropped.
pub fn file_name_for(name: &str) -> String {
    let stem: String = name
        .trim()
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            c if c.is_ascii_alphanumeric() || c == '_' || c == '-' => Some(c),
            _ => None,
        })
        .collect();
    if stem.is_empty() {
        "preset.json".to_string()
    } else {
        format!("{stem}.json")
    }
}

//! Preset enumeration across factory and user directories.

use std::path::{Path, PathBuf};

use crate::bindings_file::BindingsFile;
use crate::error::{ConfigError, Result};
use crate::factory_presets::{factory_bindings, factory_instruments};
use crate::instrument::InstrumentFile;
use crate::paths::list_json_in_dir;

/// Where a listed preset came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresetSource {
    /// Bundled with the library.
    Factory,
    /// Loaded from this file.
    User(PathBuf),
}

/// A preset together with its origin.
#[derive(Debug, Clone)]
pub struct Listed<T> {
    /// Parsed preset.
    pub preset: T,
    /// Origin.
    pub source: PresetSource,
}

fn scan<T>(dir: &Path, load: impl Fn(&Path) -> Result<T>) -> Vec<Listed<T>> {
    list_json_in_dir(dir)
        .into_iter()
        .filter_map(|path| match load(&path) {
            Ok(preset) => Some(Listed {
                preset,
                source: PresetSource::User(path),
            }),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping preset file");
                None
            }
        })
        .collect()
}

/// Load every valid instrument file in `dir`. Files that fail to parse are
/// skipped.
pub fn scan_instruments(dir: &Path) -> Vec<Listed<InstrumentFile>> {
    scan(dir, |path| InstrumentFile::load(path))
}

/// Load every valid binding file in `dir`. Files that fail to parse or
/// name an unknown action are skipped.
pub fn scan_bindings(dir: &Path) -> Vec<Listed<BindingsFile>> {
    scan(dir, |path| {
        let file = BindingsFile::load(path)?;
        file.to_bindings()?;
        Ok(file)
    })
}

/// Factory instruments followed by those in `dir`.
pub fn all_instruments(dir: &Path) -> Vec<Listed<InstrumentFile>> {
    let mut list: Vec<_> = factory_instruments()
        .into_iter()
        .map(|preset| Listed {
            preset,
            source: PresetSource::Factory,
        })
        .collect();
    list.extend(scan_instruments(dir));
    list
}

/// Factory binding sets followed by those in `dir`.
pub fn all_bindings(dir: &Path) -> Vec<Listed<BindingsFile>> {
    let mut list: Vec<_> = factory_bindings()
        .into_iter()
        .map(|preset| Listed {
            preset,
            source: PresetSource::Factory,
        })
        .collect();
    list.extend(scan_bindings(dir));
    list
}

/// Resolve an instrument by file path, user preset name or factory name.
///
/// A user file shadows a factory preset of the same name.
pub fn find_instrument(name: &str, dir: &Path) -> Result<InstrumentFile> {
    let path = Path::new(name);
    if path.is_file() {
        return InstrumentFile::load(path);
    }
    find_listed(all_instruments(dir), name, |f| f.name.as_str())
}

/// Resolve a binding set by file path, user preset name or factory name.
pub fn find_bindings(name: &str, dir: &Path) -> Result<BindingsFile> {
    let path = Path::new(name);
    if path.is_file() {
        return BindingsFile::load(path);
    }
    find_listed(all_bindings(dir), name, |f| f.name.as_str())
}

fn find_listed<T>(
    list: Vec<Listed<T>>,
    name: &str,
    display: impl Fn(&T) -> &str,
) -> Result<T> {
    let matches = |listed: &Listed<T>| {
        display(&listed.preset).eq_ignore_ascii_case(name)
            || match &listed.source {
                PresetSource::User(path) => path
                    .file_stem()
                    .is_some_and(|stem| stem.eq_ignore_ascii_case(name)),
                PresetSource::Factory => false,
            }
    };
    list.into_iter()
        .rev()
        .find(matches)
        .map(|listed| listed.preset)
        .ok_or_else(|| ConfigError::PresetNotFound(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_skips_invalid_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("good.json"), r#"{ "name": "Good" }"#).unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();
        fs::write(
            dir.path().join("bad_wave.json"),
            r#"{ "name": "Bad", "synth": { "oscillators": [ { "type": 3 } ] } }"#,
        )
        .unwrap();

        let list = scan_instruments(dir.path());
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].preset.name, "Good");
        assert_eq!(
            list[0].source,
            PresetSource::User(dir.path().join("good.json"))
        );
    }

    #[test]
    fn test_scan_bindings_skips_unknown_ops() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("pad.json"),
            r#"{ "name": "Pad", "binds": [ { "control": { "type": "BUTTON_PRESS" },
                "action": { "type": "LOOP_CONTROL", "index": 0, "op": "SPIN" } } ] }"#,
        )
        .unwrap();
        assert!(scan_bindings(dir.path()).is_empty());
    }

    #[test]
    fn test_factory_listed_first() {
        let dir = TempDir::new().unwrap();
        let list = all_instruments(dir.path());
        assert!(!list.is_empty());
        assert!(list.iter().all(|l| l.source == PresetSource::Factory));
    }

    #[test]
    fn test_user_file_shadows_factory() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("my_bell.json"),
            r#"{ "name": "Bell", "polyphony": 2 }"#,
        )
        .unwrap();
        let found = find_instrument("bell", dir.path()).unwrap();
        assert_eq!(found.polyphony, 2);

        let by_stem = find_instrument("MY_BELL", dir.path()).unwrap();
        assert_eq!(by_stem.name, "Bell");

        let factory = find_instrument("FM Piano", dir.path()).unwrap();
        assert_eq!(factory.name, "FM Piano");
    }

    #[test]
    fn test_not_found() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            find_bindings("nope", dir.path()),
            Err(ConfigError::PresetNotFound(name)) if name == "nope"
        ));
        assert!(find_bindings("keyboard", dir.path()).is_ok());
    }
}

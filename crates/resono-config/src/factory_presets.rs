//! Factory presets bundled with resono.
//!
//! Built-in instruments and a keyboard binding set that are always
//! available without external files. They are embedded as JSON and parsed
//! on demand, so they exercise the same loader as user files.

use crate::bindings_file::BindingsFile;
use crate::instrument::InstrumentFile;

/// Internal names of the factory instruments.
pub static FACTORY_INSTRUMENT_NAMES: &[&str] = &["sine", "fm_piano", "bell", "bass"];

static FACTORY_INSTRUMENTS_JSON: &[(&str, &str)] = &[
    ("sine", SINE_INSTRUMENT),
    ("fm_piano", FM_PIANO_INSTRUMENT),
    ("bell", BELL_INSTRUMENT),
    ("bass", BASS_INSTRUMENT),
];

static FACTORY_BINDINGS_JSON: &[(&str, &str)] = &[("keyboard", KEYBOARD_BINDINGS)];

/// A single sine carrier with a short fade in and out.
const SINE_INSTRUMENT: &str = r#"
{
  "name": "Sine",
  "polyphony": 8,
  "synth": {
    "mode": "PHASE",
    "carriers": [0],
    "oscillators": [ { "type": "SINE" } ]
  },
  "envelope": { "peak_volume_num": 1, "sustain_volume_num": 1, "volume_denom": 1,
                "attack_length": 0.005, "decay_length": 0.0, "release_length": 0.05 }
}
"#;

/// Two-operator phase modulation with a decaying body.
const FM_PIANO_INSTRUMENT: &str = r#"
{
  "name": "FM Piano",
  "polyphony": 8,
  "synth": {
    "mode": "PHASE",
    "carriers": [0],
    "oscillators": [
      { "type": "SINE", "modulators": [1] },
      { "type": "SINE", "amp_num": 3, "amp_denom": 4, "period_num": 1, "period_denom": 1 }
    ]
  },
  "envelope": { "peak_volume_num": 1, "sustain_volume_num": 1, "volume_denom": 4,
                "attack_length": 0.002, "decay_length": 0.6, "release_length": 0.3 }
}
"#;

/// Inharmonic modulator ratio for a struck-metal tone.
const BELL_INSTRUMENT: &str = r#"
{
  "name": "Bell",
  "polyphony": 8,
  "synth": {
    "mode": "PHASE",
    "carriers": [0],
    "oscillators": [
      { "type": "SINE", "modulators": [1] },
      { "type": "SINE", "amp_num": 1, "amp_denom": 2, "period_num": 2, "period_denom": 7 }
    ]
  },
  "envelope": { "peak_volume_num": 1, "sustain_volume_num": 0, "volume_denom": 1,
                "attack_length": 0.002, "decay_length": 1.5, "release_length": 0.8 }
}
"#;

/// Saw carrier an octave down with a frequency-modulating sine.
const BASS_INSTRUMENT: &str = r#"
{
  "name": "Bass",
  "polyphony": 4,
  "synth": {
    "mode": "FREQUENCY",
    "carriers": [0],
    "oscillators": [
      { "type": "SAW", "amp_num": 1, "amp_denom": 2, "period_num": 2, "period_denom": 1,
        "modulators": [1] },
      { "type": "SINE", "amp_num": 1, "amp_denom": 8, "period_num": 2, "period_denom": 1 }
    ]
  },
  "envelope": { "peak_volume_num": 1, "sustain_volume_num": 3, "volume_denom": 4,
                "attack_length": 0.01, "decay_length": 0.2, "release_length": 0.1 }
}
"#;

/// Two keyboard rows as a chromatic octave from C4, space records the
/// selected loop, tab selects the next one, backspace clears it and
/// delete mutes it. Left shift held raises everything an octave.
///
/// Indices are USB HID keyboard usage codes.
const KEYBOARD_BINDINGS: &str = r#"
{
  "name": "Keyboard",
  "locked": true,
  "controller_type": "KEYBOARD",
  "device_name": "",
  "binds": [
    { "control": { "type": "BUTTON_PRESS", "index": 29 }, "action": { "type": "KEY", "semitone": -9 } },
    { "control": { "type": "BUTTON_PRESS", "index": 22 }, "action": { "type": "KEY", "semitone": -8 } },
    { "control": { "type": "BUTTON_PRESS", "index": 27 }, "action": { "type": "KEY", "semitone": -7 } },
    { "control": { "type": "BUTTON_PRESS", "index": 7 },  "action": { "type": "KEY", "semitone": -6 } },
    { "control": { "type": "BUTTON_PRESS", "index": 6 },  "action": { "type": "KEY", "semitone": -5 } },
    { "control": { "type": "BUTTON_PRESS", "index": 25 }, "action": { "type": "KEY", "semitone": -4 } },
    { "control": { "type": "BUTTON_PRESS", "index": 10 }, "action": { "type": "KEY", "semitone": -3 } },
    { "control": { "type": "BUTTON_PRESS", "index": 5 },  "action": { "type": "KEY", "semitone": -2 } },
    { "control": { "type": "BUTTON_PRESS", "index": 11 }, "action": { "type": "KEY", "semitone": -1 } },
    { "control": { "type": "BUTTON_PRESS", "index": 17 }, "action": { "type": "KEY", "semitone": 0 } },
    { "control": { "type": "BUTTON_PRESS", "index": 13 }, "action": { "type": "KEY", "semitone": 1 } },
    { "control": { "type": "BUTTON_PRESS", "index": 16 }, "action": { "type": "KEY", "semitone": 2 } },
    { "control": { "type": "BUTTON_PRESS", "index": 54 }, "action": { "type": "KEY", "semitone": 3 } },
    { "control": { "type": "BUTTON_PRESS", "index": 225, "stacking": true },
      "action": { "type": "FREQUENCY_EXPT", "max_expt": 12.0 } },
    { "control": { "type": "BUTTON_PRESS", "index": 44 },
      "action": { "type": "LOOP_CONTROL", "index": -1, "op": "RECORD" } },
    { "control": { "type": "BUTTON_PRESS", "index": 43 },
      "action": { "type": "LOOP_CONTROL", "index": -1, "op": "SELECT" } },
    { "control": { "type": "BUTTON_PRESS", "index": 42 },
      "action": { "type": "LOOP_CONTROL", "index": -1, "op": "CLEAR" } },
    { "control": { "type": "BUTTON_PRESS", "index": 76 },
      "action": { "type": "LOOP_CONTROL", "index": -1, "op": "MUTE" } }
  ]
}
"#;

/// Get all factory instruments.
pub fn factory_instruments() -> Vec<InstrumentFile> {
    FACTORY_INSTRUMENTS_JSON
        .iter()
        .filter_map(|(_, json)| InstrumentFile::from_json(json).ok())
        .collect()
}

/// Get a factory instrument by internal or display name, ignoring case.
///
/// ```rust
/// use resono_config::get_factory_instrument;
///
/// assert_eq!(get_factory_instrument("FM Piano").unwrap().name, "FM Piano");
/// assert_eq!(get_factory_instrument("fm_piano").unwrap().name, "FM Piano");
/// assert!(get_factory_instrument("organ").is_none());
/// ```
pub fn get_factory_instrument(name: &str) -> Option<InstrumentFile> {
    find(FACTORY_INSTRUMENTS_JSON, name, InstrumentFile::from_json, |f| f.name.as_str())
}

/// Internal names of the factory instruments.
pub fn factory_instrument_names() -> Vec<&'static str> {
    FACTORY_INSTRUMENT_NAMES.to_vec()
}

/// Check if a name refers to a factory instrument.
pub fn is_factory_instrument(name: &str) -> bool {
    get_factory_instrument(name).is_some()
}

/// Get all factory binding sets.
pub fn factory_bindings() -> Vec<BindingsFile> {
    FACTORY_BINDINGS_JSON
        .iter()
        .filter_map(|(_, json)| BindingsFile::from_json(json).ok())
        .collect()
}

/// Get a factory binding set by internal or display name, ignoring case.
pub fn get_factory_bindings(name: &str) -> Option<BindingsFile> {
    find(FACTORY_BINDINGS_JSON, name, BindingsFile::from_json, |f| f.name.as_str())
}

fn find<T, E>(
    table: &[(&str, &str)],
    name: &str,
    parse: impl Fn(&str) -> Result<T, E>,
    display: impl Fn(&T) -> &str,
) -> Option<T> {
    let name_lower = name.to_lowercase();

    if let Some((_, json)) = table.iter().find(|(id, _)| id.to_lowercase() == name_lower) {
        return parse(json).ok();
    }

    table
        .iter()
        .filter_map(|(_, json)| parse(json).ok())
        .find(|preset| display(preset).to_lowercase() == name_lower)
}

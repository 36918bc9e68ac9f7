//! Instrument file format.

use std::path::Path;

use resono_core::{
    DEFAULT_POLYPHONY, Envelope, FmGraph, ModulationMode, Oscillator, Patch, Waveform,
    samples_to_seconds, seconds_to_samples,
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::file::{read_json, write_json};

/// Instrument preset as stored on disk.
///
/// Envelope stage lengths are stored in seconds so a file sounds the same
/// at every sample rate; [`InstrumentFile::to_patch`] converts them.
///
/// # JSON Format
///
/// ```json
/// {
///   "name": "Bell",
///   "polyphony": 8,
///   "synth": {
///     "mode": "PHASE",
///     "carriers": [0],
///     "oscillators": [
///       { "type": "SINE", "amp_num": 1, "amp_denom": 1, "period_num": 1,
///         "period_denom": 1, "period_fine": 0, "phase_constant": 0,
///         "modulators": [1] },
///       { "type": "SINE", "amp_num": 1, "amp_denom": 2, "period_num": 7,
///         "period_denom": 2, "modulators": [] }
///     ]
///   },
///   "envelope": { "peak_volume_num": 1, "sustain_volume_num": 0,
///                 "volume_denom": 1, "attack_length": 0.002,
///                 "decay_length": 1.5, "release_length": 0.8 }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstrumentFile {
    /// Display name.
    pub name: String,

    /// Voice count.
    #[serde(default = "default_polyphony")]
    pub polyphony: usize,

    /// Oscillator graph.
    #[serde(default)]
    pub synth: SynthEntry,

    /// Amplitude envelope.
    #[serde(default)]
    pub envelope: EnvelopeEntry,
}

fn default_polyphony() -> usize {
    DEFAULT_POLYPHONY
}

/// Graph section of an instrument file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SynthEntry {
    /// `"PHASE"` or `"FREQUENCY"`.
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Indices of the oscillators summed into the output.
    #[serde(default)]
    pub carriers: Vec<usize>,
    /// Oscillators in file order.
    #[serde(default)]
    pub oscillators: Vec<OscillatorEntry>,
}

fn default_mode() -> String {
    ModulationMode::Phase.name().to_string()
}

impl Default for SynthEntry {
    fn default() -> Self {
        SynthEntry::from_graph(&FmGraph::sine())
    }
}

/// One oscillator of an instrument file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OscillatorEntry {
    /// Waveform name, e.g. `"SINE"`.
    #[serde(rename = "type")]
    pub waveform: String,
    /// Amplitude numerator.
    #[serde(default = "one_i64")]
    pub amp_num: i64,
    /// Amplitude denominator.
    #[serde(default = "one_i64")]
    pub amp_denom: i64,
    /// Period numerator.
    #[serde(default = "one_u64")]
    pub period_num: u64,
    /// Period denominator.
    #[serde(default = "one_u64")]
    pub period_denom: u64,
    /// Fine period offset in units of `1 / 65536`.
    #[serde(default)]
    pub period_fine: i64,
    /// Initial phase.
    #[serde(default)]
    pub phase_constant: u32,
    /// Modulator indices.
    #[serde(default)]
    pub modulators: Vec<usize>,
}

fn one_i64() -> i64 {
    1
}

fn one_u64() -> u64 {
    1
}

/// Envelope section of an instrument file; lengths in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EnvelopeEntry {
    /// Peak volume numerator.
    pub peak_volume_num: i64,
    /// Sustain volume numerator.
    pub sustain_volume_num: i64,
    /// Shared volume denominator.
    pub volume_denom: i64,
    /// Attack in seconds.
    pub attack_length: f64,
    /// Decay in seconds.
    pub decay_length: f64,
    /// Release in seconds.
    pub release_length: f64,
}

impl Default for EnvelopeEntry {
    fn default() -> Self {
        Self {
            peak_volume_num: 1,
            sustain_volume_num: 1,
            volume_denom: 1,
            attack_length: 0.0,
            decay_length: 0.0,
            release_length: 0.0,
        }
    }
}

impl SynthEntry {
    /// Describe a graph.
    pub fn from_graph(graph: &FmGraph) -> Self {
        Self {
            mode: graph.mode().name().to_string(),
            carriers: graph.carriers().to_vec(),
            oscillators: graph
                .oscillators()
                .iter()
                .map(|osc| {
                    let (amp_num, amp_denom) = osc.amplitude();
                    let (period_num, period_denom) = osc.period();
                    OscillatorEntry {
                        waveform: osc.waveform().name().to_string(),
                        amp_num,
                        amp_denom,
                        period_num,
                        period_denom,
                        period_fine: osc.period_fine(),
                        phase_constant: osc.phase_constant(),
                        modulators: osc.modulators().to_vec(),
                    }
                })
                .collect(),
        }
    }

    /// Build and sanitize the graph.
    ///
    /// Unknown mode or waveform names are errors; bad indices and cycles are
    /// not, `finish_changes` repairs them.
    pub fn to_graph(&self) -> Result<FmGraph> {
        let mode = ModulationMode::from_name(&self.mode)
            .ok_or_else(|| ConfigError::invalid("modulation mode", format!("'{}'", self.mode)))?;
        let oscillators = self
            .oscillators
            .iter()
            .map(|entry| {
                let waveform = Waveform::from_name(&entry.waveform).ok_or_else(|| {
                    ConfigError::invalid("waveform", format!("'{}'", entry.waveform))
                })?;
                Ok(Oscillator::new(waveform)
                    .with_amplitude(entry.amp_num, entry.amp_denom)
                    .with_period(entry.period_num, entry.period_denom)
                    .with_period_fine(entry.period_fine)
                    .with_phase_constant(entry.phase_constant)
                    .with_modulators(&entry.modulators))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(FmGraph::from_parts(mode, oscillators, self.carriers.clone()))
    }
}

impl EnvelopeEntry {
    /// Describe an envelope at `sample_rate`.
    pub fn from_envelope(envelope: &Envelope, sample_rate: u32) -> Self {
        Self {
            peak_volume_num: envelope.peak_volume_num(),
            sustain_volume_num: envelope.sustain_volume_num(),
            volume_denom: envelope.volume_denom(),
            attack_length: samples_to_seconds(envelope.attack_length(), sample_rate),
            decay_length: samples_to_seconds(envelope.decay_length(), sample_rate),
            release_length: samples_to_seconds(envelope.release_length(), sample_rate),
        }
    }

    /// Convert to sample counts at `sample_rate`.
    pub fn to_envelope(&self, sample_rate: u32) -> Envelope {
        Envelope::new(
            self.peak_volume_num,
            self.sustain_volume_num,
            self.volume_denom,
            seconds_to_samples(self.attack_length, sample_rate),
            seconds_to_samples(self.decay_length, sample_rate),
            seconds_to_samples(self.release_length, sample_rate),
        )
    }
}

impl InstrumentFile {
    /// Describe a patch; envelope lengths are converted at `sample_rate`.
    pub fn from_patch(patch: &Patch, sample_rate: u32) -> Self {
        Self {
            name: patch.name.clone(),
            polyphony: patch.polyphony,
            synth: SynthEntry::from_graph(&patch.graph),
            envelope: EnvelopeEntry::from_envelope(&patch.envelope, sample_rate),
        }
    }

    /// Build a patch for `sample_rate`.
    pub fn to_patch(&self, sample_rate: u32) -> Result<Patch> {
        Ok(Patch::new(self.name.clone())
            .with_polyphony(self.polyphony)
            .with_graph(self.synth.to_graph()?)
            .with_envelope(self.envelope.to_envelope(sample_rate)))
    }

    /// Load an instrument file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref())
    }

    /// Parse an instrument from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Save to a JSON file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json(path.as_ref(), self)
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BELL: &str = r#"
{
  "name": "Bell",
  "polyphony": 4,
  "synth": {
    "mode": "PHASE",
    "carriers": [0],
    "oscillators": [
      { "type": "SINE", "modulators": [1] },
      { "type": "sine", "amp_num": 1, "amp_denom": 2, "period_num": 7, "period_denom": 2 }
    ]
  },
  "envelope": { "peak_volume_num": 1, "sustain_volume_num": 0, "volume_denom": 1,
                "attack_length": 0.01, "decay_length": 1.0, "release_length": 0.5 }
}
"#;

    #[test]
    fn test_parse_and_build() {
        let file = InstrumentFile::from_json(BELL).unwrap();
        assert_eq!(file.polyphony, 4);
        assert_eq!(file.synth.oscillators[0].amp_denom, 1);

        let patch = file.to_patch(48000).unwrap();
        assert_eq!(patch.graph.len(), 2);
        assert_eq!(patch.graph.carriers(), &[0]);
        assert_eq!(patch.graph.oscillators()[0].modulators(), &[1]);
        assert_eq!(patch.graph.oscillators()[1].amplitude(), (1, 2));
        assert_eq!(patch.envelope.attack_length(), 480);
        assert_eq!(patch.envelope.decay_length(), 48000);
        assert_eq!(patch.envelope.release_length(), 24000);
    }

    #[test]
    fn test_minimal_file_is_a_sine() {
        let file = InstrumentFile::from_json(r#"{ "name": "Minimal" }"#).unwrap();
        let patch = file.to_patch(44100).unwrap();
        assert_eq!(patch.graph, FmGraph::sine());
        assert_eq!(patch.polyphony, DEFAULT_POLYPHONY);
        assert_eq!(patch.envelope, Envelope::default());
    }

    #[test]
    fn test_unknown_names_rejected() {
        let mut file = InstrumentFile::from_json(BELL).unwrap();
        file.synth.oscillators[1].waveform = "WOBBLE".to_string();
        assert!(matches!(file.to_patch(48000), Err(ConfigError::Invalid { .. })));

        let mut file = InstrumentFile::from_json(BELL).unwrap();
        file.synth.mode = "AM".to_string();
        assert!(file.to_patch(48000).is_err());
    }

    #[test]
    fn test_bad_indices_are_sanitized() {
        let mut file = InstrumentFile::from_json(BELL).unwrap();
        file.synth.carriers.push(9);
        file.synth.oscillators[1].modulators = vec![5];
        let patch = file.to_patch(48000).unwrap();
        assert_eq!(patch.graph.carriers(), &[0]);
        assert!(patch.graph.oscillators()[1].modulators().is_empty());
    }

    #[test]
    fn test_patch_roundtrip() {
        let patch = InstrumentFile::from_json(BELL).unwrap().to_patch(48000).unwrap();
        let file = InstrumentFile::from_patch(&patch, 48000);
        let json = file.to_json().unwrap();
        let again = InstrumentFile::from_json(&json).unwrap().to_patch(48000).unwrap();
        assert_eq!(patch, again);
    }

    #[test]
    fn test_zero_polyphony_clamped() {
        let mut file = InstrumentFile::from_json(BELL).unwrap();
        file.polyphony = 0;
        assert_eq!(file.to_patch(48000).unwrap().polyphony, 1);
    }
}

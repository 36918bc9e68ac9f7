//! Application options.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::file::{read_json, write_json};

/// Encoding used for recordings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordingFormat {
    /// Uncompressed PCM.
    #[default]
    Wav,
    /// Ogg Vorbis.
    Ogg,
    /// Lossless FLAC.
    Flac,
}

impl RecordingFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            RecordingFormat::Wav => "wav",
            RecordingFormat::Ogg => "ogg",
            RecordingFormat::Flac => "flac",
        }
    }

    /// PCM bit depth for a quality in `0..=100`. `None` for lossy formats.
    pub fn bits_per_sample(self, quality: u32) -> Option<u16> {
        match self {
            RecordingFormat::Wav => Some(match quality {
                90.. => 32,
                50..=89 => 24,
                _ => 16,
            }),
            RecordingFormat::Flac => Some(match quality {
                90.. => 24,
                50..=89 => 16,
                _ => 8,
            }),
            RecordingFormat::Ogg => None,
        }
    }

    /// Vorbis quality in `[0, 1]`.
    pub fn vorbis_quality(quality: u32) -> f32 {
        quality.min(100) as f32 / 100.0
    }
}

/// Persistent options.
///
/// Every field has a default so partial files load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Options {
    /// Audio host name; empty selects the platform default.
    pub system: String,
    /// Output device name; empty selects the host default.
    pub device: String,
    /// Preferred sample rate; 0 picks the first the device supports.
    pub samplerate: u32,
    /// Requested output latency in seconds.
    pub target_latency: f64,
    /// Encoding for recordings.
    pub recording_format: RecordingFormat,
    /// Encoding quality in `0..=100`.
    pub recording_quality: u32,
    /// Window width for graphical front ends.
    pub initial_window_width: u32,
    /// Window height for graphical front ends.
    pub initial_window_height: u32,
    /// Reserved; has no effect.
    pub start_loop_on_sound: bool,
    /// Reserved; has no effect.
    pub align_loop_record: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            system: String::new(),
            device: String::new(),
            samplerate: 0,
            target_latency: 0.01,
            recording_format: RecordingFormat::Wav,
            recording_quality: 100,
            initial_window_width: 1024,
            initial_window_height: 768,
            start_loop_on_sound: false,
            align_loop_record: false,
        }
    }
}

impl Options {
    /// Load options from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref())
    }

    /// Load options, falling back to defaults when the file is missing or
    /// malformed.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(options) => options,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring options file");
                Self::default()
            }
        }
    }

    /// Save options, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json(path.as_ref(), self)
    }

    /// Bit depth for recordings under these options.
    pub fn recording_bits(&self) -> Option<u16> {
        self.recording_format
            .bits_per_sample(self.recording_quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_wav_bit_depth() {
        assert_eq!(RecordingFormat::Wav.bits_per_sample(100), Some(32));
        assert_eq!(RecordingFormat::Wav.bits_per_sample(90), Some(32));
        assert_eq!(RecordingFormat::Wav.bits_per_sample(89), Some(24));
        assert_eq!(RecordingFormat::Wav.bits_per_sample(50), Some(24));
        assert_eq!(RecordingFormat::Wav.bits_per_sample(49), Some(16));
        assert_eq!(RecordingFormat::Wav.bits_per_sample(0), Some(16));
    }

    #[test]
    fn test_flac_bit_depth() {
        assert_eq!(RecordingFormat::Flac.bits_per_sample(95), Some(24));
        assert_eq!(RecordingFormat::Flac.bits_per_sample(60), Some(16));
        assert_eq!(RecordingFormat::Flac.bits_per_sample(10), Some(8));
        assert_eq!(RecordingFormat::Ogg.bits_per_sample(100), None);
    }

    #[test]
    fn test_vorbis_quality_is_clamped() {
        assert_eq!(RecordingFormat::vorbis_quality(50), 0.5);
        assert_eq!(RecordingFormat::vorbis_quality(250), 1.0);
    }

    #[test]
    fn test_partial_file() {
        let options: Options =
            serde_json::from_str(r#"{ "device": "USB", "recording_format": "FLAC" }"#).unwrap();
        assert_eq!(options.device, "USB");
        assert_eq!(options.recording_format, RecordingFormat::Flac);
        assert_eq!(options.recording_quality, 100);
        assert!(!options.align_loop_record);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("options.json");
        let options = Options {
            samplerate: 48000,
            recording_format: RecordingFormat::Ogg,
            start_loop_on_sound: true,
            ..Options::default()
        };
        options.save(&path).unwrap();
        assert_eq!(Options::load(&path).unwrap(), options);
    }

    #[test]
    fn test_load_or_default() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            Options::load_or_default(dir.path().join("missing.json")),
            Options::default()
        );

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        assert_eq!(Options::load_or_default(&broken), Options::default());
    }
}

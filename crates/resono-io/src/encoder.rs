//! Recording encoders.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::{DateTime, Local};
use hound::{SampleFormat, WavSpec, WavWriter};
use resono_config::RecordingFormat;

use crate::{Error, Result};

/// Sink for mono signed 32-bit samples.
pub trait SampleEncoder: Send {
    /// Append samples.
    fn write(&mut self, samples: &[i32]) -> Result<()>;

    /// Flush and close the output.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Mono PCM WAV writer.
///
/// Samples are full-scale `i32`; lower bit depths keep the top bits.
pub struct WavEncoder {
    writer: WavWriter<BufWriter<File>>,
    shift: u32,
}

impl WavEncoder {
    /// Create `path` with the given bit depth (16, 24 or 32).
    pub fn create(path: impl AsRef<Path>, sample_rate: u32, bits_per_sample: u16) -> Result<Self> {
        if !matches!(bits_per_sample, 16 | 24 | 32) {
            return Err(Error::UnsupportedFormat(format!(
                "{bits_per_sample}-bit WAV"
            )));
        }
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample,
            sample_format: SampleFormat::Int,
        };
        Ok(Self {
            writer: WavWriter::create(path, spec)?,
            shift: 32 - u32::from(bits_per_sample),
        })
    }
}

impl SampleEncoder for WavEncoder {
    fn write(&mut self, samples: &[i32]) -> Result<()> {
        for &s in samples {
            self.writer.write_sample(s >> self.shift)?;
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        self.writer.finalize()?;
        Ok(())
    }
}

/// Open an encoder for `format` at `quality` (0..=100).
///
/// Only WAV is available; OGG and FLAC report [`Error::UnsupportedFormat`].
pub fn create_encoder(
    path: &Path,
    format: RecordingFormat,
    quality: u32,
    sample_rate: u32,
) -> Result<Box<dyn SampleEncoder>> {
    match format {
        RecordingFormat::Wav => {
            let bits = format.bits_per_sample(quality).unwrap_or(16);
            Ok(Box::new(WavEncoder::create(path, sample_rate, bits)?))
        }
        RecordingFormat::Ogg | RecordingFormat::Flac => Err(Error::UnsupportedFormat(format!(
            "{} recording",
            format.extension()
        ))),
    }
}

/// File name for a recording started at `time`: `YYYY-MM-DD-HH.MM.SS.ext`.
pub fn recording_file_name(time: DateTime<Local>, format: RecordingFormat) -> String {
    format!("{}.{}", time.format("%Y-%m-%d-%H.%M.%S"), format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use hound::WavReader;
    use tempfile::TempDir;

    #[test]
    fn test_file_name() {
        let time = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(
            recording_file_name(time, RecordingFormat::Wav),
            "2024-03-09-07.05.01.wav"
        );
        assert!(recording_file_name(time, RecordingFormat::Flac).ends_with(".flac"));
    }

    #[test]
    fn test_wav_bit_depths() {
        let dir = TempDir::new().unwrap();
        for (quality, bits, expected) in [(100, 32, i32::MAX), (60, 24, 0x7F_FFFF), (10, 16, 0x7FFF)]
        {
            let path = dir.path().join(format!("q{quality}.wav"));
            let mut encoder = create_encoder(&path, RecordingFormat::Wav, quality, 44100).unwrap();
            encoder.write(&[i32::MAX, 0, i32::MIN]).unwrap();
            encoder.finish().unwrap();

            let mut reader = WavReader::open(&path).unwrap();
            assert_eq!(reader.spec().bits_per_sample, bits);
            assert_eq!(reader.spec().channels, 1);
            let samples: Vec<i32> = reader.samples::<i32>().map(|s| s.unwrap()).collect();
            assert_eq!(samples, vec![expected, 0, -expected - 1]);
        }
    }

    #[test]
    fn test_compressed_formats_unsupported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.ogg");
        assert!(matches!(
            create_encoder(&path, RecordingFormat::Ogg, 50, 44100),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(!path.exists());
    }
}

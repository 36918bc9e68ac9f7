//! Audio driver glue for resono.
//!
//! This crate provides:
//!
//! - **Backends**: the [`AudioBackend`] trait and its cpal implementation,
//!   producing mono signed 32-bit output streams
//! - **Device catalog**: [`AudioHostCatalog`] caches device enumeration and
//!   sample-rate probes
//! - **Engine hand-off**: [`engine_pair`] splits a [`Session`](resono_core::Session)
//!   into the audio-thread [`Engine`] and the control-thread [`EngineHandle`]
//! - **Recording**: [`Recorder`] buffers rendered audio and encodes it on a
//!   worker thread through a [`SampleEncoder`]
//! - **Audio system**: [`AudioSystem`] ties the pieces to an [`Options`](resono_config::Options)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use resono_config::{Options, get_factory_instrument};
//! use resono_core::SessionConfig;
//! use resono_io::{AudioSystem, CpalBackend};
//!
//! let bell = get_factory_instrument("Bell").unwrap();
//! let mut system = AudioSystem::new(Box::new(CpalBackend::new()));
//! let mut handle = system.open(&Options::default(), &bell, SessionConfig::default())?;
//! let patch = bell.to_patch(handle.sample_rate())?;
//! // drive `handle` with resono_control::ControlState::apply(&mut handle, 1.0, &patch)
//! ```

pub mod backend;
mod catalog;
pub mod cpal_backend;
mod encoder;
mod engine;
mod recorder;
mod system;

pub use backend::{
    AudioBackend, AudioDevice, BackendStreamConfig, ErrorCallback, OutputCallback,
    SUPPORTED_SAMPLE_RATES, StreamHandle,
};
pub use catalog::AudioHostCatalog;
pub use cpal_backend::CpalBackend;
pub use encoder::{SampleEncoder, WavEncoder, create_encoder, recording_file_name};
pub use engine::{Engine, EngineCommand, EngineHandle, engine_pair};
pub use recorder::{ENCODE_BLOCK, Recorder, RecorderTap};
pub use system::AudioSystem;

/// Error types for audio I/O operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// WAV file write error.
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    /// Audio stream setup or runtime error.
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// No audio device available on the system.
    #[error("No audio device available")]
    NoDevice,

    /// The requested audio device was not found.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The device supports none of the usable sample rates.
    #[error("Device '{device}' supports none of 44100, 48000, 96000, 192000 Hz")]
    UnsupportedSampleRate {
        /// Device name.
        device: String,
    },

    /// The requested sample or file format is not supported.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation needs an open output stream.
    #[error("Audio system is not open")]
    NotOpen,

    /// Options or preset error.
    #[error(transparent)]
    Config(#[from] resono_config::ConfigError),
}

/// Convenience result type for audio I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnsupportedSampleRate {
            device: "Line Out".to_string(),
        };
        assert!(err.to_string().contains("Line Out"));
        assert_eq!(
            Error::UnsupportedFormat("OGG".to_string()).to_string(),
            "Unsupported format: OGG"
        );
    }

    #[test]
    fn test_config_error_is_transparent() {
        let err = Error::from(resono_config::ConfigError::PresetNotFound("x".to_string()));
        assert_eq!(err.to_string(), "preset not found: x");
    }
}

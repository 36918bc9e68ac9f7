//! Pluggable audio backend abstraction.
//!
//! [`AudioBackend`] decouples the engine from any platform audio API. The
//! default implementation wraps [cpal](https://crates.io/crates/cpal); tests
//! use a deterministic mock.
//!
//! The trait uses boxed closures for callbacks so it stays object-safe and
//! the backend can be chosen at runtime. Streams are returned as
//! [`StreamHandle`], which stops playback on drop.
//!
//! Output is always mono signed 32-bit PCM; a backend whose device wants
//! more channels or float samples converts inside its own callback.

use crate::Result;

/// Sample rates an output stream may run at, in order of preference.
pub const SUPPORTED_SAMPLE_RATES: [u32; 4] = [44100, 48000, 96000, 192000];

/// An output device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    /// Human-readable device name.
    pub name: String,
    /// Default sample rate in Hz.
    pub default_sample_rate: u32,
    /// Channels of the default output configuration.
    pub channels: u16,
}

/// Configuration for building an output stream.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendStreamConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Preferred buffer size in frames; `None` lets the driver decide.
    pub buffer_size: Option<u32>,
    /// Device name (uses system default if `None`).
    pub device_name: Option<String>,
}

impl Default for BackendStreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            buffer_size: None,
            device_name: None,
        }
    }
}

impl BackendStreamConfig {
    /// Buffer size in frames for a target latency in seconds.
    pub fn buffer_for_latency(sample_rate: u32, latency: f64) -> Option<u32> {
        if latency > 0.0 {
            Some(((latency * f64::from(sample_rate)).round() as u32).max(16))
        } else {
            None
        }
    }
}

/// Type-erased audio stream handle.
///
/// The stream is active while this handle exists; dropping it stops
/// playback.
pub struct StreamHandle {
    _inner: Box<dyn Send>,
}

impl StreamHandle {
    /// Wrap a backend-specific stream object.
    pub fn new<T: Send + 'static>(stream: T) -> Self {
        Self {
            _inner: Box::new(stream),
        }
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle").finish_non_exhaustive()
    }
}

/// Audio output callback.
///
/// Called on the real-time audio thread with a mono buffer to fill; the
/// buffer length is the frame count. Implementations must not allocate,
/// block or perform I/O.
pub type OutputCallback = Box<dyn FnMut(&mut [i32]) + Send>;

/// Error callback, called with a human-readable message when the stream
/// fails.
pub type ErrorCallback = Box<dyn FnMut(&str) + Send>;

/// Pluggable audio backend.
pub trait AudioBackend: Send {
    /// Human-readable name of this backend (e.g., "cpal", "mock").
    fn name(&self) -> &str;

    /// List output devices.
    fn list_output_devices(&self) -> Result<Vec<AudioDevice>>;

    /// The default output device, if any.
    fn default_output_device(&self) -> Result<Option<AudioDevice>>;

    /// Which of [`SUPPORTED_SAMPLE_RATES`] the named device accepts.
    ///
    /// An empty name means the default device.
    fn probe_sample_rates(&self, device: &str) -> Result<Vec<u32>>;

    /// Build and start an output stream.
    ///
    /// The returned [`StreamHandle`] keeps the stream alive.
    fn build_output_stream(
        &self,
        config: &BackendStreamConfig,
        callback: OutputCallback,
        error_callback: ErrorCallback,
    ) -> Result<StreamHandle>;
}

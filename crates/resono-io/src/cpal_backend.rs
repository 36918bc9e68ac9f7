//! cpal-based audio backend.
//!
//! [`CpalBackend`] is the default [`AudioBackend`]. It opens the device in
//! signed 32-bit format when offered, otherwise in 32-bit float, and copies
//! the mono render into every device channel.

use crate::backend::{
    AudioBackend, AudioDevice, BackendStreamConfig, ErrorCallback, OutputCallback,
    SUPPORTED_SAMPLE_RATES, StreamHandle,
};
use crate::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, SampleFormat};

/// Mono scratch frames allocated up front; larger driver buffers grow it
/// once.
const INITIAL_FRAMES: usize = 8192;

const I32_TO_F32: f32 = 1.0 / 2_147_483_648.0;

fn device_name(device: &Device) -> std::result::Result<String, cpal::DeviceNameError> {
    device.description().map(|d| d.name().to_string())
}

/// Copy one mono render into an interleaved device buffer.
pub(crate) fn fill_interleaved<T: Copy>(
    data: &mut [T],
    channels: usize,
    mono: &mut Vec<i32>,
    callback: &mut OutputCallback,
    convert: impl Fn(i32) -> T,
) {
    let channels = channels.max(1);
    let frames = data.len() / channels;
    if mono.len() < frames {
        mono.resize(frames, 0);
    }
    let mono = &mut mono[..frames];
    callback(mono);
    for (frame, &sample) in data.chunks_exact_mut(channels).zip(mono.iter()) {
        frame.fill(convert(sample));
    }
}

/// cpal-based audio backend.
pub struct CpalBackend {
    host: Host,
}

impl CpalBackend {
    /// Create a backend on the platform's default audio host.
    pub fn new() -> Self {
        let host = cpal::default_host();
        tracing::info!(host = host.id().name(), "cpal backend initialized");
        Self { host }
    }

    /// Create a backend on the named host (`"ALSA"`, `"JACK"`, ...). An empty
    /// name selects the default host.
    pub fn with_system(system: &str) -> Result<Self> {
        if system.is_empty() {
            return Ok(Self::new());
        }
        let id = cpal::available_hosts()
            .into_iter()
            .find(|id| id.name().eq_ignore_ascii_case(system))
            .ok_or_else(|| Error::DeviceNotFound(format!("audio system '{system}'")))?;
        let host = cpal::host_from_id(id).map_err(|e| Error::Stream(e.to_string()))?;
        tracing::info!(host = host.id().name(), "cpal backend initialized");
        Ok(Self { host })
    }

    /// Names of the audio systems available on this platform.
    pub fn available_systems() -> Vec<&'static str> {
        cpal::available_hosts()
            .into_iter()
            .map(|id| id.name())
            .collect()
    }

    /// Find an output device by exact or partial name, or return the default.
    fn find_output_device(&self, name: Option<&str>) -> Result<Device> {
        let Some(search) = name.filter(|n| !n.is_empty()) else {
            return self.host.default_output_device().ok_or(Error::NoDevice);
        };
        let search_lower = search.to_lowercase();
        let devices: Vec<Device> = self
            .host
            .output_devices()
            .map_err(|e| Error::Stream(e.to_string()))?
            .collect();

        let named = |device: &Device| device_name(device).map(|n| n.to_lowercase()).ok();
        if let Some(device) = devices
            .iter()
            .find(|d| named(*d).as_deref() == Some(search_lower.as_str()))
        {
            return Ok(device.clone());
        }
        devices
            .into_iter()
            .find(|d| named(d).is_some_and(|n| n.contains(&search_lower)))
            .ok_or_else(|| Error::DeviceNotFound(format!("no output device matching '{search}'")))
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn list_output_devices(&self) -> Result<Vec<AudioDevice>> {
        let devices = self
            .host
            .output_devices()
            .map_err(|e| Error::Stream(e.to_string()))?;
        Ok(devices
            .filter_map(|device| {
                let name = device_name(&device).ok()?;
                let config = device.default_output_config().ok()?;
                Some(AudioDevice {
                    name,
                    default_sample_rate: config.sample_rate(),
                    channels: config.channels(),
                })
            })
            .collect())
    }

    fn default_output_device(&self) -> Result<Option<AudioDevice>> {
        Ok(self.host.default_output_device().and_then(|device| {
            let name = device_name(&device).ok()?;
            let config = device.default_output_config().ok()?;
            Some(AudioDevice {
                name,
                default_sample_rate: config.sample_rate(),
                channels: config.channels(),
            })
        }))
    }

    fn probe_sample_rates(&self, device: &str) -> Result<Vec<u32>> {
        let device = self.find_output_device(Some(device))?;
        let ranges: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| Error::Stream(e.to_string()))?
            .collect();
        Ok(SUPPORTED_SAMPLE_RATES
            .into_iter()
            .filter(|&rate| {
                ranges
                    .iter()
                    .any(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
            })
            .collect())
    }

    fn build_output_stream(
        &self,
        config: &BackendStreamConfig,
        mut callback: OutputCallback,
        mut error_callback: ErrorCallback,
    ) -> Result<StreamHandle> {
        let device = self.find_output_device(config.device_name.as_deref())?;
        let rate = config.sample_rate;

        let ranges: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| Error::Stream(e.to_string()))?
            .filter(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
            .collect();
        let range = ranges
            .iter()
            .find(|r| r.sample_format() == SampleFormat::I32)
            .or_else(|| ranges.iter().find(|r| r.sample_format() == SampleFormat::F32))
            .ok_or_else(|| {
                Error::UnsupportedFormat(format!("no i32 or f32 output at {rate} Hz"))
            })?;
        let format = range.sample_format();
        let channels = range.channels();

        let stream_config = cpal::StreamConfig {
            channels,
            sample_rate: rate,
            buffer_size: config
                .buffer_size
                .map_or(cpal::BufferSize::Default, cpal::BufferSize::Fixed),
        };

        let mut mono = vec![0i32; INITIAL_FRAMES];
        let ch = usize::from(channels);
        let on_error = move |err: cpal::StreamError| error_callback(&err.to_string());
        let stream = match format {
            SampleFormat::I32 => device.build_output_stream(
                &stream_config,
                move |data: &mut [i32], _: &cpal::OutputCallbackInfo| {
                    fill_interleaved(data, ch, &mut mono, &mut callback, |s| s);
                },
                on_error,
                None,
            ),
            _ => device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    fill_interleaved(data, ch, &mut mono, &mut callback, |s| {
                        s as f32 * I32_TO_F32
                    });
                },
                on_error,
                None,
            ),
        }
        .map_err(|e| Error::Stream(e.to_string()))?;

        stream.play().map_err(|e| Error::Stream(e.to_string()))?;
        tracing::info!(
            channels,
            sample_rate = rate,
            format = ?format,
            "output stream started"
        );

        Ok(StreamHandle::new(stream))
    }
}

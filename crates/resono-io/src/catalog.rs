//! Cached device enumeration.

use std::collections::HashMap;

use crate::backend::{AudioBackend, AudioDevice, SUPPORTED_SAMPLE_RATES};
use crate::{Error, Result};

/// Caches the device list and per-device sample-rate probes of a backend.
///
/// Probing can take a noticeable time on some hosts, so results are kept
/// until [`refresh`](Self::refresh).
#[derive(Debug, Default)]
pub struct AudioHostCatalog {
    devices: Option<Vec<AudioDevice>>,
    rates: HashMap<String, Vec<u32>>,
}

impl AudioHostCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every cached result.
    pub fn refresh(&mut self) {
        self.devices = None;
        self.rates.clear();
        tracing::debug!("audio device cache cleared");
    }

    /// Output devices, enumerated on first use.
    pub fn devices(&mut self, backend: &dyn AudioBackend) -> Result<&[AudioDevice]> {
        if self.devices.is_none() {
            let devices = backend.list_output_devices()?;
            tracing::debug!(count = devices.len(), backend = backend.name(), "output devices enumerated");
            self.devices = Some(devices);
        }
        Ok(self.devices.as_deref().unwrap_or_default())
    }

    /// Supported rates of `device` (empty for the default), probed on first
    /// use.
    pub fn sample_rates(&mut self, backend: &dyn AudioBackend, device: &str) -> Result<&[u32]> {
        if !self.rates.contains_key(device) {
            let rates = backend.probe_sample_rates(device)?;
            tracing::debug!(device, ?rates, "sample rates probed");
            self.rates.insert(device.to_string(), rates);
        }
        Ok(self.rates.get(device).map(Vec::as_slice).unwrap_or_default())
    }

    /// Pick the stream rate for `device`: `preferred` when the device takes
    /// it, otherwise the first supported entry of [`SUPPORTED_SAMPLE_RATES`].
    pub fn choose_sample_rate(
        &mut self,
        backend: &dyn AudioBackend,
        device: &str,
        preferred: u32,
    ) -> Result<u32> {
        let rates = self.sample_rates(backend, device)?;
        if preferred != 0 && rates.contains(&preferred) {
            return Ok(preferred);
        }
        let chosen = SUPPORTED_SAMPLE_RATES
            .into_iter()
            .find(|r| rates.contains(r))
            .ok_or_else(|| Error::UnsupportedSampleRate {
                device: if device.is_empty() {
                    "default".to_string()
                } else {
                    device.to_string()
                },
            })?;
        if preferred != 0 {
            tracing::warn!(preferred, chosen, device, "preferred sample rate unavailable");
        }
        Ok(chosen)
    }
}

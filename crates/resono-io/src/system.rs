//! The audio system: device selection, the output stream and recording.

use std::path::{Path, PathBuf};

use chrono::Local;
use resono_config::{InstrumentFile, Options};
use resono_core::{Session, SessionConfig};

use crate::backend::{AudioBackend, AudioDevice, BackendStreamConfig, StreamHandle};
use crate::catalog::AudioHostCatalog;
use crate::cpal_backend::CpalBackend;
use crate::encoder::{create_encoder, recording_file_name};
use crate::engine::{EngineHandle, engine_pair};
use crate::recorder::Recorder;
use crate::{Error, Result};

/// Owns the backend, the running stream and the recorder.
///
/// At most one stream is open at a time. Closing, or dropping the system,
/// aborts any recording in progress before the stream stops.
pub struct AudioSystem {
    backend: Box<dyn AudioBackend>,
    catalog: AudioHostCatalog,
    stream: Option<StreamHandle>,
    recorder: Option<Recorder>,
    sample_rate: u32,
    options: Options,
}

impl AudioSystem {
    /// A closed system on `backend`.
    pub fn new(backend: Box<dyn AudioBackend>) -> Self {
        Self {
            backend,
            catalog: AudioHostCatalog::new(),
            stream: None,
            recorder: None,
            sample_rate: 0,
            options: Options::default(),
        }
    }

    /// A closed system on the cpal host named by `options.system`.
    pub fn from_options(options: &Options) -> Result<Self> {
        let mut system = Self::new(Box::new(CpalBackend::with_system(&options.system)?));
        system.options = options.clone();
        Ok(system)
    }

    /// The backend.
    pub fn backend(&self) -> &dyn AudioBackend {
        self.backend.as_ref()
    }

    /// Output devices, cached.
    pub fn devices(&mut self) -> Result<&[AudioDevice]> {
        self.catalog.devices(self.backend.as_ref())
    }

    /// Supported rates of `device` (empty for the default), cached.
    pub fn sample_rates(&mut self, device: &str) -> Result<&[u32]> {
        self.catalog.sample_rates(self.backend.as_ref(), device)
    }

    /// Forget cached devices and rates.
    pub fn refresh(&mut self) {
        self.catalog.refresh();
    }

    /// Whether a stream is running.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Rate of the running stream, 0 when closed.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Options the stream was opened with.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The recorder of the running stream.
    pub fn recorder(&self) -> Option<&Recorder> {
        self.recorder.as_ref()
    }

    /// Open the output stream and start rendering `instrument`.
    ///
    /// The rate is `options.samplerate` when the device supports it,
    /// otherwise the first supported standard rate. The session is built at
    /// that rate and moved into the audio callback; the returned handle
    /// drives it. A stream already open is closed first.
    pub fn open(
        &mut self,
        options: &Options,
        instrument: &InstrumentFile,
        config: SessionConfig,
    ) -> Result<EngineHandle> {
        self.close();
        self.options = options.clone();
        if options.align_loop_record {
            tracing::warn!("align_loop_record is not implemented and has no effect");
        }
        if options.start_loop_on_sound {
            tracing::warn!("start_loop_on_sound is not implemented and has no effect");
        }

        let rate =
            self.catalog
                .choose_sample_rate(self.backend.as_ref(), &options.device, options.samplerate)?;
        let patch = instrument.to_patch(rate)?;
        let session = Session::from_patch(&patch, rate, config);

        let recorder = Recorder::new(rate);
        let (engine, handle) = engine_pair(session);
        let mut engine = engine.with_recorder(recorder.tap());

        let stream_config = BackendStreamConfig {
            sample_rate: rate,
            buffer_size: BackendStreamConfig::buffer_for_latency(rate, options.target_latency),
            device_name: (!options.device.is_empty()).then(|| options.device.clone()),
        };
        let stream = self.backend.build_output_stream(
            &stream_config,
            Box::new(move |buf: &mut [i32]| engine.process(buf)),
            Box::new(|message: &str| tracing::error!(error = message, "audio stream error")),
        )?;

        tracing::info!(
            backend = self.backend.name(),
            device = %options.device,
            sample_rate = rate,
            buffer = ?stream_config.buffer_size,
            instrument = %patch.name,
            "audio system opened"
        );
        self.stream = Some(stream);
        self.recorder = Some(recorder);
        self.sample_rate = rate;
        Ok(handle)
    }

    /// Start recording the output into a new file under `dir`, named after
    /// the current local time. Returns the file path.
    pub fn start_recording(&mut self, dir: &Path) -> Result<PathBuf> {
        let format = self.options.recording_format;
        let quality = self.options.recording_quality;
        let rate = self.sample_rate;
        let recorder = self.recorder.as_mut().ok_or(Error::NotOpen)?;

        std::fs::create_dir_all(dir)?;
        let path = dir.join(recording_file_name(Local::now(), format));
        let encoder = create_encoder(&path, format, quality, rate)?;
        recorder.start(encoder, Some(path.clone()))?;
        Ok(path)
    }

    /// Finish the recording in progress. Returns the samples written.
    pub fn stop_recording(&mut self) -> Result<u64> {
        match self.recorder.as_mut() {
            Some(recorder) => recorder.stop(),
            None => Ok(0),
        }
    }

    /// Whether a recording is in progress.
    pub fn is_recording(&self) -> bool {
        self.recorder.as_ref().is_some_and(Recorder::is_recording)
    }

    /// Stop the stream. A recording in progress is aborted, not finished.
    pub fn close(&mut self) {
        if let Some(mut recorder) = self.recorder.take() {
            recorder.abort();
        }
        if self.stream.take().is_some() {
            tracing::info!(backend = self.backend.name(), "audio system closed");
        }
        self.sample_rate = 0;
    }
}

impl Drop for AudioSystem {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for AudioSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSystem")
            .field("backend", &self.backend.name())
            .field("open", &self.is_open())
            .field("sample_rate", &self.sample_rate)
            .field("recorder", &self.recorder)
            .finish_non_exhaustive()
    }
}

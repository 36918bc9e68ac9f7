//! End-to-end tests of the audio system on a mock backend.

use std::sync::Arc;

use hound::WavReader;
use parking_lot::Mutex;
use resono_config::{Options, RecordingFormat, get_factory_bindings, get_factory_instrument};
use resono_control::{ControlState, ControllerEvent, InstrumentSurface};
use resono_core::{LoopCommand, LoopOp, LoopTarget, SessionConfig, VOLUME_DENOM};
use resono_io::{
    AudioBackend, AudioDevice, AudioSystem, BackendStreamConfig, Error, ErrorCallback,
    OutputCallback, Result, StreamHandle,
};
use tempfile::TempDir;

type Slot = Arc<Mutex<Option<(BackendStreamConfig, OutputCallback)>>>;

/// Backend whose stream is pulled by the test instead of a driver.
struct MockBackend {
    rates: Vec<u32>,
    stream: Slot,
}

impl MockBackend {
    fn new(rates: &[u32]) -> (Self, Slot) {
        let stream: Slot = Arc::default();
        (
            Self {
                rates: rates.to_vec(),
                stream: Arc::clone(&stream),
            },
            stream,
        )
    }
}

impl AudioBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn list_output_devices(&self) -> Result<Vec<AudioDevice>> {
        Ok(vec![AudioDevice {
            name: "Mock Out".to_string(),
            default_sample_rate: 48000,
            channels: 1,
        }])
    }

    fn default_output_device(&self) -> Result<Option<AudioDevice>> {
        Ok(self.list_output_devices()?.into_iter().next())
    }

    fn probe_sample_rates(&self, _device: &str) -> Result<Vec<u32>> {
        Ok(self.rates.clone())
    }

    fn build_output_stream(
        &self,
        config: &BackendStreamConfig,
        callback: OutputCallback,
        _error_callback: ErrorCallback,
    ) -> Result<StreamHandle> {
        *self.stream.lock() = Some((config.clone(), callback));
        Ok(StreamHandle::new(()))
    }
}

fn pull(stream: &Slot, frames: usize) -> Vec<i32> {
    let mut buf = vec![0i32; frames];
    let mut guard = stream.lock();
    let (_, callback) = guard.as_mut().expect("stream not built");
    callback(&mut buf);
    buf
}

#[test]
fn test_open_negotiates_rate_and_latency() {
    let (backend, stream) = MockBackend::new(&[48000, 96000]);
    let mut system = AudioSystem::new(Box::new(backend));
    let options = Options {
        samplerate: 44100,
        target_latency: 0.005,
        ..Options::default()
    };
    let bell = get_factory_instrument("Bell").unwrap();
    let handle = system.open(&options, &bell, SessionConfig::default()).unwrap();

    assert!(system.is_open());
    assert_eq!(handle.sample_rate(), 48000);
    assert_eq!(system.sample_rate(), 48000);
    let guard = stream.lock();
    let (config, _) = guard.as_ref().unwrap();
    assert_eq!(config.sample_rate, 48000);
    assert_eq!(config.buffer_size, Some(240));
    assert_eq!(config.device_name, None);
}

#[test]
fn test_open_fails_without_usable_rate() {
    let (backend, _stream) = MockBackend::new(&[]);
    let mut system = AudioSystem::new(Box::new(backend));
    let bell = get_factory_instrument("Bell").unwrap();
    assert!(matches!(
        system.open(&Options::default(), &bell, SessionConfig::default()),
        Err(Error::UnsupportedSampleRate { .. })
    ));
    assert!(!system.is_open());
}

#[test]
fn test_bindings_drive_stream() {
    let (backend, stream) = MockBackend::new(&[44100]);
    let mut system = AudioSystem::new(Box::new(backend));
    let piano = get_factory_instrument("FM Piano").unwrap();
    let mut handle = system
        .open(&Options::default(), &piano, SessionConfig::default())
        .unwrap();
    let patch = piano.to_patch(handle.sample_rate()).unwrap();
    let bindings = get_factory_bindings("Keyboard").unwrap().to_bindings().unwrap();

    assert!(pull(&stream, 512).iter().all(|&s| s == 0));

    let mut state = ControlState::new();
    // 'n' is the root note
    let reacted = bindings.handle_event(0, &ControllerEvent::button(0, 17, 1.0), &mut state);
    assert_eq!(reacted, 1);
    state.apply(&mut handle, 1.0, &patch).unwrap();
    assert!(pull(&stream, 512).iter().any(|&s| s != 0));

    bindings.handle_event(0, &ControllerEvent::button(0, 17, 0.0), &mut state);
    state.apply(&mut handle, 1.0, &patch).unwrap();
    assert_eq!(state.pressed_count(), 0);
    handle.collect_garbage();
}

#[test]
fn test_recording_writes_wav() {
    let dir = TempDir::new().unwrap();
    let (backend, stream) = MockBackend::new(&[44100]);
    let mut system = AudioSystem::new(Box::new(backend));
    let options = Options {
        recording_format: RecordingFormat::Wav,
        recording_quality: 60,
        ..Options::default()
    };
    let sine = get_factory_instrument("Sine").unwrap();
    let mut handle = system.open(&options, &sine, SessionConfig::default()).unwrap();

    let path = system.start_recording(dir.path()).unwrap();
    assert!(system.is_recording());
    assert!(path.starts_with(dir.path()));
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("wav"));

    handle.press_voice(0, VOLUME_DENOM);
    let mut rendered = 0;
    for _ in 0..10 {
        rendered += pull(&stream, 441).len();
    }
    let written = system.stop_recording().unwrap();
    assert!(!system.is_recording());
    // a push that meets the worker draining the ring is dropped, not queued
    let overruns = system.recorder().unwrap().overruns();
    assert!(written <= rendered as u64);
    assert!(written + overruns * 441 >= rendered as u64);

    let reader = WavReader::open(&path).unwrap();
    assert_eq!(reader.spec().sample_rate, 44100);
    assert_eq!(reader.spec().bits_per_sample, 24);
    assert_eq!(u64::from(reader.len()), written);
}

#[test]
fn test_unsupported_recording_format() {
    let dir = TempDir::new().unwrap();
    let (backend, _stream) = MockBackend::new(&[44100]);
    let mut system = AudioSystem::new(Box::new(backend));
    let options = Options {
        recording_format: RecordingFormat::Flac,
        ..Options::default()
    };
    let sine = get_factory_instrument("Sine").unwrap();
    system.open(&options, &sine, SessionConfig::default()).unwrap();
    assert!(matches!(
        system.start_recording(dir.path()),
        Err(Error::UnsupportedFormat(_))
    ));
}

#[test]
fn test_recording_requires_open_stream() {
    let dir = TempDir::new().unwrap();
    let (backend, _stream) = MockBackend::new(&[44100]);
    let mut system = AudioSystem::new(Box::new(backend));
    assert!(matches!(
        system.start_recording(dir.path()),
        Err(Error::NotOpen)
    ));
    assert_eq!(system.stop_recording().unwrap(), 0);
}

#[test]
fn test_loop_playback_through_handle() {
    let (backend, stream) = MockBackend::new(&[44100]);
    let mut system = AudioSystem::new(Box::new(backend));
    let config = SessionConfig {
        bpm: 120.0,
        ..SessionConfig::default()
    };
    let sine = get_factory_instrument("Sine").unwrap();
    let mut handle = system.open(&Options::default(), &sine, config).unwrap();

    let record = LoopCommand {
        target: LoopTarget::Selected,
        op: LoopOp::Record,
        value: 1.0,
    };
    handle.loop_command(record);
    let id = handle.press_voice(0, VOLUME_DENOM);
    // one beat at 120 bpm
    for _ in 0..50 {
        pull(&stream, 441);
    }
    handle.release_voice(id);
    handle.loop_command(record);
    pull(&stream, 441);

    // the loop keeps sounding with no voice held
    let out = pull(&stream, 4410);
    assert!(out.iter().any(|&s| s != 0));
}

#[test]
fn test_close_stops_stream() {
    let (backend, _stream) = MockBackend::new(&[44100]);
    let mut system = AudioSystem::new(Box::new(backend));
    let sine = get_factory_instrument("Sine").unwrap();
    system.open(&Options::default(), &sine, SessionConfig::default()).unwrap();
    system.close();
    assert!(!system.is_open());
    assert_eq!(system.sample_rate(), 0);
    assert!(system.recorder().is_none());
}

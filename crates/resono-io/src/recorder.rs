//! Recording ring buffer and encoder worker.
//!
//! The audio thread pushes every rendered buffer through a [`RecorderTap`]
//! into a bounded ring guarded by a `parking_lot` mutex. It never blocks:
//! if the worker holds the lock or the ring is full the samples are
//! dropped and counted as an overrun. The worker wakes on a condition
//! variable and swaps the ring for an empty buffer of the same capacity, so
//! the lock is held only for the swap. Copying and encoding happen outside
//! it.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::encoder::SampleEncoder;
use crate::{Error, Result};

/// Samples handed to the encoder per write.
pub const ENCODE_BLOCK: usize = 4096;

/// Encoded samples kept before the worker's vector is compacted.
const COMPACT_AFTER: usize = 1 << 20;

/// Ring capacity in seconds of audio.
const RING_SECONDS: usize = 10;

struct Shared {
    ring: Mutex<VecDeque<i32>>,
    capacity: usize,
    ready: Condvar,
    record: AtomicBool,
    encode: AtomicBool,
    overruns: AtomicU64,
}

impl Shared {
    fn wake(&self) {
        let _ring = self.ring.lock();
        self.ready.notify_all();
    }
}

/// Audio-thread side of a [`Recorder`].
#[derive(Clone)]
pub struct RecorderTap {
    shared: Arc<Shared>,
}

impl RecorderTap {
    /// Queue a rendered buffer. Never blocks and never allocates.
    pub fn push(&self, samples: &[i32]) {
        let shared = &*self.shared;
        if !shared.record.load(Ordering::Acquire) {
            return;
        }
        let Some(mut ring) = shared.ring.try_lock() else {
            shared.overruns.fetch_add(1, Ordering::Relaxed);
            return;
        };
        let take = samples.len().min(shared.capacity - ring.len());
        ring.extend(&samples[..take]);
        drop(ring);
        if take < samples.len() {
            shared.overruns.fetch_add(1, Ordering::Relaxed);
        }
        shared.ready.notify_one();
    }

    /// Whether a recording is running.
    pub fn is_recording(&self) -> bool {
        self.shared.record.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for RecorderTap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecorderTap")
            .field("recording", &self.is_recording())
            .finish_non_exhaustive()
    }
}

/// Owner of the recording ring and encoder worker.
pub struct Recorder {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<Result<u64>>>,
    path: Option<PathBuf>,
}

impl Recorder {
    /// A recorder whose ring holds ten seconds at `sample_rate`.
    pub fn new(sample_rate: u32) -> Self {
        Self::with_capacity(RING_SECONDS * sample_rate.max(1) as usize)
    }

    /// A recorder whose ring holds `capacity` samples.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            shared: Arc::new(Shared {
                ring: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
                ready: Condvar::new(),
                record: AtomicBool::new(false),
                encode: AtomicBool::new(false),
                overruns: AtomicU64::new(0),
            }),
            worker: None,
            path: None,
        }
    }

    /// A tap for the audio thread.
    pub fn tap(&self) -> RecorderTap {
        RecorderTap {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Ring capacity in samples.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Whether a recording is running.
    pub fn is_recording(&self) -> bool {
        self.shared.record.load(Ordering::Acquire)
    }

    /// Buffers dropped because the ring was busy or full.
    pub fn overruns(&self) -> u64 {
        self.shared.overruns.load(Ordering::Relaxed)
    }

    /// Output path of the running or last recording.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Start encoding everything pushed through the taps into `encoder`.
    ///
    /// A recording already in progress is stopped first.
    pub fn start(&mut self, encoder: Box<dyn SampleEncoder>, path: Option<PathBuf>) -> Result<()> {
        if self.worker.is_some() {
            self.stop()?;
        }
        self.shared.ring.lock().clear();
        self.shared.overruns.store(0, Ordering::Relaxed);
        self.shared.encode.store(true, Ordering::Release);
        self.shared.record.store(true, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("resono-encoder".to_string())
            .spawn(move || encode_worker(&shared, encoder));
        match spawned {
            Ok(worker) => self.worker = Some(worker),
            Err(e) => {
                self.shared.record.store(false, Ordering::Release);
                self.shared.encode.store(false, Ordering::Release);
                return Err(Error::Io(e));
            }
        }
        tracing::info!(path = ?path, capacity = self.shared.capacity, "recording started");
        self.path = path;
        Ok(())
    }

    /// Stop recording, encode what is buffered and close the output.
    /// Returns the number of samples written.
    pub fn stop(&mut self) -> Result<u64> {
        let Some(worker) = self.worker.take() else {
            return Ok(0);
        };
        self.shared.record.store(false, Ordering::Release);
        self.shared.wake();
        let written = worker
            .join()
            .map_err(|_| Error::Stream("encoder worker panicked".to_string()))??;
        self.shared.encode.store(false, Ordering::Release);
        tracing::info!(
            samples = written,
            overruns = self.overruns(),
            path = ?self.path,
            "recording stopped"
        );
        Ok(written)
    }

    /// Stop recording and discard whatever is not yet encoded.
    pub fn abort(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.shared.encode.store(false, Ordering::Release);
        self.shared.record.store(false, Ordering::Release);
        self.shared.wake();
        if worker.join().is_err() {
            tracing::error!("encoder worker panicked");
        }
        tracing::info!(path = ?self.path, "recording aborted");
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.abort();
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("capacity", &self.shared.capacity)
            .field("recording", &self.is_recording())
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn encode_worker(shared: &Shared, encoder: Box<dyn SampleEncoder>) -> Result<u64> {
    let result = drain_into(shared, encoder);
    if let Err(e) = &result {
        tracing::error!(error = %e, "recording failed");
        shared.record.store(false, Ordering::Release);
    }
    result
}

fn drain_into(shared: &Shared, mut encoder: Box<dyn SampleEncoder>) -> Result<u64> {
    let mut pending: Vec<i32> = Vec::new();
    let mut spare: VecDeque<i32> = VecDeque::with_capacity(shared.capacity);
    let mut pos = 0;
    let mut written = 0u64;

    loop {
        let finishing = {
            let mut ring = shared.ring.lock();
            while ring.is_empty()
                && shared.record.load(Ordering::Acquire)
                && shared.encode.load(Ordering::Acquire)
            {
                shared.ready.wait(&mut ring);
            }
            if !shared.encode.load(Ordering::Acquire) {
                return Ok(written);
            }
            std::mem::swap(&mut *ring, &mut spare);
            !shared.record.load(Ordering::Acquire)
        };
        pending.extend(spare.drain(..));

        while pending.len() - pos >= ENCODE_BLOCK {
            encoder.write(&pending[pos..pos + ENCODE_BLOCK])?;
            pos += ENCODE_BLOCK;
            written += ENCODE_BLOCK as u64;
        }
        if pos >= COMPACT_AFTER {
            pending.drain(..pos);
            pos = 0;
        }

        if finishing {
            encoder.write(&pending[pos..])?;
            written += (pending.len() - pos) as u64;
            encoder.finish()?;
            return Ok(written);
        }
    }
}

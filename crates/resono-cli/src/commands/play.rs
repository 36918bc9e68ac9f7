//! Live playing command.
//!
//! Controller events arrive as text lines on stdin, so any input source can
//! drive the synth by printing `button <device> <index> <value>` or
//! `axis <device> <index> <value> [signed] [unlimited]`. Events are routed
//! through the bindings into a [`ControlState`] that is applied to the audio
//! engine at a fixed control rate.

use std::collections::BTreeSet;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Args;
use crossbeam_channel::{RecvTimeoutError, unbounded};
use resono_config::ensure_recordings_dir;
use resono_control::{ControlState, ControllerEvent};
use resono_io::AudioSystem;

use super::common::{LooperArgs, load_bindings, load_instrument, load_options};

/// Control updates per second.
const CONTROL_RATE: u32 = 100;

#[derive(Args)]
pub struct PlayArgs {
    /// Instrument name or path
    #[arg(short, long, default_value = "FM Piano")]
    instrument: String,

    /// Bindings name or path
    #[arg(short, long, default_value = "Keyboard")]
    bindings: String,

    /// Options file (default: the user options file)
    #[arg(long)]
    options: Option<PathBuf>,

    /// Audio system, overriding the options file
    #[arg(long)]
    system: Option<String>,

    /// Output device name or part of one, overriding the options file
    #[arg(long)]
    device: Option<String>,

    /// Preferred sample rate, overriding the options file
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Master volume in [0, 1]
    #[arg(long, default_value = "1.0")]
    volume: f64,

    /// Record the output into the recordings directory (or this directory)
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    record: Option<PathBuf>,

    /// Keep playing after stdin closes, until Ctrl+C
    #[arg(long)]
    hold: bool,

    #[command(flatten)]
    looper: LooperArgs,
}

pub fn run(args: PlayArgs) -> anyhow::Result<()> {
    let mut options = load_options(args.options.as_ref());
    if let Some(system) = args.system {
        options.system = system;
    }
    if let Some(device) = args.device {
        options.device = device;
    }
    if let Some(rate) = args.sample_rate {
        options.samplerate = rate;
    }

    let instrument = load_instrument(&args.instrument)?;
    let bindings = load_bindings(&args.bindings)?.to_bindings()?;

    let mut system = AudioSystem::from_options(&options)?;
    let mut handle = system.open(&options, &instrument, args.looper.session_config())?;
    let patch = instrument.to_patch(handle.sample_rate())?;
    bindings.validate(&patch)?;

    let device = if options.device.is_empty() {
        "default"
    } else {
        options.device.as_str()
    };
    println!("Playing '{}' with bindings '{}'", patch.name, bindings.name);
    println!("  Output: {}", device);
    println!("  Sample rate: {} Hz", handle.sample_rate());
    println!("  Tempo: {} bpm, {} loop(s)", args.looper.bpm, args.looper.loops);

    let recording = match &args.record {
        Some(dir) => {
            let dir = if dir.as_os_str().is_empty() {
                ensure_recordings_dir()?
            } else {
                dir.clone()
            };
            let path = system.start_recording(&dir)?;
            println!("  Recording: {}", path.display());
            Some(path)
        }
        None => None,
    };
    println!("\nReading controller events from stdin. Press Ctrl+C to stop...\n");

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let (tx, rx) = unbounded::<ControllerEvent>();
    std::thread::Builder::new()
        .name("resono-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                match line.parse::<ControllerEvent>() {
                    Ok(event) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "ignoring input line"),
                }
            }
        })?;

    let period = Duration::from_secs(1) / CONTROL_RATE;
    let mut state = ControlState::new();
    let mut devices = BTreeSet::new();
    let mut input_open = true;
    let mut last = Instant::now();
    let mut next_tick = last + period;

    while running.load(Ordering::SeqCst) {
        if input_open {
            let timeout = next_tick.saturating_duration_since(Instant::now());
            match rx.recv_timeout(timeout) {
                Ok(event) => {
                    devices.insert(event.device);
                    let reacted = bindings.handle_event(event.device, &event, &mut state);
                    tracing::trace!(?event, reacted, "controller event");
                    if Instant::now() < next_tick {
                        continue;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    input_open = false;
                    if !args.hold {
                        running.store(false, Ordering::SeqCst);
                    }
                }
            }
        } else {
            std::thread::sleep(next_tick.saturating_duration_since(Instant::now()));
        }

        let now = Instant::now();
        let dt = now.duration_since(last).as_secs_f64();
        last = now;
        next_tick = now + period;

        for &device in &devices {
            state.update(device, &bindings, dt);
        }
        state.apply(&mut handle, args.volume, &patch)?;
        handle.collect_garbage();
    }

    println!("\nStopping...");
    if let Some(path) = recording {
        let samples = system.stop_recording()?;
        let seconds = samples as f64 / f64::from(system.sample_rate().max(1));
        println!("Recorded {seconds:.1} s into {}", path.display());
    }
    if handle.deferred() > 0 {
        tracing::warn!(
            deferred = handle.deferred(),
            "parameter changes waited for a full engine queue"
        );
    }
    if handle.backlog() > 0 {
        tracing::warn!(backlog = handle.backlog(), "events still queued at shutdown");
    }
    system.close();

    println!("Done!");
    Ok(())
}

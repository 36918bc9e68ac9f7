//! Offline rendering command.
//!
//! Plays a note list or a timed controller script through the same control
//! layer as `play`, but into a [`Session`] rendered straight to a WAV file.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use resono_control::{ControlState, ControllerEvent, FullId};
use resono_core::{LoopCommand, LoopOp, LoopTarget, Session};
use resono_io::{SampleEncoder, WavEncoder};

use super::common::{LooperArgs, load_bindings, load_instrument};

/// Controller id used for notes given with `--notes`.
const NOTE_CONTROLLER: u32 = u32::MAX;

#[derive(Args)]
pub struct RenderArgs {
    /// Output WAV file
    output: PathBuf,

    /// Instrument name or path
    #[arg(short, long, default_value = "Sine")]
    instrument: String,

    /// Notes as `semitone:start:duration[:velocity]`, comma separated, times
    /// in seconds (e.g. "0:0:0.5,4:0.5:0.5,7:1:1")
    #[arg(short, long)]
    notes: Option<String>,

    /// Controller script: one `<seconds> <event>` per line, where the event is
    /// `button <device> <index> <value>` or `axis <device> <index> <value> [signed]`
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Bindings used to interpret the script
    #[arg(short, long, default_value = "Keyboard")]
    bindings: String,

    /// Record the first N beats into a loop that keeps playing afterwards
    #[arg(long)]
    loop_beats: Option<f64>,

    /// Total length in seconds (default: last cue plus --tail)
    #[arg(short, long)]
    duration: Option<f64>,

    /// Seconds rendered after the last cue
    #[arg(long, default_value = "1.0")]
    tail: f64,

    /// Sample rate
    #[arg(long, default_value = "48000")]
    sample_rate: u32,

    /// Bits per sample (16, 24 or 32)
    #[arg(long, default_value = "24")]
    bits: u16,

    /// Master volume in [0, 1]
    #[arg(long, default_value = "1.0")]
    volume: f64,

    /// Largest block rendered between control updates
    #[arg(long, default_value = "256")]
    block_size: usize,

    #[command(flatten)]
    looper: LooperArgs,
}

/// A note from `--notes`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    pub semitone: i32,
    pub start: f64,
    pub duration: f64,
    pub velocity: f64,
}

#[derive(Debug, Clone, Copy)]
enum Cue {
    Press { id: u32, semitone: i32, velocity: f64 },
    Release { id: u32 },
    Event(ControllerEvent),
    Loop(LoopCommand),
}

/// Parse a `--notes` list.
pub fn parse_notes(spec: &str) -> anyhow::Result<Vec<Note>> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|item| -> anyhow::Result<Note> {
            let fields: Vec<&str> = item.split(':').map(str::trim).collect();
            if !(3..=4).contains(&fields.len()) {
                anyhow::bail!(
                    "invalid note '{item}' (expected semitone:start:duration[:velocity])"
                );
            }
            let note = Note {
                semitone: fields[0]
                    .parse()
                    .with_context(|| format!("invalid semitone in '{item}'"))?,
                start: fields[1]
                    .parse()
                    .with_context(|| format!("invalid start in '{item}'"))?,
                duration: fields[2]
                    .parse()
                    .with_context(|| format!("invalid duration in '{item}'"))?,
                velocity: match fields.get(3) {
                    Some(v) => v
                        .parse()
                        .with_context(|| format!("invalid velocity in '{item}'"))?,
                    None => 1.0,
                },
            };
            if note.start < 0.0 || note.duration < 0.0 {
                anyhow::bail!("negative time in note '{item}'");
            }
            Ok(note)
        })
        .collect()
}

/// Parse a controller script into `(seconds, event)` pairs.
pub fn parse_script(text: &str) -> anyhow::Result<Vec<(f64, ControllerEvent)>> {
    text.lines()
        .enumerate()
        .map(|(n, line)| (n + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(n, line)| -> anyhow::Result<(f64, ControllerEvent)> {
            let (time, event) = line
                .split_once(char::is_whitespace)
                .with_context(|| format!("line {n}: expected '<seconds> <event>'"))?;
            let time: f64 = time
                .parse()
                .with_context(|| format!("line {n}: invalid time '{time}'"))?;
            if time < 0.0 {
                anyhow::bail!("line {n}: negative time");
            }
            let event: ControllerEvent = event.parse().with_context(|| format!("line {n}"))?;
            Ok((time, event))
        })
        .collect()
}

fn to_samples(seconds: f64, sample_rate: u32) -> u64 {
    (seconds * f64::from(sample_rate)).round().max(0.0) as u64
}

pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    if args.notes.is_none() && args.script.is_none() && args.loop_beats.is_none() {
        anyhow::bail!("nothing to render; use --notes, --script or --loop-beats");
    }
    let sr = args.sample_rate;
    let instrument = load_instrument(&args.instrument)?;
    let patch = instrument.to_patch(sr)?;

    let mut cues: Vec<(u64, Cue)> = Vec::new();
    if let Some(spec) = &args.notes {
        for (id, note) in parse_notes(spec)?.into_iter().enumerate() {
            let id = id as u32;
            cues.push((
                to_samples(note.start, sr),
                Cue::Press {
                    id,
                    semitone: note.semitone,
                    velocity: note.velocity,
                },
            ));
            cues.push((to_samples(note.start + note.duration, sr), Cue::Release { id }));
        }
    }

    let bindings = match &args.script {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            for (time, event) in parse_script(&text)? {
                cues.push((to_samples(time, sr), Cue::Event(event)));
            }
            let bindings = load_bindings(&args.bindings)?.to_bindings()?;
            bindings.validate(&patch)?;
            Some(bindings)
        }
        None => None,
    };

    if let Some(beats) = args.loop_beats {
        let record = Cue::Loop(LoopCommand {
            target: LoopTarget::Selected,
            op: LoopOp::Record,
            value: 1.0,
        });
        let end = to_samples(beats.max(0.0) * 60.0 / args.looper.bpm.max(1.0), sr);
        cues.push((0, record));
        cues.push((end, record));
    }
    cues.sort_by_key(|(t, _)| *t);

    let last = cues.last().map_or(0, |(t, _)| *t);
    let total = match args.duration {
        Some(seconds) => to_samples(seconds, sr),
        None => last + to_samples(args.tail, sr),
    };

    let mut session = Session::from_patch(&patch, sr, args.looper.session_config());
    let mut state = ControlState::new();
    let mut encoder = Box::new(WavEncoder::create(&args.output, sr, args.bits)?);

    println!(
        "Rendering '{}' at {} Hz, {:.2} s, {} cue(s)...",
        patch.name,
        sr,
        total as f64 / f64::from(sr),
        cues.len()
    );

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("##-"),
    );

    let block_size = args.block_size.max(1);
    let mut buf = vec![0i32; block_size];
    let mut devices = BTreeSet::new();
    let mut next_cue = 0;
    let mut t = 0u64;
    let mut peak = 0i64;
    let mut sum_sq = 0.0f64;

    while t < total {
        while let Some(&(at, cue)) = cues.get(next_cue) {
            if at > t {
                break;
            }
            next_cue += 1;
            match cue {
                Cue::Press {
                    id,
                    semitone,
                    velocity,
                } => state.press_key(FullId::new(NOTE_CONTROLLER, id), semitone, velocity),
                Cue::Release { id } => state.release_key(FullId::new(NOTE_CONTROLLER, id)),
                Cue::Event(event) => {
                    if let Some(bindings) = &bindings {
                        devices.insert(event.device);
                        bindings.handle_event(event.device, &event, &mut state);
                    }
                }
                Cue::Loop(command) => state.queue_loop(command),
            }
        }

        let until = cues.get(next_cue).map_or(total, |(at, _)| (*at).min(total));
        let n = (until - t).clamp(1, block_size as u64) as usize;
        if let Some(bindings) = &bindings {
            let dt = n as f64 / f64::from(sr);
            for &device in &devices {
                state.update(device, bindings, dt);
            }
        }
        state.apply(&mut session, args.volume, &patch)?;

        let block = &mut buf[..n];
        session.render(block);
        for &s in block.iter() {
            peak = peak.max(i64::from(s).abs());
            let x = f64::from(s) / f64::from(i32::MAX);
            sum_sq += x * x;
        }
        encoder.write(block)?;
        t += n as u64;
        pb.set_position(t);
    }

    encoder.finish()?;
    pb.finish_with_message("done");

    let rms = if total > 0 {
        (sum_sq / total as f64).sqrt()
    } else {
        0.0
    };
    let loops = session
        .looper()
        .slots()
        .iter()
        .filter(|s| s.length() > 0)
        .count();
    println!();
    println!("Output: {}", args.output.display());
    println!("  Peak: {:.3}", peak as f64 / f64::from(i32::MAX));
    println!("  RMS:  {rms:.3}");
    if args.loop_beats.is_some() {
        println!("  Loops recorded: {loops}");
    }
    tracing::info!(samples = total, path = %args.output.display(), "render finished");
    Ok(())
}

//! Integration tests for resono-cli.
//!
//! Each test runs the `resono` binary with an empty home directory so only
//! factory presets are visible.

use std::path::Path;
use std::process::{Command, Output};

use hound::WavReader;
use tempfile::TempDir;

fn resono_bin(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_resono"));
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("XDG_DATA_HOME", home.join(".local/share"))
        .env("RUST_LOG", "warn");
    cmd
}

fn run(home: &Path, args: &[&str]) -> Output {
    resono_bin(home)
        .args(args)
        .output()
        .expect("failed to run resono")
}

fn peak(path: &Path) -> i32 {
    let mut reader = WavReader::open(path).unwrap();
    reader
        .samples::<i32>()
        .map(|s| s.unwrap().saturating_abs())
        .max()
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// `resono presets`
// ---------------------------------------------------------------------------

#[test]
fn cli_presets_lists_factory_presets() {
    let home = TempDir::new().unwrap();
    let output = run(home.path(), &["presets", "list"]);
    assert!(output.status.success(), "resono presets list failed");

    let stdout = String::from_utf8_lossy(&output.stdout);
    for name in ["Sine", "FM Piano", "Bell", "Bass", "Keyboard"] {
        assert!(stdout.contains(name), "listing should contain '{name}'");
    }
}

#[test]
fn cli_presets_show_prints_json() {
    let home = TempDir::new().unwrap();
    let output = run(home.path(), &["presets", "show", "bell"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"name\": \"Bell\""));
    assert!(stdout.contains("\"oscillators\""));
}

#[test]
fn cli_presets_copy_then_find_user_copy() {
    let home = TempDir::new().unwrap();
    let output = run(home.path(), &["presets", "copy", "Bell", "--name", "My Bell"]);
    assert!(
        output.status.success(),
        "copy failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let again = run(home.path(), &["presets", "copy", "Bell", "--name", "My Bell"]);
    assert!(!again.status.success(), "copy without --force must not overwrite");

    let listing = run(home.path(), &["presets", "list", "--user"]);
    let stdout = String::from_utf8_lossy(&listing.stdout);
    assert!(stdout.contains("My Bell"));
    assert!(!stdout.contains("factory"));
}

#[test]
fn cli_presets_unknown_name_fails() {
    let home = TempDir::new().unwrap();
    let output = run(home.path(), &["presets", "show", "no such thing"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no such thing"));
}

// ---------------------------------------------------------------------------
// `resono render`
// ---------------------------------------------------------------------------

#[test]
fn cli_render_notes_writes_wav() {
    let home = TempDir::new().unwrap();
    let out = home.path().join("notes.wav");
    let output = run(
        home.path(),
        &[
            "render",
            out.to_str().unwrap(),
            "--instrument",
            "FM Piano",
            "--notes",
            "0:0:0.25,4:0.25:0.25,7:0.5:0.25",
            "--sample-rate",
            "44100",
            "--bits",
            "16",
            "--tail",
            "0.5",
        ],
    );
    assert!(
        output.status.success(),
        "render failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let reader = WavReader::open(&out).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 44100);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.channels, 1);
    // last release at 0.75 s plus the tail
    assert_eq!(reader.len(), 55125);
    assert!(peak(&out) > 0);
}

#[test]
fn cli_render_script_through_bindings() {
    let home = TempDir::new().unwrap();
    let script = home.path().join("script.txt");
    std::fs::write(
        &script,
        "# root note for a quarter second\n0.0 button 0 17 1\n0.25 button 0 17 0\n",
    )
    .unwrap();
    let out = home.path().join("script.wav");
    let output = run(
        home.path(),
        &[
            "render",
            out.to_str().unwrap(),
            "--script",
            script.to_str().unwrap(),
            "--duration",
            "0.5",
        ],
    );
    assert!(
        output.status.success(),
        "render failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let reader = WavReader::open(&out).unwrap();
    assert_eq!(reader.len(), 24000);
    assert!(peak(&out) > 0);
}

#[test]
fn cli_render_loop_keeps_playing() {
    let home = TempDir::new().unwrap();
    let out = home.path().join("loop.wav");
    let output = run(
        home.path(),
        &[
            "render",
            out.to_str().unwrap(),
            "--notes",
            "0:0:0.4",
            "--loop-beats",
            "1",
            "--bpm",
            "120",
            "--duration",
            "2.0",
            "--sample-rate",
            "48000",
        ],
    );
    assert!(
        output.status.success(),
        "render failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Loops recorded: 1"));

    // the note is long gone after 1.5 s; only the loop sounds
    let mut reader = WavReader::open(&out).unwrap();
    let late: Vec<i32> = reader
        .samples::<i32>()
        .skip(72000)
        .map(|s| s.unwrap())
        .collect();
    assert!(late.iter().any(|&s| s != 0));
}

#[test]
fn cli_render_without_cues_fails() {
    let home = TempDir::new().unwrap();
    let out = home.path().join("empty.wav");
    let output = run(home.path(), &["render", out.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(!out.exists());
}

#[test]
fn cli_render_rejects_bad_notes() {
    let home = TempDir::new().unwrap();
    let out = home.path().join("bad.wav");
    let output = run(
        home.path(),
        &["render", out.to_str().unwrap(), "--notes", "0:zero:1"],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid start"));
}

//! Integration tests for recall-cli.
//!
//! Tests run the built binary end to end.

use std::process::Command;

use recall_io::read_wav_info;

/// Helper to get the path to the `recall` binary built by cargo.
fn recall_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_recall"))
}

#[test]
fn cli_timing_prints_table() {
    let output = recall_bin()
        .args(["timing", "--samplerate", "44100", "--buffer-size", "512"])
        .args(["--bpm", "120", "--delay-factor", "0.25", "--rows", "4"])
        .output()
        .expect("failed to run recall timing");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Buffers per note offset: 10.766602"));
    assert!(stdout.contains("delay"));
    assert!(stdout.contains("attack"));
}

#[test]
fn cli_timing_json() {
    let output = recall_bin()
        .args(["timing", "--json", "--rows", "3"])
        .args(["--samplerate", "48000", "--buffer-size", "480", "--bpm", "150"])
        .output()
        .expect("failed to run recall timing --json");
    assert!(output.status.success());

    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("timing output is JSON");
    assert_eq!(report["samplerate"], 48000);
    assert_eq!(report["delay"].as_array().unwrap().len(), 3);
    assert_eq!(report["attack"][0], 0.0);
    let delay0 = report["delay"][0].as_f64().unwrap();
    assert!((delay0 - report["buffers_per_offset"].as_f64().unwrap()).abs() < 1e-12);
}

#[test]
fn cli_timing_rejects_zero_bpm() {
    let output = recall_bin()
        .args(["timing", "--bpm", "0"])
        .output()
        .expect("failed to run recall timing");
    assert!(!output.status.success());
}

#[test]
fn cli_render_writes_wav() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("tone.wav");
    let output = recall_bin()
        .arg("render")
        .arg(&out)
        .args(["--seconds", "0.1", "--format", "f32", "--samplerate", "44100"])
        .args(["--buffer-size", "512", "--channels", "2"])
        .output()
        .expect("failed to run recall render");
    assert!(
        output.status.success(),
        "render failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let info = read_wav_info(&out).unwrap();
    assert_eq!(info.channels, 2);
    assert_eq!(info.sample_rate, 44100);
    assert!(info.is_float);
    // 4410 frames of tone rounded up to whole buffers
    assert!(info.num_frames >= 4410);
    assert_eq!(info.num_frames % 512, 0);
}

#[test]
fn cli_render_rejects_missing_input() {
    let dir = tempfile::tempdir().unwrap();
    let output = recall_bin()
        .arg("render")
        .arg(dir.path().join("out.wav"))
        .arg("--input")
        .arg(dir.path().join("missing.wav"))
        .output()
        .expect("failed to run recall render");
    assert!(!output.status.success());
}

#[test]
fn cli_config_init_then_show() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.toml");

    let init = recall_bin()
        .arg("--config")
        .arg(&path)
        .args(["config", "init"])
        .output()
        .expect("failed to run recall config init");
    assert!(init.status.success());
    assert!(path.is_file());

    let again = recall_bin()
        .arg("--config")
        .arg(&path)
        .args(["config", "init"])
        .output()
        .expect("failed to run recall config init");
    assert!(!again.status.success(), "init must not overwrite");

    let show = recall_bin()
        .arg("--config")
        .arg(&path)
        .args(["config", "show"])
        .output()
        .expect("failed to run recall config show");
    assert!(show.status.success());
    let stdout = String::from_utf8_lossy(&show.stdout);
    assert!(stdout.contains("samplerate = 44100"));
    assert!(stdout.contains("format = \"s16\""));
}

#[test]
fn cli_config_path_honors_flag() {
    let output = recall_bin()
        .args(["--config", "/tmp/elsewhere.toml", "config", "path"])
        .output()
        .expect("failed to run recall config path");
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        "/tmp/elsewhere.toml"
    );
}

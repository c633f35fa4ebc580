//! Integration tests for the `echoform` binary.

use echoform_io::{AudioBuffer, decode_wav, write_wav_f32};
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn echoform_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_echoform"))
}

const SPEC: &str = r#"{
  "version": 1,
  "schemaId": "echoform.graph",
  "seed": 3,
  "assets": [{ "id": "tone", "kind": "sample", "src": "tone.wav" }],
  "nodes": [
    { "id": "player", "type": "player", "assetId": "tone" },
    { "id": "out", "type": "gain", "params": { "gain": 0.5 } },
    { "id": "hiss", "type": "noise" }
  ],
  "connections": [{ "from": "player", "to": "out" }]
}"#;

fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    let samples = (0..4000).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
    write_wav_f32(dir.path().join("tone.wav"), &AudioBuffer::new(vec![samples], 8000)).unwrap();
    std::fs::write(dir.path().join("graph.json"), SPEC).unwrap();
    dir
}

fn spec_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("graph.json")
}

#[test]
fn validate_accepts_good_spec() {
    let dir = fixture();
    let output = echoform_bin()
        .arg("validate")
        .arg(spec_path(&dir))
        .output()
        .expect("failed to run echoform validate");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ok (3 nodes"), "unexpected output: {stdout}");
}

#[test]
fn validate_rejects_unknown_type() {
    let dir = fixture();
    let bad = dir.path().join("bad.json");
    std::fs::write(&bad, SPEC.replace("\"noise\"", "\"reverb\"")).unwrap();
    let output = echoform_bin().arg("validate").arg(&bad).output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("reverb"), "unexpected error: {stderr}");
}

#[test]
fn hash_is_stable_and_node_scoped() {
    let dir = fixture();
    let run = |extra: &[&str]| {
        let output = echoform_bin()
            .arg("hash")
            .arg(spec_path(&dir))
            .args(extra)
            .output()
            .unwrap();
        assert!(output.status.success());
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    };
    let full = run(&[]);
    assert_eq!(full.len(), 64);
    assert_eq!(full, run(&[]));
    assert_ne!(full, run(&["--node", "out"]));
    assert_eq!(run(&["--fast"]).len(), 16);
}

#[test]
fn inspect_lists_sinks_and_chain() {
    let dir = fixture();
    let output = echoform_bin()
        .arg("inspect")
        .arg(spec_path(&dir))
        .args(["--node", "out"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Sinks: hiss, out"), "unexpected output: {stdout}");
    assert!(stdout.contains("Upstream of out:"));
    assert!(stdout.contains("playbackRate"));
}

#[test]
fn inspect_json_is_parseable() {
    let dir = fixture();
    let output = echoform_bin()
        .arg("inspect")
        .arg(spec_path(&dir))
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["nodes"].as_array().unwrap().len(), 3);
    assert_eq!(value["sinks"][0], "hiss");
}

fn render(dir: &Path, extra: &[&str]) -> std::process::Output {
    echoform_bin()
        .arg("render")
        .arg(dir.join("graph.json"))
        .arg("-o")
        .arg(dir.join("renders").join("out.wav"))
        .args(extra)
        .output()
        .unwrap()
}

#[test]
fn render_node_chain_to_wav() {
    let dir = fixture();
    let output = render(dir.path(), &["--node", "out"]);
    assert!(
        output.status.success(),
        "render failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let bytes = std::fs::read(dir.path().join("renders").join("out.wav")).unwrap();
    let decoded = decode_wav(&bytes).unwrap();
    assert_eq!(decoded.sample_rate(), 48_000);
    assert_eq!(decoded.channel_count(), 2);
    // 4000 frames at 8 kHz.
    assert_eq!(decoded.frames(), 24_000);
    assert!(decoded.peak() > 0.0);
}

#[test]
fn render_respects_duration_and_bit_depth() {
    let dir = fixture();
    let output = render(dir.path(), &["--duration", "1.5", "--bit-depth", "24"]);
    assert!(output.status.success());
    let bytes = std::fs::read(dir.path().join("renders").join("out.wav")).unwrap();
    let decoded = decode_wav(&bytes).unwrap();
    assert_eq!(decoded.frames(), 72_000);

    // Shorter than the asset: the asset length wins.
    let output = render(dir.path(), &["--duration", "0.25"]);
    assert!(output.status.success());
    let bytes = std::fs::read(dir.path().join("renders").join("out.wav")).unwrap();
    assert_eq!(decode_wav(&bytes).unwrap().frames(), 24_000);
}

#[test]
fn render_reports_budget_errors() {
    let dir = fixture();
    let config = dir.path().join("engine.toml");
    std::fs::write(&config, "[render]\nmax_samples = 1000\n").unwrap();
    let output = render(dir.path(), &["--config", config.to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn validate_warns_on_out_of_range_params() {
    let dir = fixture();
    let loud = dir.path().join("loud.json");
    std::fs::write(&loud, SPEC.replace("\"gain\": 0.5", "\"gain\": 9")).unwrap();

    let output = echoform_bin().arg("validate").arg(&loud).output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("warning: node 'out'"));

    let strict = echoform_bin()
        .args(["validate", "--strict"])
        .arg(&loud)
        .output()
        .unwrap();
    assert!(!strict.status.success());
}

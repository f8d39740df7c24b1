use assert_cmd::prelude::*;
use gsr_schemas::RawFrame;
use gsr_testkit::{write_raw_frames_json, RawStreamBuilder};
use predicates::prelude::*;
use std::path::Path;
use std::process::Command;

/// scenario_cli_correct_writes_timeline
///
/// # Invariants under test
/// - `gsr correct` suppresses a one-frame spike and writes the timeline JSON.
/// - The terminal flag freezes the session; later frames replay the snapshot.
/// - `--csv` writes one column per configured field in name order.
/// - `--exports` writes a run directory whose id depends only on the inputs.

const CONFIG: &str = r#"
session:
  game_version: "test"
reconcile:
  suspect_window: 3
  majority: 2
fields:
  - name: gold
    domain: { kind: non_negative_int }
    monotonicity: bounded_delta
    max_delta_per_frame: 1
  - name: game_over
    domain: { kind: flag }
    monotonicity: non_decreasing
    terminal_value: true
"#;

fn session_frames() -> Vec<RawFrame> {
    RawStreamBuilder::new()
        .ints("gold", &[Some(5), Some(5), Some(9), Some(5), Some(5), Some(6)])
        .flags(
            "game_over",
            &[Some(false), Some(false), Some(false), Some(false), Some(true), Some(true)],
        )
        .build()
}

fn write_inputs(dir: &Path) -> anyhow::Result<(String, String)> {
    let config = dir.join("session.yaml");
    std::fs::write(&config, CONFIG)?;
    let input = dir.join("raw.json");
    write_raw_frames_json(&input, &session_frames())?;
    Ok((
        config.to_string_lossy().to_string(),
        input.to_string_lossy().to_string(),
    ))
}

#[test]
fn correct_writes_reconciled_timeline_and_summary() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (config, input) = write_inputs(dir.path())?;
    let out = dir.path().join("timeline.json");
    let csv = dir.path().join("timeline.csv");

    let mut cmd = Command::cargo_bin("gsr")?;
    cmd.args([
        "correct",
        "--input",
        input.as_str(),
        "--config",
        config.as_str(),
        "--out",
        out.to_str().unwrap(),
        "--csv",
        csv.to_str().unwrap(),
    ]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("frames_in=6"))
        .stdout(predicate::str::contains("frames_out=6"))
        .stdout(predicate::str::contains("frozen_at=4"))
        .stdout(predicate::str::contains("discarded=1"));

    let timeline: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out)?)?;
    let frames = timeline.as_array().expect("timeline is a JSON array");
    assert_eq!(frames.len(), 6);

    let gold: Vec<i64> = frames
        .iter()
        .map(|s| s["fields"]["gold"].as_i64().unwrap())
        .collect();
    // The spike at frame 2 never shows; the 6 at frame 5 arrives after the freeze.
    assert_eq!(gold, vec![5, 5, 5, 5, 5, 5]);
    assert_eq!(frames[5]["fields"]["game_over"], serde_json::json!(true));
    assert_eq!(frames[5]["provenance"]["gold"], serde_json::json!("frozen"));

    let csv_text = std::fs::read_to_string(&csv)?;
    let header = csv_text.lines().next().unwrap();
    assert_eq!(header, "frame,timestamp,game_over,gold");
    assert_eq!(csv_text.lines().count(), 7);
    Ok(())
}

#[test]
fn frame_window_flags_limit_the_reconciled_range() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (config, input) = write_inputs(dir.path())?;
    let out = dir.path().join("timeline.json");

    let mut cmd = Command::cargo_bin("gsr")?;
    cmd.args([
        "correct",
        "--input",
        input.as_str(),
        "--config",
        config.as_str(),
        "--out",
        out.to_str().unwrap(),
        "--first-frame",
        "1",
        "--last-frame",
        "4",
    ]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("frames_in=3"))
        .stdout(predicate::str::contains("frozen_at=none"));

    let timeline: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out)?)?;
    let frames: Vec<u64> = timeline
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["frame"].as_u64().unwrap())
        .collect();
    assert_eq!(frames, vec![1, 2, 3]);
    Ok(())
}

#[test]
fn exports_are_keyed_by_config_and_input() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (config, input) = write_inputs(dir.path())?;
    let out = dir.path().join("timeline.json");
    let exports = dir.path().join("exports");

    let run = || -> anyhow::Result<String> {
        let output = Command::cargo_bin("gsr")?
            .args([
                "correct",
                "--input",
                input.as_str(),
                "--config",
                config.as_str(),
                "--out",
                out.to_str().unwrap(),
                "--exports",
                exports.to_str().unwrap(),
            ])
            .output()?;
        assert!(output.status.success());
        let stdout = String::from_utf8(output.stdout)?;
        let run_id = stdout
            .lines()
            .find_map(|l| l.strip_prefix("run_id="))
            .expect("run_id line")
            .to_string();
        Ok(run_id)
    };

    let first = run()?;
    let second = run()?;
    assert_eq!(first, second);

    let run_dir = exports.join(&first);
    for name in ["manifest.json", "timeline.json", "timeline.csv", "quality.json"] {
        assert!(run_dir.join(name).exists(), "missing {name}");
    }
    let manifest: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(run_dir.join("manifest.json"))?)?;
    assert_eq!(manifest["run_id"], serde_json::json!(first));
    assert_eq!(manifest["frames"], serde_json::json!(6));
    assert_eq!(manifest["frozen_at"], serde_json::json!(4));
    Ok(())
}

#[test]
fn unsupported_reading_is_rejected_and_counted() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = dir.path().join("session.yaml");
    std::fs::write(&config, CONFIG)?;
    let input = dir.path().join("raw.json");
    std::fs::write(
        &input,
        r#"[
  {"frame": 0, "timestamp": 0.0, "readings": {"gold": 5, "game_over": false}},
  {"frame": 1, "timestamp": 0.1, "readings": {"gold": 510.5, "game_over": false}},
  {"frame": 2, "timestamp": 0.2, "readings": {"gold": 6, "game_over": [0]}}
]"#,
    )?;
    let out = dir.path().join("timeline.json");

    Command::cargo_bin("gsr")?
        .args([
            "correct",
            "--input",
            input.to_str().unwrap(),
            "--config",
            config.to_str().unwrap(),
            "--out",
            out.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("frames_out=3"))
        .stdout(predicate::str::contains("discarded=2"));

    let timeline: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out)?)?;
    let gold: Vec<i64> = timeline
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["fields"]["gold"].as_i64().unwrap())
        .collect();
    assert_eq!(gold, vec![5, 5, 6]);
    assert_eq!(timeline[2]["fields"]["game_over"], serde_json::json!(false));
    Ok(())
}

//! scenario_run_artifacts_written
//!
//! Validates:
//! 1) exports/<run_id>/ holds timeline.json, timeline.csv, quality.json, manifest.json.
//! 2) run_id is a v5 UUID derived from config hash + input hash.
//! 3) timeline.csv has one stable column per field; unresolved cells are empty.
//! 4) timeline.json round-trips into the same Timeline.

use std::collections::BTreeMap;
use std::fs;

use gsr_artifacts::{derive_run_id, write_run_artifacts, RunManifest, WriteRunArtifactsArgs};
use gsr_schemas::{CorrectedState, FieldValue, Provenance, Timeline};
use gsr_timeline::QualityReport;

fn state(frame: u64, kills: Option<i64>, phase: &str) -> CorrectedState {
    let mut fields = BTreeMap::new();
    fields.insert("kills".to_string(), kills.map(FieldValue::Int));
    fields.insert("phase".to_string(), Some(FieldValue::Text(phase.to_string())));
    let mut provenance = BTreeMap::new();
    provenance.insert(
        "kills".to_string(),
        if kills.is_some() { Provenance::Observed } else { Provenance::Unresolved },
    );
    provenance.insert("phase".to_string(), Provenance::Observed);
    CorrectedState {
        frame,
        timestamp: frame as f64 / 10.0,
        fields,
        provenance,
    }
}

fn timeline() -> Timeline {
    let mut t = Timeline::new();
    assert!(t.append(state(0, None, "early")));
    assert!(t.append(state(3, Some(1), "early")));
    assert!(t.append(state(6, Some(2), "mid")));
    t
}

#[test]
fn artifacts_land_in_deterministic_run_dir() {
    let dir = tempfile::tempdir().unwrap();
    let timeline = timeline();
    let mut quality = QualityReport::new(["kills", "phase"]);
    quality.frames_in = 3;
    quality.frames_out = 3;

    let res = write_run_artifacts(WriteRunArtifactsArgs {
        exports_root: dir.path(),
        config_hash: "abc123",
        input_sha256: "def456",
        timeline: &timeline,
        quality: &quality,
    })
    .unwrap();

    assert_eq!(res.run_id, derive_run_id("abc123", "def456"));
    assert_eq!(res.run_dir, dir.path().join(res.run_id.to_string()));
    for name in ["timeline.json", "timeline.csv", "quality.json", "manifest.json"] {
        assert!(res.run_dir.join(name).is_file(), "missing {name}");
    }

    let manifest: RunManifest =
        serde_json::from_str(&fs::read_to_string(&res.manifest_path).unwrap()).unwrap();
    assert_eq!(manifest.schema_version, 1);
    assert_eq!(manifest.run_id, res.run_id);
    assert_eq!(manifest.config_hash, "abc123");
    assert_eq!(manifest.input_sha256, "def456");
    assert_eq!(manifest.frames, 3);
    assert_eq!(manifest.artifacts.timeline_csv, "timeline.csv");

    let csv = fs::read_to_string(res.run_dir.join("timeline.csv")).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "frame,timestamp,kills,phase");
    assert_eq!(lines[1], "0,0,,early");
    assert_eq!(lines[3], "6,0.6,2,mid");

    let back: Timeline =
        serde_json::from_str(&fs::read_to_string(res.run_dir.join("timeline.json")).unwrap()).unwrap();
    assert_eq!(back, timeline);

    let q: QualityReport =
        serde_json::from_str(&fs::read_to_string(res.run_dir.join("quality.json")).unwrap()).unwrap();
    assert_eq!(q, quality);
}

#[test]
fn rerun_overwrites_same_directory() {
    let dir = tempfile::tempdir().unwrap();
    let timeline = timeline();
    let quality = QualityReport::new(["kills", "phase"]);
    let args = || WriteRunArtifactsArgs {
        exports_root: dir.path(),
        config_hash: "abc123",
        input_sha256: "def456",
        timeline: &timeline,
        quality: &quality,
    };
    let a = write_run_artifacts(args()).unwrap();
    let b = write_run_artifacts(args()).unwrap();
    assert_eq!(a.run_dir, b.run_dir);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

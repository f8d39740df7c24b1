use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use gsr_schemas::{FieldValue, Timeline};
use gsr_timeline::QualityReport;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

pub const SCHEMA_VERSION: i32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: i32,
    pub run_id: Uuid,
    pub config_hash: String,
    pub input_sha256: String,
    pub frames: u64,
    pub frozen_at: Option<u64>,
    pub created_at_utc: DateTime<Utc>,
    pub artifacts: ArtifactList,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactList {
    pub manifest_json: String,
    pub timeline_json: String,
    pub timeline_csv: String,
    pub quality_json: String,
}

impl Default for ArtifactList {
    fn default() -> Self {
        Self {
            manifest_json: "manifest.json".to_string(),
            timeline_json: "timeline.json".to_string(),
            timeline_csv: "timeline.csv".to_string(),
            quality_json: "quality.json".to_string(),
        }
    }
}

/// Same config + same input => same run id.
pub fn derive_run_id(config_hash: &str, input_sha256: &str) -> Uuid {
    let name = format!("gsr-run:{config_hash}:{input_sha256}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

pub struct WriteRunArtifactsArgs<'a> {
    pub exports_root: &'a Path, // e.g. ./exports
    pub config_hash: &'a str,
    pub input_sha256: &'a str,
    pub timeline: &'a Timeline,
    pub quality: &'a QualityReport,
}

pub struct WriteRunArtifactsResult {
    pub run_id: Uuid,
    pub run_dir: PathBuf,
    pub manifest_path: PathBuf,
}

pub fn write_run_artifacts(args: WriteRunArtifactsArgs<'_>) -> Result<WriteRunArtifactsResult> {
    let run_id = derive_run_id(args.config_hash, args.input_sha256);

    // exports/<run_id>/
    let run_dir = args.exports_root.join(run_id.to_string());
    fs::create_dir_all(&run_dir).with_context(|| format!("create exports dir failed: {}", run_dir.display()))?;

    let artifacts = ArtifactList::default();
    write_timeline_json(&run_dir.join(&artifacts.timeline_json), args.timeline, true)?;
    write_timeline_csv(&run_dir.join(&artifacts.timeline_csv), args.timeline)?;
    write_json(&run_dir.join(&artifacts.quality_json), args.quality, true)?;

    // Overwrite is fine: a re-run with the same inputs lands in the same dir.
    let manifest = RunManifest {
        schema_version: SCHEMA_VERSION,
        run_id,
        config_hash: args.config_hash.to_string(),
        input_sha256: args.input_sha256.to_string(),
        frames: args.timeline.len() as u64,
        frozen_at: args.quality.frozen_at,
        created_at_utc: Utc::now(),
        artifacts,
    };
    let manifest_path = run_dir.join(&manifest.artifacts.manifest_json);
    write_json(&manifest_path, &manifest, true)?;

    info!(run_id = %run_id, run_dir = %run_dir.display(), "run artifacts written");
    Ok(WriteRunArtifactsResult {
        run_id,
        run_dir,
        manifest_path,
    })
}

pub fn write_timeline_json(path: &Path, timeline: &Timeline, pretty: bool) -> Result<()> {
    write_json(path, timeline, pretty)
}

pub fn write_timeline_csv(path: &Path, timeline: &Timeline) -> Result<()> {
    let file = fs::File::create(path).with_context(|| format!("create csv failed: {}", path.display()))?;
    timeline_to_csv(file, timeline).with_context(|| format!("write csv failed: {}", path.display()))
}

/// `frame,timestamp,<field>...` with one column per field in name order.
/// Unresolved values are empty cells.
pub fn timeline_to_csv<W: io::Write>(writer: W, timeline: &Timeline) -> Result<()> {
    let fields = timeline.field_names();
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = vec!["frame".to_string(), "timestamp".to_string()];
    header.extend(fields.iter().cloned());
    wtr.write_record(&header).context("write csv header failed")?;

    for state in timeline.frames() {
        let mut row = vec![state.frame.to_string(), state.timestamp.to_string()];
        row.extend(fields.iter().map(|f| state.value(f).map(FieldValue::to_string).unwrap_or_default()));
        wtr.write_record(&row)
            .with_context(|| format!("write csv row failed: frame {}", state.frame))?;
    }
    wtr.flush().context("flush csv failed")?;
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .with_context(|| format!("serialize failed: {}", path.display()))?;
    fs::write(path, format!("{json}\n")).with_context(|| format!("write failed: {}", path.display()))?;
    Ok(())
}

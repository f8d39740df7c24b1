//! `gsr correct` and `gsr quality`.
//!
//! Both read a raw stream, keep the frames inside the sampling window,
//! reconcile them against the configured field models and differ only in
//! what they write. A fatal reconciliation error aborts before anything is
//! written.

use anyhow::{Context, Result};
use gsr_artifacts::{write_run_artifacts, write_timeline_csv, write_timeline_json, WriteRunArtifactsArgs};
use gsr_capture::{CaptureSession, SamplingPlan};
use gsr_config::{ConfigMode, LoadedConfig};
use gsr_schemas::{RawFrame, Timeline};
use gsr_timeline::{assemble, QualityReport};
use std::path::Path;
use tracing::info;

use super::{build_models, load_config, load_raw_frames};

pub struct CorrectArgs {
    pub input: String,
    pub config_paths: Vec<String>,
    pub out: String,
    pub pretty: bool,
    pub csv: Option<String>,
    pub exports: Option<String>,
    pub first_frame: Option<u64>,
    pub last_frame: Option<i64>,
    pub strict_config: bool,
}

pub fn run_correct(args: CorrectArgs) -> Result<()> {
    let loaded = load_config(&args.config_paths, ConfigMode::Correct, args.strict_config)?;
    log_session(&loaded)?;
    let models = build_models(&loaded)?;
    let plan = sampling_window(&loaded, args.first_frame, args.last_frame)?;

    let (frames, input_sha256) = load_raw_frames(&args.input)?;
    let windowed = in_window(&frames, &plan);
    let (timeline, quality) =
        assemble(models, windowed).with_context(|| format!("reconcile failed: {}", args.input))?;

    write_timeline_json(Path::new(&args.out), &timeline, args.pretty)?;
    if let Some(csv) = &args.csv {
        write_timeline_csv(Path::new(csv), &timeline)?;
    }

    print_summary(&loaded.config_hash, &input_sha256, &timeline, &quality);
    println!("out={}", args.out);
    if let Some(csv) = &args.csv {
        println!("csv={}", csv);
    }

    if let Some(root) = &args.exports {
        let res = write_run_artifacts(WriteRunArtifactsArgs {
            exports_root: Path::new(root),
            config_hash: &loaded.config_hash,
            input_sha256: &input_sha256,
            timeline: &timeline,
            quality: &quality,
        })?;
        println!("run_id={}", res.run_id);
        println!("run_dir={}", res.run_dir.display());
        println!("manifest={}", res.manifest_path.display());
    }

    Ok(())
}

pub struct QualityArgs {
    pub input: String,
    pub config_paths: Vec<String>,
    pub json: bool,
    pub first_frame: Option<u64>,
    pub last_frame: Option<i64>,
    pub strict_config: bool,
}

pub fn run_quality(args: QualityArgs) -> Result<()> {
    let loaded = load_config(&args.config_paths, ConfigMode::Quality, args.strict_config)?;
    log_session(&loaded)?;
    let models = build_models(&loaded)?;
    let plan = sampling_window(&loaded, args.first_frame, args.last_frame)?;

    let (frames, _input_sha256) = load_raw_frames(&args.input)?;
    let windowed = in_window(&frames, &plan);
    let (_timeline, quality) =
        assemble(models, windowed).with_context(|| format!("reconcile failed: {}", args.input))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&quality)?);
    } else {
        print!("{}", quality);
    }
    Ok(())
}

/// `/sampling` window with the command-line overrides applied. A negative
/// `last_frame` means "no limit".
fn sampling_window(loaded: &LoadedConfig, first_frame: Option<u64>, last_frame: Option<i64>) -> Result<SamplingPlan> {
    let mut plan = SamplingPlan::from_config_json(&loaded.config_json)
        .map_err(|e| anyhow::anyhow!("CONFIG_INVALID: {e}"))?;
    if let Some(first) = first_frame {
        plan.first_frame = first;
    }
    if let Some(last) = last_frame {
        plan.last_frame = u64::try_from(last).ok();
    }
    plan.validate()?;
    Ok(plan)
}

fn in_window<'a>(frames: &'a [RawFrame], plan: &SamplingPlan) -> Vec<&'a RawFrame> {
    let windowed: Vec<&RawFrame> = frames.iter().filter(|f| plan.contains(f.frame)).collect();
    info!(
        frames_read = frames.len(),
        frames_in_window = windowed.len(),
        first_frame = plan.first_frame,
        last_frame = ?plan.last_frame,
        "raw stream loaded"
    );
    windowed
}

fn log_session(loaded: &LoadedConfig) -> Result<()> {
    let session = CaptureSession::from_config_json(&loaded.config_json)
        .map_err(|e| anyhow::anyhow!("CONFIG_INVALID: {e}"))?;
    info!(
        game_version = %session.game_version,
        participant = ?session.participant,
        config_hash = %loaded.config_hash,
        "config loaded"
    );
    Ok(())
}

fn print_summary(config_hash: &str, input_sha256: &str, timeline: &Timeline, quality: &QualityReport) {
    println!("config_hash={}", config_hash);
    println!("input_sha256={}", input_sha256);
    println!("frames_in={}", quality.frames_in);
    println!("frames_out={}", timeline.len());
    match quality.frozen_at {
        Some(f) => println!("frozen_at={}", f),
        None => println!("frozen_at=none"),
    }
    println!("discarded={}", quality.total_discarded());
}

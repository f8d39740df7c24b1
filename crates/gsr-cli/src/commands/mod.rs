//! Command handler modules for gsr-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod correct;
pub mod sample_plan;

use anyhow::{Context, Result};
use gsr_config::{report_unused_keys, ConfigMode, LoadedConfig, UnusedKeyPolicy};
use gsr_reconcile::{FieldModelSet, ReconcileConfig};
use gsr_schemas::RawFrame;
use std::fs;
use tracing::warn;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Load layered config and report keys this mode never reads.
pub fn load_config(config_paths: &[String], mode: ConfigMode, strict: bool) -> Result<LoadedConfig> {
    let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = gsr_config::load_layered_yaml(&path_refs)?;

    let policy = if strict {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let report = report_unused_keys(mode, &loaded.config_json, policy)?;
    if !report.is_clean() {
        warn!(
            mode = mode.as_str(),
            unused_leaf_keys = report.unused_leaf_pointers.len(),
            "CONFIG_UNUSED_KEYS"
        );
        for p in report.unused_leaf_pointers.iter().take(50) {
            warn!(unused = %p, "CONFIG_UNUSED_KEYS");
        }
        let extra = report.unused_leaf_pointers.len().saturating_sub(50);
        if extra > 0 {
            warn!("CONFIG_UNUSED_KEYS ... and {} more", extra);
        }
    }
    Ok(loaded)
}

/// Typed field models out of the merged config.
pub fn build_models(loaded: &LoadedConfig) -> Result<FieldModelSet> {
    let cfg = ReconcileConfig::from_config_json(&loaded.config_json)
        .map_err(|e| anyhow::anyhow!("CONFIG_INVALID: {e}"))?;
    FieldModelSet::from_config(&cfg).map_err(|e| anyhow::anyhow!("CONFIG_INVALID: {e}"))
}

/// Read a raw stream file. Returns the frames and the SHA-256 of the bytes.
pub fn load_raw_frames(path: &str) -> Result<(Vec<RawFrame>, String)> {
    let bytes = fs::read(path).with_context(|| format!("read input failed: {}", path))?;
    let input_sha256 = gsr_config::sha256_hex(&bytes);
    let body = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(&bytes);
    let frames: Vec<RawFrame> = serde_json::from_slice(body)
        .with_context(|| format!("input must be a JSON array of raw frame records: {}", path))?;
    Ok((frames, input_sha256))
}

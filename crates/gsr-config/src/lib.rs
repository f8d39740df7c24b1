//! gsr-config
//!
//! Layered YAML configuration: documents are deep-merged in order (later
//! documents override earlier ones), converted to JSON, canonicalized and
//! hashed. Typed interpretation is left to the consuming crate
//! (`gsr_reconcile::ReconcileConfig::from_config_json`).

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;

/// Which command is consuming the config. Each mode reads a different set of
/// keys; anything outside that set is reported as unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigMode {
    /// `gsr correct`: full reconciliation run with artifact export.
    Correct,
    /// `gsr quality`: reconciliation without export.
    Quality,
}

impl ConfigMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigMode::Correct => "CORRECT",
            ConfigMode::Quality => "QUALITY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    pub mode: String,
    /// Consumed JSON-pointer prefixes used for this analysis (sorted, unique)
    pub consumed_prefixes: Vec<String>,
    /// Unused leaf pointers (sorted)
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Registry of consumed JSON-pointer prefixes per mode.
///
/// Only list pointers the code actually reads in that mode.
pub fn consumed_pointers_for_mode(mode: ConfigMode) -> &'static [&'static str] {
    match mode {
        // Both commands reconcile the same windowed stream and differ only in
        // what they write.
        //
        // gsr-reconcile::ReconcileConfig::from_config_json
        //     /fields, /reconcile
        // gsr-capture::SamplingPlan::from_config_json
        //     /sampling/first_frame        (frame window)
        //     /sampling/last_frame
        //     /sampling/frames_per_sec     (validated)
        // gsr-capture::CaptureSession::from_config_json
        //     /session/game_version        (log line)
        //     /session/participant
        //
        // /sampling/parallel_regions is read only when driving capture.
        ConfigMode::Correct | ConfigMode::Quality => &[
            "/fields",
            "/reconcile",
            "/session/game_version",
            "/session/participant",
            "/sampling/first_frame",
            "/sampling/last_frame",
            "/sampling/frames_per_sec",
        ],
    }
}

/// Produce an unused-key report for a given mode.
/// If `policy == Fail`, returns an error when unused keys exist.
/// If `policy == Warn`, always returns Ok(report).
pub fn report_unused_keys(
    mode: ConfigMode,
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeyReport> {
    let mut consumed: BTreeSet<String> = BTreeSet::new();
    for p in consumed_pointers_for_mode(mode) {
        consumed.insert(normalize_pointer(p));
    }
    let consumed_prefixes: Vec<String> = consumed.iter().cloned().collect();

    let mut leaves: Vec<String> = Vec::new();
    collect_leaf_pointers(config_json, "", &mut leaves);

    let mut unused: Vec<String> = Vec::new();
    'leaf: for lp in leaves {
        for cp in &consumed_prefixes {
            if is_prefix_pointer(cp, &lp) {
                continue 'leaf;
            }
        }
        unused.push(lp);
    }

    unused.sort();
    unused.dedup();

    let report = UnusedKeyReport {
        mode: mode.as_str().to_string(),
        consumed_prefixes,
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        bail!(
            "CONFIG_UNUSED_KEYS (mode={}): {} unused config leaf key(s) detected. \
            Remove them or update the consumed registry. First few: {}",
            report.mode,
            report.unused_leaf_pointers.len(),
            preview_list(&report.unused_leaf_pointers, 12)
        );
    }

    Ok(report)
}

/// Normalize JSON pointer:
/// - must begin with "/"
/// - no trailing "/" unless it's just "/"
fn normalize_pointer(p: &str) -> String {
    let mut s = p.trim().to_string();
    if s.is_empty() {
        return "/".to_string();
    }
    if !s.starts_with('/') {
        s.insert(0, '/');
    }
    while s.ends_with('/') && s.len() > 1 {
        s.pop();
    }
    s
}

/// Return true if `prefix` is a JSON-pointer prefix of `leaf`.
///
/// - prefix "/" consumes everything
/// - exact match consumes
/// - "/a/b" consumes "/a/b/c" but NOT "/a/bc"
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    if leaf == prefix {
        return true;
    }
    if leaf.starts_with(prefix) {
        return leaf
            .get(prefix.len()..prefix.len() + 1)
            .map(|c| c == "/")
            .unwrap_or(false);
    }
    false
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{}/{}", prefix, i);
                collect_leaf_pointers(vv, &next, out);
            }
        }
        _ => {
            let p = if prefix.is_empty() {
                "/".to_string()
            } else {
                prefix.to_string()
            };
            out.push(p);
        }
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

fn preview_list(items: &[String], n: usize) -> String {
    let take = items.iter().take(n).cloned().collect::<Vec<_>>();
    format!("{:?}", take)
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Read an optional integer at a JSON pointer (`/sampling/first_frame`).
    pub fn i64_at(&self, pointer: &str) -> Option<i64> {
        self.config_json.pointer(pointer).and_then(Value::as_i64)
    }

    /// Read an optional string at a JSON pointer.
    pub fn str_at(&self, pointer: &str) -> Option<&str> {
        self.config_json.pointer(pointer).and_then(Value::as_str)
    }
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    // Earlier docs are base, later docs override.
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Objects merge key by key; anything else (arrays included) is replaced
/// wholesale by the overriding document.
fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn canonicalize_json(v: &Value) -> Result<String> {
    // serde_json's default Map is ordered by key, so the compact rendering is
    // stable regardless of key order in the source YAML.
    let s = serde_json::to_string(v).context("canonical json serialize failed")?;
    Ok(s)
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let out = hasher.finalize();
    hex::encode(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_pointer_respects_token_boundary() {
        assert!(is_prefix_pointer("/fields", "/fields/0/name"));
        assert!(is_prefix_pointer("/fields", "/fields"));
        assert!(!is_prefix_pointer("/fields", "/fieldset/x"));
        assert!(is_prefix_pointer("/", "/anything"));
    }

    #[test]
    fn normalize_pointer_adds_slash_and_trims() {
        assert_eq!(normalize_pointer("reconcile/"), "/reconcile");
        assert_eq!(normalize_pointer(""), "/");
        assert_eq!(normalize_pointer("///"), "/");
    }

    #[test]
    fn arrays_are_replaced_not_merged() {
        let base = r#"
fields:
  - name: gold
  - name: kills
"#;
        let overlay = r#"
fields:
  - name: cs
"#;
        let loaded = load_layered_yaml_from_strings(&[base, overlay]).unwrap();
        let fields = loaded.config_json["fields"].as_array().unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0]["name"], "cs");
    }

    #[test]
    fn pointer_accessors_read_typed_values() {
        let loaded = load_layered_yaml_from_strings(&[r#"
session:
  game_version: "6.10"
sampling:
  first_frame: 120
"#])
        .unwrap();
        assert_eq!(loaded.str_at("/session/game_version"), Some("6.10"));
        assert_eq!(loaded.i64_at("/sampling/first_frame"), Some(120));
        assert_eq!(loaded.i64_at("/sampling/last_frame"), None);
    }
}

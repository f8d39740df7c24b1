//! gsr-schemas
//!
//! Wire types shared by every stage of the pipeline: raw per-frame readings
//! coming out of recognition, corrected per-frame state, and the final
//! timeline. Serde only; no behavior beyond accessors and ordering checks.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Sampled frame index in the source video. Strictly increasing in a stream,
/// not necessarily contiguous.
pub type FrameIndex = u64;

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A recognized field value.
///
/// Serialized as the bare JSON scalar: `true`, `42`, `"late"`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Int(i64),
    Text(String),
    /// Any other JSON a recognizer emitted (a float, an out-of-range
    /// integer, an array or object), kept as its JSON text. No value domain
    /// accepts it, so it is rejected like any other misread.
    Unsupported(String),
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Bool(b) => FieldValue::Flag(b),
            Value::String(s) => FieldValue::Text(s),
            Value::Number(n) => match n.as_i64() {
                Some(v) => FieldValue::Int(v),
                None => FieldValue::Unsupported(n.to_string()),
            },
            other => FieldValue::Unsupported(other.to_string()),
        })
    }
}

impl FieldValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            FieldValue::Flag(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Flag(v) => write!(f, "{v}"),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Text(v) => write!(f, "{v}"),
            FieldValue::Unsupported(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Flag(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

// ---------------------------------------------------------------------------
// Raw input
// ---------------------------------------------------------------------------

/// One raw state record per sampled frame, as produced by the recognizer.
///
/// A `None` reading (JSON `null`) and a missing key both mean ABSENT.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    pub frame: FrameIndex,
    /// Seconds from the start of the video.
    pub timestamp: f64,
    #[serde(default)]
    pub readings: BTreeMap<String, Option<FieldValue>>,
    /// Optional recognizer confidence per field, in `[0, 1]`.
    ///
    /// A non-numeric entry reads as `NaN`, which never clears a confidence
    /// floor.
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "lenient_confidence"
    )]
    pub confidence: BTreeMap<String, f32>,
}

fn lenient_confidence<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeMap<String, f32>, D::Error> {
    let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(field, v)| (field, v.as_f64().map_or(f32::NAN, |c| c as f32)))
        .collect())
}

impl RawFrame {
    pub fn new(frame: FrameIndex, timestamp: f64) -> Self {
        Self {
            frame,
            timestamp,
            readings: BTreeMap::new(),
            confidence: BTreeMap::new(),
        }
    }

    /// Builder-style helper used by fixtures and the sampler.
    pub fn with_reading<S: Into<String>>(mut self, field: S, value: Option<FieldValue>) -> Self {
        self.readings.insert(field.into(), value);
        self
    }

    pub fn with_confidence<S: Into<String>>(mut self, field: S, confidence: f32) -> Self {
        self.confidence.insert(field.into(), confidence);
        self
    }

    /// The ephemeral per-field view of this record.
    pub fn reading(&self, field: &str) -> RawFieldReading {
        RawFieldReading {
            frame: self.frame,
            field: field.to_string(),
            value: self.readings.get(field).cloned().flatten(),
            confidence: self.confidence.get(field).copied(),
        }
    }

    /// Field names present in this record (absent-valued ones included).
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.readings.keys().map(|k| k.as_str())
    }
}

/// One field's recognized value (or absence) for one sampled frame.
#[derive(Clone, Debug, PartialEq)]
pub struct RawFieldReading {
    pub frame: FrameIndex,
    pub field: String,
    pub value: Option<FieldValue>,
    pub confidence: Option<f32>,
}

impl RawFieldReading {
    pub fn is_absent(&self) -> bool {
        self.value.is_none()
    }
}

// ---------------------------------------------------------------------------
// Corrected output
// ---------------------------------------------------------------------------

/// Where a corrected value came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// A reading was accepted at this frame.
    Observed,
    /// No acceptable reading; the last accepted value is carried forward.
    Held,
    /// Rewritten after the fact by a corroborated correction.
    Revised,
    /// Replayed from the terminal snapshot.
    Frozen,
    /// Nothing has been accepted for this field yet.
    Unresolved,
}

/// One whole-frame corrected record.
///
/// `fields` carries every configured field, so keys are stable across a
/// timeline; `None` means unresolved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrectedState {
    pub frame: FrameIndex,
    pub timestamp: f64,
    pub fields: BTreeMap<String, Option<FieldValue>>,
    #[serde(default)]
    pub provenance: BTreeMap<String, Provenance>,
}

impl CorrectedState {
    pub fn value(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field).and_then(|v| v.as_ref())
    }

    /// Re-read this corrected record as if it were raw recognizer output.
    pub fn to_raw(&self) -> RawFrame {
        RawFrame {
            frame: self.frame,
            timestamp: self.timestamp,
            readings: self.fields.clone(),
            confidence: BTreeMap::new(),
        }
    }
}

/// Ordered, append-only sequence of corrected states.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timeline {
    frames: Vec<CorrectedState>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a closed state. Returns `false` (and drops the state) when its
    /// frame index does not advance past the last appended one.
    pub fn append(&mut self, state: CorrectedState) -> bool {
        if let Some(last) = self.frames.last() {
            if state.frame <= last.frame {
                return false;
            }
        }
        self.frames.push(state);
        true
    }

    pub fn frames(&self) -> &[CorrectedState] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, frame: FrameIndex) -> Option<&CorrectedState> {
        self.frames
            .binary_search_by_key(&frame, |s| s.frame)
            .ok()
            .map(|i| &self.frames[i])
    }

    /// Values of one field in frame order.
    pub fn series(&self, field: &str) -> Vec<Option<FieldValue>> {
        self.frames
            .iter()
            .map(|s| s.fields.get(field).cloned().flatten())
            .collect()
    }

    /// Field names in stable order (taken from the first frame).
    pub fn field_names(&self) -> Vec<String> {
        self.frames
            .first()
            .map(|s| s.fields.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn into_frames(self) -> Vec<CorrectedState> {
        self.frames
    }

    /// The timeline as a raw stream, for re-running reconciliation on it.
    pub fn to_raw_frames(&self) -> Vec<RawFrame> {
        self.frames.iter().map(CorrectedState::to_raw).collect()
    }
}

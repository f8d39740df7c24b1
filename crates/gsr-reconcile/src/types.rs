use gsr_schemas::{FieldValue, FrameIndex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Configuration (as written in YAML)
// ---------------------------------------------------------------------------

/// The set of values a field may legally take.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueDomain {
    /// Scores, gold, creep score.
    NonNegativeInt,
    /// Integers within `[min, max]` (level, tower count).
    BoundedInt { min: i64, max: i64 },
    /// Labels ordered by declaration (game phase, map side).
    Enumerated { values: Vec<String> },
    /// Game clock in whole seconds; accepts `MM:SS` and `H:MM:SS` text.
    Timer,
    Flag,
    /// Free text with no ordering.
    Text,
}

/// Monotonicity class as written in config. Delta bounds are a separate key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonotonicityKind {
    #[default]
    None,
    NonDecreasing,
    BoundedDelta,
}

/// One `fields:` entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    pub name: String,
    pub domain: ValueDomain,
    #[serde(default)]
    pub monotonicity: MonotonicityKind,
    #[serde(default)]
    pub max_delta_per_frame: Option<i64>,
    #[serde(default)]
    pub suspect_window: Option<usize>,
    #[serde(default)]
    pub majority: Option<usize>,
    #[serde(default)]
    pub max_sampling_gap: Option<u64>,
    #[serde(default)]
    pub min_confidence: Option<f32>,
    /// Accepting this value ends the session.
    #[serde(default)]
    pub terminal_value: Option<FieldValue>,
}

/// `reconcile:` section; per-field keys override these.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcileDefaults {
    #[serde(default = "default_suspect_window")]
    pub suspect_window: usize,
    /// Defaults to a simple majority of the window.
    #[serde(default)]
    pub majority: Option<usize>,
    #[serde(default = "default_max_sampling_gap")]
    pub max_sampling_gap: u64,
}

pub const DEFAULT_SUSPECT_WINDOW: usize = 3;
pub const DEFAULT_MAX_SAMPLING_GAP: u64 = 300;

fn default_suspect_window() -> usize {
    DEFAULT_SUSPECT_WINDOW
}

fn default_max_sampling_gap() -> u64 {
    DEFAULT_MAX_SAMPLING_GAP
}

impl Default for ReconcileDefaults {
    fn default() -> Self {
        Self {
            suspect_window: DEFAULT_SUSPECT_WINDOW,
            majority: None,
            max_sampling_gap: DEFAULT_MAX_SAMPLING_GAP,
        }
    }
}

/// Simple majority of a window of `k` readings.
pub fn simple_majority(window: usize) -> usize {
    window / 2 + 1
}

/// Typed view of the `reconcile` and `fields` config sections.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default)]
    pub reconcile: ReconcileDefaults,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl ReconcileConfig {
    /// Read `/reconcile` and `/fields` out of a merged config document.
    /// Other top-level sections are ignored here.
    pub fn from_config_json(config_json: &Value) -> Result<Self, ConfigurationError> {
        let reconcile = match config_json.pointer("/reconcile") {
            Some(v) if !v.is_null() => serde_json::from_value(v.clone())
                .map_err(|e| ConfigurationError::Malformed(format!("/reconcile: {e}")))?,
            _ => ReconcileDefaults::default(),
        };
        let fields = match config_json.pointer("/fields") {
            Some(v) if !v.is_null() => serde_json::from_value(v.clone())
                .map_err(|e| ConfigurationError::Malformed(format!("/fields: {e}")))?,
            _ => Vec::new(),
        };
        Ok(Self { reconcile, fields })
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Verdict of a FieldModel on one candidate reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    /// Respects monotonicity and delta rules.
    Accept,
    /// Violates a hard invariant; discard outright.
    Reject,
    /// Implausible but possible; hold pending corroboration.
    Suspect,
}

// ---------------------------------------------------------------------------
// Step output
// ---------------------------------------------------------------------------

/// What happened to one field's reading on one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingOutcome {
    /// Accepted on its own merits.
    Accepted,
    /// Accepted because buffered suspects agreed on it.
    Confirmed,
    Absent,
    LowConfidence,
    Rejected,
    Suspect,
}

impl ReadingOutcome {
    /// `true` when belief moved to the reading at this frame.
    pub fn is_accepted(&self) -> bool {
        matches!(self, ReadingOutcome::Accepted | ReadingOutcome::Confirmed)
    }
}

/// The emitted value of one field for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldStep {
    /// `None` while nothing has ever been accepted for the field.
    pub value: Option<FieldValue>,
    pub outcome: ReadingOutcome,
}

/// Retroactive correction of already-emitted frames for one field.
#[derive(Clone, Debug, PartialEq)]
pub struct Revision {
    pub field: String,
    /// First frame to rewrite (the earliest corroborated suspect).
    pub from_frame: FrameIndex,
    /// Last frame to rewrite, inclusive (the frame processed before this one).
    pub through_frame: FrameIndex,
    pub value: FieldValue,
}

impl Revision {
    pub fn covers(&self, frame: FrameIndex) -> bool {
        frame >= self.from_frame && frame <= self.through_frame
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    Rejected,
    /// Fell out of the suspect window without corroboration.
    SuspectExpired,
    /// Outvoted, or made moot by a later accepted reading.
    SuspectSuperseded,
    LowConfidence,
}

impl DiscardReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscardReason::Rejected => "rejected",
            DiscardReason::SuspectExpired => "suspect_expired",
            DiscardReason::SuspectSuperseded => "suspect_superseded",
            DiscardReason::LowConfidence => "low_confidence",
        }
    }
}

/// A reading that will never influence the timeline. Counted, never fatal.
#[derive(Clone, Debug, PartialEq)]
pub struct ReadingDiscarded {
    pub field: String,
    pub frame: FrameIndex,
    pub value: FieldValue,
    pub reason: DiscardReason,
}

/// Everything the Reconciler decided for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct StepReport {
    pub frame: FrameIndex,
    pub timestamp: f64,
    /// One entry per configured field.
    pub fields: BTreeMap<String, FieldStep>,
    pub revisions: Vec<Revision>,
    pub discarded: Vec<ReadingDiscarded>,
    /// Terminal fields whose terminal value was accepted on this frame.
    pub terminal: Vec<String>,
}

impl StepReport {
    pub fn value(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field).and_then(|s| s.value.as_ref())
    }

    pub fn outcome(&self, field: &str) -> Option<ReadingOutcome> {
        self.fields.get(field).map(|s| s.outcome)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Inconsistent or missing field configuration. Always fatal.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigurationError {
    NoFields,
    DuplicateField(String),
    /// `bounded_delta` without `max_delta_per_frame`.
    MissingDeltaBound { field: String },
    NegativeDeltaBound { field: String, delta: i64 },
    /// `max_delta_per_frame` on a field with no monotonicity class.
    DeltaWithoutMonotonicity { field: String },
    /// Ordering or delta rules on a domain that has no ordering / no arithmetic.
    UnorderedDomain { field: String },
    InvalidWindow {
        field: String,
        window: usize,
        majority: usize,
    },
    InvalidDomain { field: String, reason: String },
    TerminalValueOutsideDomain { field: String, value: FieldValue },
    InvalidConfidence { field: String, value: f32 },
    /// A raw record carried a field with no FieldModel.
    UnknownField { field: String, frame: FrameIndex },
    Malformed(String),
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::NoFields => write!(f, "no fields configured"),
            ConfigurationError::DuplicateField(name) => {
                write!(f, "field '{name}' is configured more than once")
            }
            ConfigurationError::MissingDeltaBound { field } => {
                write!(f, "field '{field}': bounded_delta requires max_delta_per_frame")
            }
            ConfigurationError::NegativeDeltaBound { field, delta } => {
                write!(f, "field '{field}': max_delta_per_frame must be >= 0, got {delta}")
            }
            ConfigurationError::DeltaWithoutMonotonicity { field } => write!(
                f,
                "field '{field}': max_delta_per_frame set but monotonicity is none"
            ),
            ConfigurationError::UnorderedDomain { field } => write!(
                f,
                "field '{field}': monotonicity rules need an ordered domain"
            ),
            ConfigurationError::InvalidWindow {
                field,
                window,
                majority,
            } => write!(
                f,
                "field '{field}': invalid suspect window {window} / majority {majority}"
            ),
            ConfigurationError::InvalidDomain { field, reason } => {
                write!(f, "field '{field}': invalid domain: {reason}")
            }
            ConfigurationError::TerminalValueOutsideDomain { field, value } => write!(
                f,
                "field '{field}': terminal value {value} is outside the field's domain"
            ),
            ConfigurationError::InvalidConfidence { field, value } => write!(
                f,
                "field '{field}': min_confidence must be within [0, 1], got {value}"
            ),
            ConfigurationError::UnknownField { field, frame } => write!(
                f,
                "no field model for observed field '{field}' (frame {frame})"
            ),
            ConfigurationError::Malformed(msg) => write!(f, "malformed config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigurationError {}

/// Structural violations of the streaming contract. Per-reading noise never
/// surfaces here.
#[derive(Clone, Debug, PartialEq)]
pub enum ReconcileError {
    Configuration(ConfigurationError),
    OutOfOrderInput {
        previous: FrameIndex,
        got: FrameIndex,
    },
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileError::Configuration(e) => write!(f, "configuration error: {e}"),
            ReconcileError::OutOfOrderInput { previous, got } => write!(
                f,
                "out-of-order input: frame {got} does not follow frame {previous}"
            ),
        }
    }
}

impl std::error::Error for ReconcileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReconcileError::Configuration(e) => Some(e),
            ReconcileError::OutOfOrderInput { .. } => None,
        }
    }
}

impl From<ConfigurationError> for ReconcileError {
    fn from(e: ConfigurationError) -> Self {
        ReconcileError::Configuration(e)
    }
}

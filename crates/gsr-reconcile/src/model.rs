//! Per-field domain contracts.
//!
//! A [`FieldModel`] is a small closed set of rule parameters. Classification
//! is a pure function of the previous accepted value, the candidate and the
//! number of frames elapsed since the previous acceptance.

use std::collections::BTreeMap;

use gsr_schemas::FieldValue;

use crate::{
    simple_majority, Classification, ConfigurationError, FieldSpec, MonotonicityKind,
    ReconcileConfig, ReconcileDefaults, ValueDomain, DEFAULT_MAX_SAMPLING_GAP,
    DEFAULT_SUSPECT_WINDOW,
};

/// Validated monotonicity class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Monotonicity {
    None,
    /// Never decreases. An optional per-frame growth bound makes large jumps
    /// SUSPECT; decreases are always REJECT.
    NonDecreasing { max_delta_per_frame: Option<i64> },
    /// `|delta| <= d * elapsed_frames`.
    BoundedDelta(i64),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldModel {
    name: String,
    domain: ValueDomain,
    monotonicity: Monotonicity,
    suspect_window: usize,
    majority: usize,
    max_sampling_gap: u64,
    min_confidence: Option<f32>,
    terminal_value: Option<FieldValue>,
}

impl FieldModel {
    pub fn new<S: Into<String>>(name: S, domain: ValueDomain, monotonicity: Monotonicity) -> Self {
        Self {
            name: name.into(),
            domain,
            monotonicity,
            suspect_window: DEFAULT_SUSPECT_WINDOW,
            majority: simple_majority(DEFAULT_SUSPECT_WINDOW),
            max_sampling_gap: DEFAULT_MAX_SAMPLING_GAP,
            min_confidence: None,
            terminal_value: None,
        }
    }

    /// Non-negative counter that never decreases (kills, creep score).
    pub fn counter<S: Into<String>>(name: S) -> Self {
        Self::new(
            name,
            ValueDomain::NonNegativeInt,
            Monotonicity::NonDecreasing {
                max_delta_per_frame: None,
            },
        )
    }

    /// Non-negative value that moves at most `d` per frame (gold, health).
    pub fn bounded_delta<S: Into<String>>(name: S, d: i64) -> Self {
        Self::new(name, ValueDomain::NonNegativeInt, Monotonicity::BoundedDelta(d))
    }

    /// Flag that ends the session once it reads `true`.
    pub fn terminal_flag<S: Into<String>>(name: S) -> Self {
        Self::new(
            name,
            ValueDomain::Flag,
            Monotonicity::NonDecreasing {
                max_delta_per_frame: None,
            },
        )
        .with_terminal_value(FieldValue::Flag(true))
    }

    pub fn with_window(mut self, suspect_window: usize, majority: usize) -> Self {
        self.suspect_window = suspect_window;
        self.majority = majority;
        self
    }

    pub fn with_max_sampling_gap(mut self, frames: u64) -> Self {
        self.max_sampling_gap = frames;
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = Some(min_confidence);
        self
    }

    pub fn with_terminal_value(mut self, value: FieldValue) -> Self {
        self.terminal_value = Some(value);
        self
    }

    /// Build from a config entry, filling unset keys from `defaults`.
    pub fn from_spec(
        spec: &FieldSpec,
        defaults: &ReconcileDefaults,
    ) -> Result<Self, ConfigurationError> {
        let monotonicity = match (spec.monotonicity, spec.max_delta_per_frame) {
            (MonotonicityKind::None, Some(_)) => {
                return Err(ConfigurationError::DeltaWithoutMonotonicity {
                    field: spec.name.clone(),
                })
            }
            (MonotonicityKind::None, None) => Monotonicity::None,
            (MonotonicityKind::NonDecreasing, d) => Monotonicity::NonDecreasing {
                max_delta_per_frame: d,
            },
            (MonotonicityKind::BoundedDelta, Some(d)) => Monotonicity::BoundedDelta(d),
            (MonotonicityKind::BoundedDelta, None) => {
                return Err(ConfigurationError::MissingDeltaBound {
                    field: spec.name.clone(),
                })
            }
        };

        let suspect_window = spec.suspect_window.unwrap_or(defaults.suspect_window);
        let majority = spec
            .majority
            .or(defaults.majority)
            .unwrap_or_else(|| simple_majority(suspect_window));

        let model = Self {
            name: spec.name.clone(),
            domain: spec.domain.clone(),
            monotonicity,
            suspect_window,
            majority,
            max_sampling_gap: spec.max_sampling_gap.unwrap_or(defaults.max_sampling_gap),
            min_confidence: spec.min_confidence,
            terminal_value: spec.terminal_value.clone(),
        };
        model.validate()?;
        Ok(model)
    }

    /// Check the rule parameters are internally consistent.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let field = || self.name.clone();

        match &self.domain {
            ValueDomain::BoundedInt { min, max } if min > max => {
                return Err(ConfigurationError::InvalidDomain {
                    field: field(),
                    reason: format!("min {min} > max {max}"),
                })
            }
            ValueDomain::Enumerated { values } if values.is_empty() => {
                return Err(ConfigurationError::InvalidDomain {
                    field: field(),
                    reason: "enumeration has no values".to_string(),
                })
            }
            ValueDomain::Enumerated { values } => {
                let mut seen = std::collections::BTreeSet::new();
                for v in values {
                    if !seen.insert(v) {
                        return Err(ConfigurationError::InvalidDomain {
                            field: field(),
                            reason: format!("enumeration value '{v}' repeated"),
                        });
                    }
                }
            }
            _ => {}
        }

        let numeric = self.domain.is_numeric();
        let ordered = numeric || matches!(self.domain, ValueDomain::Enumerated { .. } | ValueDomain::Flag);
        match self.monotonicity {
            Monotonicity::None => {}
            Monotonicity::NonDecreasing { max_delta_per_frame } => {
                if !ordered {
                    return Err(ConfigurationError::UnorderedDomain { field: field() });
                }
                if let Some(d) = max_delta_per_frame {
                    if !numeric {
                        return Err(ConfigurationError::UnorderedDomain { field: field() });
                    }
                    if d < 0 {
                        return Err(ConfigurationError::NegativeDeltaBound {
                            field: field(),
                            delta: d,
                        });
                    }
                }
            }
            Monotonicity::BoundedDelta(d) => {
                if !numeric {
                    return Err(ConfigurationError::UnorderedDomain { field: field() });
                }
                if d < 0 {
                    return Err(ConfigurationError::NegativeDeltaBound {
                        field: field(),
                        delta: d,
                    });
                }
            }
        }

        if self.suspect_window == 0 || self.majority == 0 || self.majority > self.suspect_window {
            return Err(ConfigurationError::InvalidWindow {
                field: field(),
                window: self.suspect_window,
                majority: self.majority,
            });
        }

        if let Some(c) = self.min_confidence {
            if !(0.0..=1.0).contains(&c) {
                return Err(ConfigurationError::InvalidConfidence {
                    field: field(),
                    value: c,
                });
            }
        }

        if let Some(t) = &self.terminal_value {
            if self.normalize(t).as_ref() != Some(t) {
                return Err(ConfigurationError::TerminalValueOutsideDomain {
                    field: field(),
                    value: t.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain(&self) -> &ValueDomain {
        &self.domain
    }

    pub fn monotonicity(&self) -> Monotonicity {
        self.monotonicity
    }

    pub fn suspect_window(&self) -> usize {
        self.suspect_window
    }

    pub fn majority(&self) -> usize {
        self.majority
    }

    pub fn max_sampling_gap(&self) -> u64 {
        self.max_sampling_gap
    }

    pub fn min_confidence(&self) -> Option<f32> {
        self.min_confidence
    }

    pub fn terminal_value(&self) -> Option<&FieldValue> {
        self.terminal_value.as_ref()
    }

    pub fn is_terminal(&self, value: &FieldValue) -> bool {
        self.terminal_value.as_ref() == Some(value)
    }

    /// Map a recognizer value into this field's domain, or `None` when it
    /// cannot belong to the domain at all.
    pub fn normalize(&self, raw: &FieldValue) -> Option<FieldValue> {
        match &self.domain {
            ValueDomain::NonNegativeInt => parse_int(raw)
                .filter(|v| *v >= 0)
                .map(FieldValue::Int),
            ValueDomain::BoundedInt { min, max } => parse_int(raw)
                .filter(|v| v >= min && v <= max)
                .map(FieldValue::Int),
            ValueDomain::Timer => match raw {
                FieldValue::Text(s) if s.contains(':') => parse_clock(s).map(FieldValue::Int),
                other => parse_int(other).filter(|v| *v >= 0).map(FieldValue::Int),
            },
            ValueDomain::Enumerated { values } => match raw {
                FieldValue::Text(s) => {
                    let s = s.trim();
                    values
                        .iter()
                        .find(|v| v.as_str() == s)
                        .map(|v| FieldValue::Text(v.clone()))
                }
                _ => None,
            },
            ValueDomain::Flag => match raw {
                FieldValue::Flag(b) => Some(FieldValue::Flag(*b)),
                FieldValue::Int(0) => Some(FieldValue::Flag(false)),
                FieldValue::Int(1) => Some(FieldValue::Flag(true)),
                FieldValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" => Some(FieldValue::Flag(true)),
                    "false" => Some(FieldValue::Flag(false)),
                    _ => None,
                },
                FieldValue::Int(_) | FieldValue::Unsupported(_) => None,
            },
            ValueDomain::Text => match raw {
                FieldValue::Text(s) => Some(FieldValue::Text(s.clone())),
                FieldValue::Int(v) => Some(FieldValue::Text(v.to_string())),
                FieldValue::Flag(_) | FieldValue::Unsupported(_) => None,
            },
        }
    }

    /// Position of a normalized value in the domain's ordering.
    fn rank(&self, value: &FieldValue) -> Option<i64> {
        match (&self.domain, value) {
            (ValueDomain::Enumerated { values }, FieldValue::Text(s)) => {
                values.iter().position(|v| v == s).map(|i| i as i64)
            }
            (ValueDomain::Flag, FieldValue::Flag(b)) => Some(i64::from(*b)),
            (ValueDomain::Text, _) => None,
            (_, FieldValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Classify `candidate` against the previously accepted value.
    ///
    /// `elapsed_frames` is `f - lastAcceptedFrame` and is ignored when there
    /// is no previous value.
    pub fn classify(
        &self,
        previous: Option<&FieldValue>,
        candidate: &FieldValue,
        elapsed_frames: u64,
    ) -> Classification {
        let Some(candidate) = self.normalize(candidate) else {
            return Classification::Reject;
        };
        let Some(previous) = previous else {
            return Classification::Accept;
        };

        let gap_exceeded = elapsed_frames > self.max_sampling_gap;

        match self.monotonicity {
            Monotonicity::None => Classification::Accept,
            Monotonicity::NonDecreasing {
                max_delta_per_frame,
            } => {
                let (Some(p), Some(c)) = (self.rank(previous), self.rank(&candidate)) else {
                    return Classification::Accept;
                };
                if c < p {
                    return Classification::Reject;
                }
                match max_delta_per_frame {
                    Some(d) if !gap_exceeded && !within_bound(p, c, d, elapsed_frames) => {
                        Classification::Suspect
                    }
                    _ => Classification::Accept,
                }
            }
            Monotonicity::BoundedDelta(d) => {
                let (Some(p), Some(c)) = (self.rank(previous), self.rank(&candidate)) else {
                    return Classification::Accept;
                };
                if gap_exceeded || within_bound(p, c, d, elapsed_frames) {
                    Classification::Accept
                } else {
                    Classification::Suspect
                }
            }
        }
    }
}

impl ValueDomain {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ValueDomain::NonNegativeInt | ValueDomain::BoundedInt { .. } | ValueDomain::Timer
        )
    }
}

fn within_bound(previous: i64, candidate: i64, d: i64, elapsed_frames: u64) -> bool {
    let allowed = u64::try_from(d).unwrap_or(0).saturating_mul(elapsed_frames);
    previous.abs_diff(candidate) <= allowed
}

/// Integers, or digit strings as OCR tends to produce them (`"1,250"`, `" 42"`).
fn parse_int(raw: &FieldValue) -> Option<i64> {
    match raw {
        FieldValue::Int(v) => Some(*v),
        FieldValue::Text(s) => {
            let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
            if cleaned.is_empty() {
                return None;
            }
            cleaned.parse::<i64>().ok()
        }
        FieldValue::Flag(_) | FieldValue::Unsupported(_) => None,
    }
}

/// `MM:SS` or `H:MM:SS` to seconds. Minutes may exceed 59 in the two-part
/// form (a 75-minute game shows `75:02`).
fn parse_clock(s: &str) -> Option<i64> {
    let parts: Vec<&str> = s.trim().split(':').collect();
    let nums: Option<Vec<i64>> = parts
        .iter()
        .map(|p| {
            if p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()) {
                None
            } else {
                p.parse::<i64>().ok()
            }
        })
        .collect();
    let nums = nums?;
    // Overflow means a garbled reading, not a clock.
    match nums.as_slice() {
        [m, s] if *s < 60 => m.checked_mul(60)?.checked_add(*s),
        [h, m, s] if *m < 60 && *s < 60 => h.checked_mul(3600)?.checked_add(m * 60 + s),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Model set
// ---------------------------------------------------------------------------

/// All field models, keyed by field name.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldModelSet {
    models: BTreeMap<String, FieldModel>,
}

impl FieldModelSet {
    pub fn new(models: Vec<FieldModel>) -> Result<Self, ConfigurationError> {
        if models.is_empty() {
            return Err(ConfigurationError::NoFields);
        }
        let mut map = BTreeMap::new();
        for m in models {
            m.validate()?;
            if map.contains_key(m.name()) {
                return Err(ConfigurationError::DuplicateField(m.name().to_string()));
            }
            map.insert(m.name().to_string(), m);
        }
        Ok(Self { models: map })
    }

    pub fn from_config(cfg: &ReconcileConfig) -> Result<Self, ConfigurationError> {
        let models = cfg
            .fields
            .iter()
            .map(|spec| FieldModel::from_spec(spec, &cfg.reconcile))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(models)
    }

    pub fn get(&self, name: &str) -> Option<&FieldModel> {
        self.models.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Models in field-name order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldModel> {
        self.models.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

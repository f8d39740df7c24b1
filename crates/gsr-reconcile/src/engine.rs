use std::collections::BTreeMap;

use gsr_schemas::{FieldValue, FrameIndex, RawFieldReading, RawFrame};
use tracing::{debug, trace};

use crate::belief::{FieldBelief, PendingReading};
use crate::model::{FieldModel, FieldModelSet};
use crate::{
    Classification, ConfigurationError, DiscardReason, FieldStep, ReadingDiscarded,
    ReadingOutcome, ReconcileConfig, ReconcileError, Revision, StepReport,
};

/// Streaming reconciler: one belief per field, one step per sampled frame.
///
/// Frames must arrive in strictly increasing order. Per-reading anomalies are
/// absorbed into REJECT/SUSPECT handling; only ordering and configuration
/// violations are returned as errors, and a failed step leaves every belief
/// untouched.
#[derive(Clone, Debug)]
pub struct Reconciler {
    models: FieldModelSet,
    beliefs: BTreeMap<String, FieldBelief>,
    last_frame: Option<FrameIndex>,
    seq: u64,
}

impl Reconciler {
    pub fn new(models: FieldModelSet) -> Self {
        Self {
            models,
            beliefs: BTreeMap::new(),
            last_frame: None,
            seq: 0,
        }
    }

    pub fn from_config(cfg: &ReconcileConfig) -> Result<Self, ConfigurationError> {
        Ok(Self::new(FieldModelSet::from_config(cfg)?))
    }

    pub fn models(&self) -> &FieldModelSet {
        &self.models
    }

    /// `None` until the field's first reading.
    pub fn belief(&self, field: &str) -> Option<&FieldBelief> {
        self.beliefs.get(field)
    }

    pub fn last_frame(&self) -> Option<FrameIndex> {
        self.last_frame
    }

    /// Earliest frame any field could still revise. Frames strictly before
    /// it are final.
    pub fn revision_horizon(&self) -> Option<FrameIndex> {
        self.beliefs
            .values()
            .filter_map(FieldBelief::earliest_pending_frame)
            .min()
    }

    fn admit(&self, raw: &RawFrame) -> Result<(), ReconcileError> {
        if let Some(previous) = self.last_frame {
            if raw.frame <= previous {
                return Err(ReconcileError::OutOfOrderInput {
                    previous,
                    got: raw.frame,
                });
            }
        }
        for name in raw.field_names() {
            if !self.models.contains(name) {
                return Err(ConfigurationError::UnknownField {
                    field: name.to_string(),
                    frame: raw.frame,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Validate ordering and advance past `raw` without touching any belief.
    /// Used once the session is frozen.
    pub fn skip(&mut self, raw: &RawFrame) -> Result<(), ReconcileError> {
        self.admit(raw)?;
        self.last_frame = Some(raw.frame);
        self.seq += 1;
        Ok(())
    }

    /// Discard every buffered SUSPECT reading (stream end, session freeze).
    pub fn expire_all(&mut self) -> Vec<ReadingDiscarded> {
        let mut out = Vec::new();
        for (name, belief) in self.beliefs.iter_mut() {
            for p in belief.clear_pending() {
                out.push(discarded(name, p.frame, p.value, DiscardReason::SuspectExpired));
            }
        }
        out
    }

    /// Reconcile one sampled frame.
    pub fn step(&mut self, raw: &RawFrame) -> Result<StepReport, ReconcileError> {
        self.admit(raw)?;

        let previous_frame = self.last_frame;
        self.last_frame = Some(raw.frame);
        self.seq += 1;

        let mut report = StepReport {
            frame: raw.frame,
            timestamp: raw.timestamp,
            fields: BTreeMap::new(),
            revisions: Vec::new(),
            discarded: Vec::new(),
            terminal: Vec::new(),
        };

        for model in self.models.iter() {
            let reading = raw.reading(model.name());
            let step = step_field(
                model,
                &mut self.beliefs,
                reading,
                self.seq,
                previous_frame,
                &mut report,
            );
            if step.outcome.is_accepted() {
                if let Some(v) = &step.value {
                    if model.is_terminal(v) {
                        report.terminal.push(model.name().to_string());
                    }
                }
            }
            report.fields.insert(model.name().to_string(), step);
        }

        Ok(report)
    }
}

fn discarded(field: &str, frame: FrameIndex, value: FieldValue, reason: DiscardReason) -> ReadingDiscarded {
    ReadingDiscarded {
        field: field.to_string(),
        frame,
        value,
        reason,
    }
}

/// Rewrite frames `[from, previous_frame]` when `from` precedes the current frame.
fn push_revision(
    report: &mut StepReport,
    field: &str,
    from: FrameIndex,
    previous_frame: Option<FrameIndex>,
    value: &FieldValue,
) {
    if let Some(through) = previous_frame {
        if from <= through {
            debug!(
                field,
                from_frame = from,
                through_frame = through,
                value = %value,
                "retroactive revision"
            );
            report.revisions.push(Revision {
                field: field.to_string(),
                from_frame: from,
                through_frame: through,
                value: value.clone(),
            });
        }
    }
}

fn held(beliefs: &BTreeMap<String, FieldBelief>, field: &str, outcome: ReadingOutcome) -> FieldStep {
    FieldStep {
        value: beliefs.get(field).and_then(|b| b.accepted().cloned()),
        outcome,
    }
}

fn step_field(
    model: &FieldModel,
    beliefs: &mut BTreeMap<String, FieldBelief>,
    reading: RawFieldReading,
    seq: u64,
    previous_frame: Option<FrameIndex>,
    report: &mut StepReport,
) -> FieldStep {
    let name = model.name();
    let frame = reading.frame;

    // The window slides on every processed frame, absent or not.
    if let Some(belief) = beliefs.get_mut(name) {
        for p in belief.expire(seq) {
            trace!(field = name, frame = p.frame, value = %p.value, "suspect expired");
            report
                .discarded
                .push(discarded(name, p.frame, p.value, DiscardReason::SuspectExpired));
        }
    }

    let Some(raw_value) = reading.value else {
        return held(beliefs, name, ReadingOutcome::Absent);
    };

    if let (Some(min), Some(conf)) = (model.min_confidence(), reading.confidence) {
        if !conf.is_finite() || conf < min {
            trace!(field = name, frame, confidence = conf, "low-confidence reading dropped");
            report
                .discarded
                .push(discarded(name, frame, raw_value, DiscardReason::LowConfidence));
            return held(beliefs, name, ReadingOutcome::LowConfidence);
        }
    }

    let belief = beliefs
        .entry(name.to_string())
        .or_insert_with(|| FieldBelief::new(model.suspect_window()));
    let elapsed = belief.elapsed_since_accept(frame);

    let Some(candidate) = model.normalize(&raw_value) else {
        debug!(field = name, frame, value = %raw_value, "reading outside domain rejected");
        report
            .discarded
            .push(discarded(name, frame, raw_value, DiscardReason::Rejected));
        return held(beliefs, name, ReadingOutcome::Rejected);
    };

    match model.classify(belief.accepted(), &candidate, elapsed) {
        Classification::Accept => {
            trace!(field = name, frame, value = %candidate, "accepted");
            let drained = belief.accept(candidate.clone(), frame);
            settle_drained(name, drained, &candidate, previous_frame, report);
            FieldStep {
                value: Some(candidate),
                outcome: ReadingOutcome::Accepted,
            }
        }
        Classification::Reject => {
            debug!(
                field = name,
                frame,
                value = %candidate,
                accepted = ?belief.accepted(),
                "reading rejected"
            );
            report
                .discarded
                .push(discarded(name, frame, candidate, DiscardReason::Rejected));
            held(beliefs, name, ReadingOutcome::Rejected)
        }
        Classification::Suspect => {
            debug!(
                field = name,
                frame,
                value = %candidate,
                accepted = ?belief.accepted(),
                elapsed,
                "reading suspect"
            );
            if let Some(evicted) = belief.push_suspect(PendingReading {
                frame,
                seq,
                value: candidate,
            }) {
                report.discarded.push(discarded(
                    name,
                    evicted.frame,
                    evicted.value,
                    DiscardReason::SuspectExpired,
                ));
            }

            let Some(agreed) = belief.majority(model.majority()) else {
                return held(beliefs, name, ReadingOutcome::Suspect);
            };
            if model.classify(belief.accepted(), &agreed, elapsed) == Classification::Reject {
                return held(beliefs, name, ReadingOutcome::Suspect);
            }

            debug!(field = name, frame, value = %agreed, "suspect readings confirmed by majority");
            let drained = belief.accept(agreed.clone(), frame);
            if let Some(first) = drained.first() {
                push_revision(report, name, first.frame, previous_frame, &agreed);
            }
            for p in drained.into_iter().filter(|p| p.value != agreed) {
                report
                    .discarded
                    .push(discarded(name, p.frame, p.value, DiscardReason::SuspectSuperseded));
            }
            FieldStep {
                value: Some(agreed),
                outcome: ReadingOutcome::Confirmed,
            }
        }
    }
}

/// Buffered suspects after a direct acceptance: those equal to the accepted
/// value were corroborated and their frames get revised; the rest are moot.
fn settle_drained(
    field: &str,
    drained: Vec<PendingReading>,
    accepted: &FieldValue,
    previous_frame: Option<FrameIndex>,
    report: &mut StepReport,
) {
    if let Some(first) = drained.iter().find(|p| &p.value == accepted) {
        push_revision(report, field, first.frame, previous_frame, accepted);
    }
    for p in drained.into_iter().filter(|p| &p.value != accepted) {
        report
            .discarded
            .push(discarded(field, p.frame, p.value, DiscardReason::SuspectSuperseded));
    }
}

//! Sequence assembler: whole-frame records, bounded revision, terminal freeze.
//!
//! # Invariants
//!
//! - **Closed frames are final**: a frame is appended to the Timeline only
//!   once it lies strictly before the Reconciler's revision horizon, so no
//!   later revision can reach it.
//!
//! - **FROZEN is absorbing**: once a terminal field's terminal value is
//!   accepted, every later frame replays the terminal snapshot. Raw readings
//!   after that point are counted and ignored; frame order is still checked.
//!
//! - **A fatal error poisons the builder**: out-of-order input or an unknown
//!   field fails the push, and every later call fails with
//!   [`TimelineError::Poisoned`]. The partial Timeline is never handed out.
//!
//! - **Stable keys**: every emitted record carries every configured field.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use gsr_reconcile::{FieldModelSet, ReconcileError, Reconciler, StepReport};
use gsr_schemas::{CorrectedState, FieldValue, FrameIndex, Provenance, RawFrame, Timeline};
use tracing::{debug, info};

use crate::quality::QualityReport;

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Frozen {
        /// Frame at which the terminal value was accepted.
        at: FrameIndex,
        field: String,
    },
}

impl SessionState {
    pub fn is_frozen(&self) -> bool {
        matches!(self, SessionState::Frozen { .. })
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub enum TimelineError {
    Reconcile(ReconcileError),
    /// A previous call failed; the session cannot continue.
    Poisoned,
}

impl fmt::Display for TimelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimelineError::Reconcile(e) => write!(f, "{e}"),
            TimelineError::Poisoned => {
                write!(f, "timeline builder poisoned by an earlier fatal error")
            }
        }
    }
}

impl std::error::Error for TimelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TimelineError::Reconcile(e) => Some(e),
            TimelineError::Poisoned => None,
        }
    }
}

impl From<ReconcileError> for TimelineError {
    fn from(e: ReconcileError) -> Self {
        TimelineError::Reconcile(e)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct TimelineBuilder {
    reconciler: Reconciler,
    fields: Vec<String>,
    /// Emitted but still revisable, in frame order.
    open: VecDeque<CorrectedState>,
    timeline: Timeline,
    state: SessionState,
    frozen: BTreeMap<String, Option<FieldValue>>,
    quality: QualityReport,
    poisoned: bool,
}

impl TimelineBuilder {
    pub fn new(models: FieldModelSet) -> Self {
        let fields = models.names();
        Self {
            quality: QualityReport::new(fields.iter().cloned()),
            reconciler: Reconciler::new(models),
            fields,
            open: VecDeque::new(),
            timeline: Timeline::new(),
            state: SessionState::Active,
            frozen: BTreeMap::new(),
            poisoned: false,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn quality(&self) -> &QualityReport {
        &self.quality
    }

    /// Frames closed so far.
    pub fn closed(&self) -> &Timeline {
        &self.timeline
    }

    /// Frames emitted but still inside some field's revision window.
    pub fn open_frames(&self) -> impl Iterator<Item = &CorrectedState> {
        self.open.iter()
    }

    /// Feed one raw record. Returns the frames that closed because of it,
    /// in frame order.
    pub fn push(&mut self, raw: &RawFrame) -> Result<Vec<CorrectedState>, TimelineError> {
        if self.poisoned {
            return Err(TimelineError::Poisoned);
        }

        let result = match self.state {
            SessionState::Active => self.push_active(raw),
            SessionState::Frozen { .. } => self.push_frozen(raw),
        };
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    /// Flush every open frame and hand back the Timeline with its quality
    /// report.
    pub fn finish(mut self) -> Result<(Timeline, QualityReport), TimelineError> {
        if self.poisoned {
            return Err(TimelineError::Poisoned);
        }
        for d in self.reconciler.expire_all() {
            self.quality.record_discard(&d);
        }
        self.close_all();
        self.quality.frames_out = self.timeline.len() as u64;
        info!(
            frames_in = self.quality.frames_in,
            frames_out = self.quality.frames_out,
            discarded = self.quality.total_discarded(),
            frozen_at = ?self.quality.frozen_at,
            "timeline assembled"
        );
        Ok((self.timeline, self.quality))
    }

    fn push_active(&mut self, raw: &RawFrame) -> Result<Vec<CorrectedState>, TimelineError> {
        let report = self.reconciler.step(raw)?;
        self.quality.frames_in += 1;

        self.apply_revisions(&report);
        for d in &report.discarded {
            self.quality.record_discard(d);
        }

        let state = self.record(&report);
        if let Some(field) = report.terminal.first() {
            self.freeze(&state, field.clone());
            self.open.push_back(state);
            for d in self.reconciler.expire_all() {
                self.quality.record_discard(&d);
            }
            return Ok(self.close_all());
        }
        self.open.push_back(state);

        Ok(match self.reconciler.revision_horizon() {
            Some(horizon) => self.close_before(horizon),
            None => self.close_all(),
        })
    }

    fn push_frozen(&mut self, raw: &RawFrame) -> Result<Vec<CorrectedState>, TimelineError> {
        self.reconciler.skip(raw)?;
        self.quality.frames_in += 1;

        for (name, value) in &raw.readings {
            if value.is_some() {
                self.quality.record_ignored(name);
            }
        }
        let state = CorrectedState {
            frame: raw.frame,
            timestamp: raw.timestamp,
            fields: self.frozen.clone(),
            provenance: self
                .fields
                .iter()
                .map(|f| (f.clone(), Provenance::Frozen))
                .collect(),
        };
        self.open.push_back(state);
        Ok(self.close_all())
    }

    /// Build the whole-frame record for one step.
    fn record(&mut self, report: &StepReport) -> CorrectedState {
        let mut fields = BTreeMap::new();
        let mut provenance = BTreeMap::new();
        for (name, step) in &report.fields {
            let resolved = step.value.is_some();
            self.quality.record_outcome(name, step.outcome, resolved);
            let p = if !resolved {
                Provenance::Unresolved
            } else if step.outcome.is_accepted() {
                Provenance::Observed
            } else {
                Provenance::Held
            };
            fields.insert(name.clone(), step.value.clone());
            provenance.insert(name.clone(), p);
        }
        CorrectedState {
            frame: report.frame,
            timestamp: report.timestamp,
            fields,
            provenance,
        }
    }

    fn apply_revisions(&mut self, report: &StepReport) {
        for rev in &report.revisions {
            let mut touched = 0;
            for state in self.open.iter_mut().filter(|s| rev.covers(s.frame)) {
                state.fields.insert(rev.field.clone(), Some(rev.value.clone()));
                state.provenance.insert(rev.field.clone(), Provenance::Revised);
                touched += 1;
            }
            debug!(
                field = %rev.field,
                from_frame = rev.from_frame,
                through_frame = rev.through_frame,
                frames = touched,
                "revision applied"
            );
            self.quality.record_revised(&rev.field, touched);
        }
    }

    fn freeze(&mut self, terminal: &CorrectedState, field: String) {
        info!(frame = terminal.frame, field = %field, "terminal value accepted; session frozen");
        self.frozen = terminal.fields.clone();
        self.quality.frozen_at = Some(terminal.frame);
        self.state = SessionState::Frozen {
            at: terminal.frame,
            field,
        };
    }

    fn close_before(&mut self, horizon: FrameIndex) -> Vec<CorrectedState> {
        let mut closed = Vec::new();
        while self.open.front().is_some_and(|s| s.frame < horizon) {
            if let Some(state) = self.open.pop_front() {
                closed.push(state);
            }
        }
        self.append(&closed);
        closed
    }

    fn close_all(&mut self) -> Vec<CorrectedState> {
        let closed: Vec<_> = self.open.drain(..).collect();
        self.append(&closed);
        closed
    }

    fn append(&mut self, closed: &[CorrectedState]) {
        for state in closed {
            // The Reconciler already refused non-increasing frames.
            let appended = self.timeline.append(state.clone());
            debug_assert!(appended, "frame {} closed out of order", state.frame);
        }
    }
}

/// Reconcile a whole raw stream in one go.
pub fn assemble<'a, I>(
    models: FieldModelSet,
    frames: I,
) -> Result<(Timeline, QualityReport), TimelineError>
where
    I: IntoIterator<Item = &'a RawFrame>,
{
    let mut builder = TimelineBuilder::new(models);
    for raw in frames {
        builder.push(raw)?;
    }
    builder.finish()
}

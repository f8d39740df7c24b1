//! Data quality report for one reconciled session.
//!
//! Counts what the Reconciler and the assembler did with every reading:
//! - frames in / frames out, and the frame the session froze at
//! - per field: accepted, confirmed, held (absent), rejected, suspect
//! - per field: revised frames, expired and superseded suspects
//! - per field: low-confidence and post-freeze readings, unresolved frames
//!
//! Nothing here is fatal. A noisy session still produces a timeline; this
//! report is how you find out how noisy it was.

use std::collections::BTreeMap;
use std::fmt;

use gsr_reconcile::{DiscardReason, ReadingDiscarded, ReadingOutcome};
use gsr_schemas::FrameIndex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldQuality {
    pub accepted: u64,
    /// Accepted through majority corroboration.
    pub confirmed: u64,
    /// Frames with no reading; the last accepted value was held.
    pub held: u64,
    pub rejected: u64,
    pub suspect: u64,
    pub revised_frames: u64,
    pub suspect_expired: u64,
    pub suspect_superseded: u64,
    pub low_confidence: u64,
    pub ignored_after_freeze: u64,
    /// Emitted frames where nothing had been accepted yet.
    pub unresolved_frames: u64,
}

impl FieldQuality {
    /// Readings that never reached the timeline.
    pub fn discarded(&self) -> u64 {
        self.rejected + self.suspect_expired + self.suspect_superseded + self.low_confidence
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityReport {
    pub frames_in: u64,
    pub frames_out: u64,
    pub frozen_at: Option<FrameIndex>,
    pub fields: BTreeMap<String, FieldQuality>,
}

impl QualityReport {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|f| (f.into(), FieldQuality::default()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldQuality> {
        self.fields.get(name)
    }

    fn field_mut(&mut self, name: &str) -> &mut FieldQuality {
        self.fields.entry(name.to_string()).or_default()
    }

    /// `true` when every reading made it into the timeline unchanged.
    pub fn is_clean(&self) -> bool {
        self.fields
            .values()
            .all(|q| q.discarded() == 0 && q.suspect == 0 && q.revised_frames == 0)
    }

    pub fn total_discarded(&self) -> u64 {
        self.fields.values().map(FieldQuality::discarded).sum()
    }

    pub(crate) fn record_outcome(&mut self, field: &str, outcome: ReadingOutcome, resolved: bool) {
        let q = self.field_mut(field);
        match outcome {
            ReadingOutcome::Accepted => q.accepted += 1,
            ReadingOutcome::Confirmed => q.confirmed += 1,
            ReadingOutcome::Absent => q.held += 1,
            ReadingOutcome::Rejected => q.rejected += 1,
            ReadingOutcome::Suspect => q.suspect += 1,
            // Counted through the matching discard event.
            ReadingOutcome::LowConfidence => {}
        }
        if !resolved {
            q.unresolved_frames += 1;
        }
    }

    pub(crate) fn record_discard(&mut self, d: &ReadingDiscarded) {
        let q = self.field_mut(&d.field);
        match d.reason {
            // Counted through the step outcome.
            DiscardReason::Rejected => {}
            DiscardReason::SuspectExpired => q.suspect_expired += 1,
            DiscardReason::SuspectSuperseded => q.suspect_superseded += 1,
            DiscardReason::LowConfidence => q.low_confidence += 1,
        }
    }

    pub(crate) fn record_revised(&mut self, field: &str, frames: u64) {
        self.field_mut(field).revised_frames += frames;
    }

    pub(crate) fn record_ignored(&mut self, field: &str) {
        self.field_mut(field).ignored_after_freeze += 1;
    }
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "QualityReport {{")?;
        writeln!(f, "  frames_in: {}", self.frames_in)?;
        writeln!(f, "  frames_out: {}", self.frames_out)?;
        writeln!(
            f,
            "  frozen_at: {}",
            self.frozen_at
                .map(|v| v.to_string())
                .unwrap_or_else(|| "none".to_string())
        )?;
        writeln!(f, "  discarded: {}", self.total_discarded())?;
        writeln!(f, "  fields: {}", self.fields.len())?;
        for (name, q) in &self.fields {
            writeln!(
                f,
                "    {name}: accepted={} confirmed={} held={} rejected={} suspect={} revised={}",
                q.accepted, q.confirmed, q.held, q.rejected, q.suspect, q.revised_frames
            )?;
            writeln!(
                f,
                "    {:width$}  expired={} superseded={} low_confidence={} ignored={} unresolved={}",
                "",
                q.suspect_expired,
                q.suspect_superseded,
                q.low_confidence,
                q.ignored_after_freeze,
                q.unresolved_frames,
                width = name.len()
            )?;
        }
        write!(f, "}}")
    }
}

//! Running per-field belief.
//!
//! # Invariants
//!
//! - The accepted value only moves through [`FieldBelief::accept`].
//! - The suspect buffer only holds readings taken after the last acceptance,
//!   and never more than `window` of them.
//! - A buffered reading lives for at most `window` processed frames, so any
//!   retroactive revision reaches back at most `window` frames.

use std::collections::VecDeque;

use gsr_schemas::{FieldValue, FrameIndex};

/// A SUSPECT reading waiting for corroboration.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingReading {
    pub frame: FrameIndex,
    /// Ordinal of the processed frame this reading came from.
    pub seq: u64,
    pub value: FieldValue,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldBelief {
    accepted: Option<(FieldValue, FrameIndex)>,
    pending: VecDeque<PendingReading>,
    window: usize,
}

impl FieldBelief {
    pub fn new(window: usize) -> Self {
        Self {
            accepted: None,
            pending: VecDeque::with_capacity(window),
            window,
        }
    }

    pub fn accepted(&self) -> Option<&FieldValue> {
        self.accepted.as_ref().map(|(v, _)| v)
    }

    pub fn accepted_frame(&self) -> Option<FrameIndex> {
        self.accepted.as_ref().map(|(_, f)| *f)
    }

    /// Frames since the last acceptance (0 when nothing was accepted yet).
    pub fn elapsed_since_accept(&self, frame: FrameIndex) -> u64 {
        self.accepted_frame()
            .map(|f| frame.saturating_sub(f))
            .unwrap_or(0)
    }

    /// A plausibility violation is under investigation.
    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingReading> {
        self.pending.iter()
    }

    pub fn earliest_pending_frame(&self) -> Option<FrameIndex> {
        self.pending.front().map(|p| p.frame)
    }

    /// Move belief to `value` and hand back whatever was buffered.
    pub(crate) fn accept(&mut self, value: FieldValue, frame: FrameIndex) -> Vec<PendingReading> {
        self.accepted = Some((value, frame));
        self.pending.drain(..).collect()
    }

    /// Buffer a SUSPECT reading. Returns the reading evicted to make room,
    /// if the buffer was already full.
    pub(crate) fn push_suspect(&mut self, reading: PendingReading) -> Option<PendingReading> {
        let evicted = if self.pending.len() >= self.window {
            self.pending.pop_front()
        } else {
            None
        };
        self.pending.push_back(reading);
        evicted
    }

    /// Drop buffered readings that have been waiting for `window` or more
    /// processed frames as of `seq`.
    pub(crate) fn expire(&mut self, seq: u64) -> Vec<PendingReading> {
        let mut expired = Vec::new();
        while let Some(front) = self.pending.front() {
            if seq.saturating_sub(front.seq) >= self.window as u64 {
                if let Some(p) = self.pending.pop_front() {
                    expired.push(p);
                }
            } else {
                break;
            }
        }
        expired
    }

    /// Drop everything buffered (stream end or session freeze).
    pub(crate) fn clear_pending(&mut self) -> Vec<PendingReading> {
        self.pending.drain(..).collect()
    }

    /// The value at least `threshold` buffered readings agree on.
    ///
    /// With more than one qualifying value the most frequent wins, then the
    /// one seen most recently.
    pub fn majority(&self, threshold: usize) -> Option<FieldValue> {
        let mut best: Option<(usize, usize, &FieldValue)> = None;
        for (i, p) in self.pending.iter().enumerate() {
            let count = self.pending.iter().filter(|q| q.value == p.value).count();
            if count < threshold {
                continue;
            }
            let better = match best {
                None => true,
                Some((c, last, _)) => count > c || (count == c && i > last),
            };
            if better {
                best = Some((count, i, &p.value));
            }
        }
        best.map(|(_, _, v)| v.clone())
    }
}

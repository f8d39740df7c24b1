//! gsr-timeline
//!
//! Sequence assembly on top of the Reconciler.
//!
//! Architectural decisions:
//! - Frames are emitted incrementally, closing once no revision can reach them
//! - A terminal value freezes the session; the snapshot is replayed afterwards
//! - Fatal errors poison the session and discard the partial timeline
//! - Every reading outcome is counted in a QualityReport

mod assembler;
mod quality;

pub use assembler::{assemble, SessionState, TimelineBuilder, TimelineError};
pub use quality::{FieldQuality, QualityReport};

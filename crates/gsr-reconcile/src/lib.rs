//! gsr-reconcile
//!
//! Streaming reconciliation of noisy per-frame field readings.
//!
//! Architectural decisions:
//! - One FieldModel per field; classification is pure (previous, candidate, elapsed)
//! - Hard violations are REJECT and never buffered
//! - Soft violations are SUSPECT and held until a majority corroborates them
//! - Corroboration rewrites at most `suspect_window` already-emitted frames
//! - Ordering and configuration problems are fatal; reading noise never is
//!
//! Pure deterministic logic. No IO, no wall-clock.

mod belief;
mod engine;
mod model;
mod types;

pub use belief::{FieldBelief, PendingReading};
pub use engine::Reconciler;
pub use model::{FieldModel, FieldModelSet, Monotonicity};
pub use types::*;

//! Adaptive thresholds, learned patterns, and the decision gate.
//!
//! The learning loop lives here: extraction outcomes and human review
//! decisions flow into the [`PatternLearner`], which maintains per-field
//! [`AdaptiveThresholdRecord`]s and [`LearnedPattern`]s; the
//! [`DecisionGate`] reads both to turn confidence scores into terminal
//! decisions. All mutation goes through the learner's per-key update path;
//! the gate and scorer only read.

pub mod gate;
pub mod learner;
pub mod patterns;
pub mod store;

pub use gate::{DecisionGate, GateOutcome, TRUST_MARGIN};
pub use learner::{PatternLearner, SweepReport};
pub use patterns::LearnedPattern;
pub use store::{
    resolve_threshold, AdaptiveThresholdRecord, MemoryThresholdStore, ThresholdSource,
    ThresholdStore, DEFAULT_THRESHOLD, MAX_ADJUSTMENT, MAX_THRESHOLD, MIN_THRESHOLD,
};

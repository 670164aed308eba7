//! The decision gate.
//!
//! Converts one calibrated confidence score into a terminal decision by
//! comparing it against the field's effective threshold. The gate never
//! mutates learning state and never blocks on store availability; a store
//! failure degrades to the hard-coded default threshold.

use crate::learner::PatternLearner;
use crate::store::{resolve_threshold, ThresholdSource, ThresholdStore, MIN_THRESHOLD};
use finsemble_core::{ConfidenceScore, Decision};
use serde::Serialize;
use std::sync::Arc;

/// How far below the raw threshold a trustworthy pattern may still be
/// auto-approved. Earned trust substitutes for per-instance certainty.
pub const TRUST_MARGIN: f64 = 0.05;

/// Gate outcome for one field, with everything an audit needs to
/// reconstruct the decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateOutcome {
    /// Terminal decision.
    pub decision: Decision,
    /// Threshold the score was compared against, after the trust margin.
    pub effective_threshold: f64,
    /// Where the threshold came from.
    pub threshold_source: ThresholdSource,
    /// Trust state of the field's learned pattern; `None` when no
    /// review-backed pattern exists yet.
    pub pattern_trustworthy: Option<bool>,
}

/// Compares confidence scores to adaptive thresholds.
pub struct DecisionGate {
    store: Arc<dyn ThresholdStore>,
    learner: Arc<PatternLearner>,
}

impl DecisionGate {
    /// Create a gate reading from the given store and learner.
    #[must_use]
    pub fn new(store: Arc<dyn ThresholdStore>, learner: Arc<PatternLearner>) -> Self {
        Self { store, learner }
    }

    /// Decide one field.
    ///
    /// * No candidates at all → [`Decision::Unextracted`].
    /// * Score clears the effective threshold and the pattern is either
    ///   trustworthy or not yet learned → [`Decision::AutoApproved`].
    /// * Otherwise → [`Decision::NeedsReview`].
    ///
    /// A trustworthy pattern lowers the bar by [`TRUST_MARGIN`]; a pattern
    /// with review history that has not earned trust forces review
    /// regardless of score. Sighting-only bookkeeping (extractions the
    /// learner tracks for the promotion sweep) does not make a pattern
    /// "known" here; those fields stay on the numeric threshold path.
    #[must_use]
    pub fn decide(
        &self,
        field_key: &str,
        property_id: Option<&str>,
        score: &ConfidenceScore,
        has_candidates: bool,
    ) -> GateOutcome {
        let (threshold, threshold_source) =
            resolve_threshold(self.store.as_ref(), field_key, property_id);

        // A learner failure is treated like an unknown pattern; the numeric
        // threshold path still decides.
        let pattern_trustworthy = match self.learner.pattern(field_key, property_id) {
            Ok(pattern) => pattern
                .filter(|p| p.total_occurrences > 0 || p.is_trustworthy)
                .map(|p| p.is_trustworthy),
            Err(err) => {
                log::warn!("pattern lookup failed for '{field_key}': {err}");
                None
            }
        };

        let effective_threshold = if pattern_trustworthy == Some(true) {
            (threshold - TRUST_MARGIN).max(MIN_THRESHOLD)
        } else {
            threshold
        };

        let decision = if !has_candidates {
            Decision::Unextracted
        } else if score.final_score >= effective_threshold
            && pattern_trustworthy.unwrap_or(true)
        {
            Decision::AutoApproved
        } else {
            Decision::NeedsReview
        };

        GateOutcome {
            decision,
            effective_threshold,
            threshold_source,
            pattern_trustworthy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryThresholdStore, DEFAULT_THRESHOLD};
    use chrono::Utc;
    use finsemble_core::{ReviewFeedback, Scope};

    fn fixture() -> (Arc<MemoryThresholdStore>, Arc<PatternLearner>, DecisionGate) {
        let store = Arc::new(MemoryThresholdStore::new());
        let learner = Arc::new(PatternLearner::new(store.clone()));
        let gate = DecisionGate::new(store.clone(), learner.clone());
        (store, learner, gate)
    }

    fn score(value: f64) -> ConfidenceScore {
        ConfidenceScore::new(value, Vec::new())
    }

    #[test]
    fn test_no_candidates_is_unextracted() {
        let (_, _, gate) = fixture();
        let outcome = gate.decide("4010-0000", None, &score(0.0), false);
        assert_eq!(outcome.decision, Decision::Unextracted);
        assert_eq!(outcome.threshold_source, ThresholdSource::Default);
    }

    #[test]
    fn test_unknown_field_uses_default_threshold() {
        let (_, _, gate) = fixture();
        let outcome = gate.decide("4010-0000", None, &score(0.90), true);
        assert_eq!(outcome.decision, Decision::AutoApproved);
        assert!((outcome.effective_threshold - DEFAULT_THRESHOLD).abs() < f64::EPSILON);
        assert_eq!(outcome.pattern_trustworthy, None);

        let outcome = gate.decide("4010-0000", None, &score(0.80), true);
        assert_eq!(outcome.decision, Decision::NeedsReview);
    }

    #[test]
    fn test_untrusted_pattern_forces_review() {
        let (_, learner, gate) = fixture();
        learner
            .record_extraction("4010-0000", &Scope::Global, 0.9, None, Utc::now())
            .unwrap();
        // Mixed review history: the pattern is known and has not earned
        // trust (reliability 0.5, well below the demotion bar).
        for approved in [true, false] {
            learner
                .record_feedback(&ReviewFeedback {
                    field_key: "4010-0000".to_string(),
                    extraction_confidence_at_time: 0.90,
                    approved,
                    reviewer_id: "analyst-1".to_string(),
                    timestamp: Utc::now(),
                    scope: Scope::Global,
                })
                .unwrap();
        }
        let outcome = gate.decide("4010-0000", None, &score(0.97), true);
        assert_eq!(outcome.pattern_trustworthy, Some(false));
        assert_eq!(outcome.decision, Decision::NeedsReview);
    }

    #[test]
    fn test_sighting_only_pattern_keeps_threshold_path() {
        let (_, learner, gate) = fixture();
        // Repeated extractions without any review create sweep bookkeeping,
        // not a review-backed pattern; the numeric threshold still decides.
        for _ in 0..4 {
            learner
                .record_extraction("4010-0000", &Scope::Global, 0.99, None, Utc::now())
                .unwrap();
        }
        let outcome = gate.decide("4010-0000", None, &score(0.99), true);
        assert_eq!(outcome.pattern_trustworthy, None);
        assert_eq!(outcome.decision, Decision::AutoApproved);

        let outcome = gate.decide("4010-0000", None, &score(0.80), true);
        assert_eq!(outcome.decision, Decision::NeedsReview);
    }

    #[test]
    fn test_trustworthy_pattern_lowers_the_bar() {
        let (_, learner, gate) = fixture();
        learner
            .record_extraction("4010-0000", &Scope::Global, 0.9, None, Utc::now())
            .unwrap();
        for _ in 0..12 {
            learner
                .record_feedback(&ReviewFeedback {
                    field_key: "4010-0000".to_string(),
                    extraction_confidence_at_time: 0.90,
                    approved: true,
                    reviewer_id: "analyst-1".to_string(),
                    timestamp: Utc::now(),
                    scope: Scope::Global,
                })
                .unwrap();
        }

        let outcome = gate.decide("4010-0000", None, &score(0.81), true);
        assert_eq!(outcome.pattern_trustworthy, Some(true));
        // 0.81 is below the 0.85 default but within the trust margin. The
        // twelve identical confidences also mark the field as very stable,
        // shaving the complexity cap off the raw threshold: 0.85 - 0.02 -
        // 0.05 = 0.78.
        assert_eq!(outcome.decision, Decision::AutoApproved);
        assert!((outcome.effective_threshold - 0.78).abs() < 1e-9);
    }

    #[test]
    fn test_adjusted_threshold_drives_the_gate() {
        let (store, _, gate) = fixture();
        store
            .update("4010-0000", &Scope::Global, &mut |r| {
                r.current_threshold = 0.95;
            })
            .unwrap();

        let outcome = gate.decide("4010-0000", None, &score(0.90), true);
        assert_eq!(outcome.decision, Decision::NeedsReview);
        assert_eq!(outcome.threshold_source, ThresholdSource::Global);
    }

    #[test]
    fn test_property_threshold_preferred() {
        let (store, _, gate) = fixture();
        store
            .update("4010-0000", &Scope::Property("prop-17".to_string()), &mut |r| {
                r.current_threshold = 0.78;
            })
            .unwrap();

        let outcome = gate.decide("4010-0000", Some("prop-17"), &score(0.80), true);
        assert_eq!(outcome.threshold_source, ThresholdSource::Property);
        assert_eq!(outcome.decision, Decision::AutoApproved);
    }
}

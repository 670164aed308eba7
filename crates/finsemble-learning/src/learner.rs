//! The pattern learner: the single writer for all learning state.
//!
//! Every mutation of threshold records and learned patterns goes through
//! here, as short read-modify-write transactions on one field-pattern key.
//! Concurrent feedback for different fields never contends; feedback for
//! the same key serializes on the store's per-key update.

use crate::patterns::LearnedPattern;
use crate::store::{ThresholdStore, MAX_ADJUSTMENT};
use chrono::{DateTime, Utc};
use finsemble_core::{FinsembleError, Result, ReviewFeedback, Scope};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Outcome of one background sweep over the pattern set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Patterns promoted to trustworthy from silent sightings.
    pub promoted: usize,
    /// Trustworthy patterns demoted after temporal decay.
    pub demoted: usize,
    /// Patterns whose decayed confidence was inspected.
    pub examined: usize,
}

/// Ingests review feedback and extraction outcomes, updating the threshold
/// store and the learned-pattern set.
pub struct PatternLearner {
    store: Arc<dyn ThresholdStore>,
    patterns: RwLock<HashMap<(String, Scope), LearnedPattern>>,
}

impl PatternLearner {
    /// Create a learner writing through to the given store.
    #[must_use]
    pub fn new(store: Arc<dyn ThresholdStore>) -> Self {
        Self {
            store,
            patterns: RwLock::new(HashMap::new()),
        }
    }

    /// Process one human review decision.
    ///
    /// Updates the pattern's occurrence counts and trust state, then nudges
    /// the threshold when the decision contradicts it: an approval below the
    /// threshold means the bar was too high (nudge down); a rejection at or
    /// above it means the bar was too low (nudge up). Each nudge is bounded
    /// by [`MAX_ADJUSTMENT`].
    ///
    /// # Errors
    /// [`FinsembleError::InconsistentFeedback`] when the field has no
    /// extraction history; callers log and ignore it (orphaned feedback
    /// must not teach anything). Store errors propagate, and the pattern
    /// counters advance only after the store update commits.
    pub fn record_feedback(&self, feedback: &ReviewFeedback) -> Result<()> {
        let key = (feedback.field_key.clone(), feedback.scope.clone());
        if !self.read_patterns()?.contains_key(&key) {
            return Err(FinsembleError::InconsistentFeedback(
                feedback.field_key.clone(),
            ));
        }

        let record = self.store.update(&feedback.field_key, &feedback.scope, &mut |record| {
            record.record_observation(feedback.extraction_confidence_at_time, feedback.approved);
            let threshold = record.current_threshold;
            let confidence = feedback.extraction_confidence_at_time;
            if feedback.approved && confidence < threshold {
                let gap = threshold - confidence;
                record.apply_adjustment(-gap.min(MAX_ADJUSTMENT), feedback.timestamp);
            } else if !feedback.approved && confidence >= threshold {
                let gap = confidence - threshold;
                record.apply_adjustment(gap.max(0.01).min(MAX_ADJUSTMENT), feedback.timestamp);
            }
        })?;

        // Patterns are never removed, so the key checked above still exists.
        if let Some(pattern) = self.write_patterns()?.get_mut(&key) {
            pattern.record_feedback(feedback.approved, feedback.timestamp);
        }
        log::debug!(
            "feedback for '{}': approved={}, threshold now {:.3}",
            feedback.field_key,
            feedback.approved,
            record.current_threshold
        );
        Ok(())
    }

    /// Record one extraction outcome (the forward path, not review).
    ///
    /// Creates the pattern lazily, folds in the sighting, and records label
    /// variations so spelling drift is tracked. This is what gives feedback
    /// an "extraction history" to attach to.
    pub fn record_extraction(
        &self,
        field_key: &str,
        scope: &Scope,
        confidence: f64,
        labels: impl IntoIterator<Item = String>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut patterns = self.write_patterns()?;
        let pattern = patterns
            .entry((field_key.to_string(), scope.clone()))
            .or_insert_with(|| LearnedPattern::new(field_key, scope.clone()));
        pattern.record_sighting(confidence, at);
        for label in labels {
            pattern.record_variation(label);
        }
        Ok(())
    }

    /// Look up the pattern for a field, preferring property scope.
    ///
    /// # Errors
    /// Store/lock failures only; an unknown field is `Ok(None)`.
    pub fn pattern(
        &self,
        field_key: &str,
        property_id: Option<&str>,
    ) -> Result<Option<LearnedPattern>> {
        let patterns = self.read_patterns()?;
        if let Some(id) = property_id {
            let key = (field_key.to_string(), Scope::Property(id.to_string()));
            if let Some(pattern) = patterns.get(&key) {
                return Ok(Some(pattern.clone()));
            }
        }
        Ok(patterns
            .get(&(field_key.to_string(), Scope::Global))
            .cloned())
    }

    /// Background sweep: promote patterns that earned trust silently and
    /// demote trustworthy ones whose confidence has decayed away.
    ///
    /// Runs on a schedule, never on the request path.
    ///
    /// # Errors
    /// Lock failures only.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let mut patterns = self.write_patterns()?;
        for pattern in patterns.values_mut() {
            report.examined += 1;
            if pattern.qualifies_for_promotion(now) {
                pattern.is_trustworthy = true;
                report.promoted += 1;
                log::info!(
                    "promoted '{}' ({}): {} sightings at {:.2} mean confidence",
                    pattern.field_key,
                    pattern.scope,
                    pattern.sightings,
                    pattern.mean_sighting_confidence
                );
                continue;
            }
            // Trust earned from sightings alone evaporates as the pattern
            // goes stale; trust backed by explicit approvals does not decay.
            let earned_by_review = pattern.total_occurrences >= crate::patterns::TRUST_OCCURRENCES
                && pattern.reliability_score >= crate::patterns::TRUST_RELIABILITY;
            if pattern.is_trustworthy
                && !earned_by_review
                && pattern.decayed_confidence(now) < crate::patterns::PROMOTION_CONFIDENCE
            {
                pattern.is_trustworthy = false;
                report.demoted += 1;
                log::info!("demoted stale pattern '{}'", pattern.field_key);
            }
        }
        Ok(report)
    }

    fn read_patterns(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<(String, Scope), LearnedPattern>>> {
        self.patterns
            .read()
            .map_err(|_| FinsembleError::StoreUnavailable("poisoned pattern lock".to_string()))
    }

    fn write_patterns(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<(String, Scope), LearnedPattern>>> {
        self.patterns
            .write()
            .map_err(|_| FinsembleError::StoreUnavailable("poisoned pattern lock".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AdaptiveThresholdRecord, MemoryThresholdStore, DEFAULT_THRESHOLD};
    use chrono::Duration;

    fn learner() -> PatternLearner {
        PatternLearner::new(Arc::new(MemoryThresholdStore::new()))
    }

    fn feedback(field_key: &str, confidence: f64, approved: bool) -> ReviewFeedback {
        ReviewFeedback {
            field_key: field_key.to_string(),
            extraction_confidence_at_time: confidence,
            approved,
            reviewer_id: "analyst-1".to_string(),
            timestamp: Utc::now(),
            scope: Scope::Global,
        }
    }

    fn seed(learner: &PatternLearner, field_key: &str) {
        learner
            .record_extraction(field_key, &Scope::Global, 0.9, None, Utc::now())
            .unwrap();
    }

    #[test]
    fn test_orphaned_feedback_is_rejected() {
        let l = learner();
        let err = l.record_feedback(&feedback("never-extracted", 0.9, true));
        assert!(matches!(
            err,
            Err(FinsembleError::InconsistentFeedback(key)) if key == "never-extracted"
        ));
    }

    #[test]
    fn test_store_failure_leaves_pattern_untouched() {
        struct DownStore;
        impl ThresholdStore for DownStore {
            fn get(&self, _: &str, _: &Scope) -> Result<Option<AdaptiveThresholdRecord>> {
                Ok(None)
            }
            fn update(
                &self,
                _: &str,
                _: &Scope,
                _: &mut dyn FnMut(&mut AdaptiveThresholdRecord),
            ) -> Result<AdaptiveThresholdRecord> {
                Err(FinsembleError::StoreUnavailable("down".to_string()))
            }
        }

        let l = PatternLearner::new(Arc::new(DownStore));
        seed(&l, "4010-0000");
        let err = l.record_feedback(&feedback("4010-0000", 0.9, true));
        assert!(matches!(err, Err(FinsembleError::StoreUnavailable(_))));

        // The failed transaction must not have advanced the counters.
        let pattern = l.pattern("4010-0000", None).unwrap().unwrap();
        assert_eq!(pattern.total_occurrences, 0);
        assert_eq!(pattern.approved_count, 0);
    }

    #[test]
    fn test_conservative_engine_nudges_threshold_down() {
        let l = learner();
        seed(&l, "4010-0000");
        // Approved at 0.80, below the 0.85 default: the bar was too high.
        l.record_feedback(&feedback("4010-0000", 0.80, true)).unwrap();

        let record = l.store.get("4010-0000", &Scope::Global).unwrap().unwrap();
        assert!(record.current_threshold < DEFAULT_THRESHOLD);
        assert!(record.last_adjustment_delta < 0.0);
    }

    #[test]
    fn test_permissive_engine_nudges_threshold_up() {
        let l = learner();
        seed(&l, "4010-0000");
        // Rejected at 0.92, above the threshold: the bar was too low.
        l.record_feedback(&feedback("4010-0000", 0.92, false)).unwrap();

        let record = l.store.get("4010-0000", &Scope::Global).unwrap().unwrap();
        assert!(record.current_threshold > DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_agreeing_feedback_leaves_threshold_alone() {
        let l = learner();
        seed(&l, "4010-0000");
        // Approved above threshold: the gate was right, nothing to learn.
        l.record_feedback(&feedback("4010-0000", 0.95, true)).unwrap();

        let record = l.store.get("4010-0000", &Scope::Global).unwrap().unwrap();
        assert!((record.current_threshold - DEFAULT_THRESHOLD).abs() < f64::EPSILON);
        assert!(record.last_adjustment_at.is_none());
    }

    #[test]
    fn test_single_event_adjustment_is_bounded() {
        let l = learner();
        seed(&l, "4010-0000");
        // A huge gap still moves the threshold by at most the cap.
        l.record_feedback(&feedback("4010-0000", 0.10, true)).unwrap();

        let record = l.store.get("4010-0000", &Scope::Global).unwrap().unwrap();
        assert!((record.current_threshold - (DEFAULT_THRESHOLD - MAX_ADJUSTMENT)).abs() < 1e-9);
    }

    #[test]
    fn test_feedback_updates_pattern_counts() {
        let l = learner();
        seed(&l, "4010-0000");
        l.record_feedback(&feedback("4010-0000", 0.9, true)).unwrap();
        l.record_feedback(&feedback("4010-0000", 0.9, false)).unwrap();

        let pattern = l.pattern("4010-0000", None).unwrap().unwrap();
        assert_eq!(pattern.total_occurrences, 2);
        assert_eq!(pattern.approved_count, 1);
        assert_eq!(pattern.rejected_count, 1);
    }

    #[test]
    fn test_property_pattern_shadows_global() {
        let l = learner();
        let property = Scope::Property("prop-17".to_string());
        l.record_extraction("4010-0000", &Scope::Global, 0.9, None, Utc::now())
            .unwrap();
        l.record_extraction("4010-0000", &property, 0.7, None, Utc::now())
            .unwrap();

        let found = l.pattern("4010-0000", Some("prop-17")).unwrap().unwrap();
        assert_eq!(found.scope, property);
        let found = l.pattern("4010-0000", None).unwrap().unwrap();
        assert_eq!(found.scope, Scope::Global);
    }

    #[test]
    fn test_sweep_promotes_silent_high_confidence_fields() {
        let l = learner();
        let now = Utc::now();
        for _ in 0..12 {
            l.record_extraction("4010-0000", &Scope::Global, 0.94, None, now)
                .unwrap();
        }
        let report = l.sweep(now).unwrap();
        assert_eq!(report.promoted, 1);
        assert!(l.pattern("4010-0000", None).unwrap().unwrap().is_trustworthy);
    }

    #[test]
    fn test_sweep_demotes_stale_sighting_trust() {
        let l = learner();
        let long_ago = Utc::now() - Duration::days(400);
        for _ in 0..12 {
            l.record_extraction("4010-0000", &Scope::Global, 0.94, None, long_ago)
                .unwrap();
        }
        // Promoted while fresh.
        let report = l.sweep(long_ago).unwrap();
        assert_eq!(report.promoted, 1);

        // Much later the sighting confidence has decayed away.
        let report = l.sweep(Utc::now()).unwrap();
        assert_eq!(report.demoted, 1);
        assert!(!l.pattern("4010-0000", None).unwrap().unwrap().is_trustworthy);
    }

    #[test]
    fn test_sweep_keeps_review_backed_trust() {
        let l = learner();
        let long_ago = Utc::now() - Duration::days(400);
        seed(&l, "4010-0000");
        for _ in 0..12 {
            let mut fb = feedback("4010-0000", 0.9, true);
            fb.timestamp = long_ago;
            l.record_feedback(&fb).unwrap();
        }
        let report = l.sweep(Utc::now()).unwrap();
        assert_eq!(report.demoted, 0);
        assert!(l.pattern("4010-0000", None).unwrap().unwrap().is_trustworthy);
    }

    #[test]
    fn test_extraction_records_label_variations() {
        let l = learner();
        l.record_extraction(
            "4010-0000",
            &Scope::Global,
            0.9,
            vec!["Rental Income".to_string(), "Rental  Income".to_string()],
            Utc::now(),
        )
        .unwrap();
        let pattern = l.pattern("4010-0000", None).unwrap().unwrap();
        assert_eq!(pattern.common_value_variations.len(), 2);
    }
}

//! Adaptive threshold store.
//!
//! Each field pattern carries its own acceptance threshold, adjusted over
//! time by small bounded deltas as review feedback arrives. The store is an
//! explicit, injectable dependency rather than process-wide state, so the
//! decision path is testable and a persistent backend can be swapped in
//! behind the same trait.

use chrono::{DateTime, Utc};
use finsemble_core::{FinsembleError, Result, Scope};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Hard-coded global default threshold, used when no record exists or the
/// store is unavailable.
pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// Lowest value any threshold can reach.
pub const MIN_THRESHOLD: f64 = 0.75;

/// Highest value any threshold can reach.
pub const MAX_THRESHOLD: f64 = 0.98;

/// Largest change a single adjustment event may apply.
pub const MAX_ADJUSTMENT: f64 = 0.05;

/// Largest amount the complexity score may move the effective threshold.
pub const COMPLEXITY_CAP: f64 = 0.02;

/// Per-field-pattern learning state.
///
/// Created lazily on first observation; mutated only by the pattern
/// learner's single-writer update path; never deleted, only decayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveThresholdRecord {
    /// Canonical field key.
    pub field_key: String,
    /// Global or property-specific.
    pub scope: Scope,
    /// Current acceptance threshold, in `[MIN_THRESHOLD, MAX_THRESHOLD]`.
    pub current_threshold: f64,
    /// Extractions observed for this pattern.
    pub total_observations: u64,
    /// Observations later confirmed correct.
    pub successful_observations: u64,
    /// `successful_observations / total_observations`.
    pub historical_accuracy: f64,
    /// When the threshold was last adjusted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_adjustment_at: Option<DateTime<Utc>>,
    /// Signed delta of the last adjustment.
    pub last_adjustment_delta: f64,
    /// Noisiness of this field, in [0, 1]; 0.5 is neutral. Derived from the
    /// historical variance of confidence via Welford accumulators below.
    pub complexity_score: f64,
    /// Running mean of observed confidence.
    pub confidence_mean: f64,
    /// Welford M2 accumulator for confidence variance.
    pub confidence_m2: f64,
}

impl AdaptiveThresholdRecord {
    /// Fresh record at the default threshold with no history.
    #[must_use]
    pub fn new(field_key: impl Into<String>, scope: Scope) -> Self {
        Self {
            field_key: field_key.into(),
            scope,
            current_threshold: DEFAULT_THRESHOLD,
            total_observations: 0,
            successful_observations: 0,
            historical_accuracy: 0.0,
            last_adjustment_at: None,
            last_adjustment_delta: 0.0,
            complexity_score: 0.5,
            confidence_mean: 0.0,
            confidence_m2: 0.0,
        }
    }

    /// Apply a bounded threshold adjustment.
    ///
    /// The delta is capped to [`MAX_ADJUSTMENT`] in magnitude and the result
    /// clamped to `[MIN_THRESHOLD, MAX_THRESHOLD]`; the recorded delta is
    /// what was actually applied after both bounds.
    pub fn apply_adjustment(&mut self, delta: f64, at: DateTime<Utc>) {
        let bounded = delta.clamp(-MAX_ADJUSTMENT, MAX_ADJUSTMENT);
        let adjusted = (self.current_threshold + bounded).clamp(MIN_THRESHOLD, MAX_THRESHOLD);
        self.last_adjustment_delta = adjusted - self.current_threshold;
        self.current_threshold = adjusted;
        self.last_adjustment_at = Some(at);
    }

    /// Fold one observed extraction into the accuracy and variance stats.
    pub fn record_observation(&mut self, confidence: f64, successful: bool) {
        self.total_observations += 1;
        if successful {
            self.successful_observations += 1;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            self.historical_accuracy =
                self.successful_observations as f64 / self.total_observations as f64;
            let n = self.total_observations as f64;
            let delta = confidence - self.confidence_mean;
            self.confidence_mean += delta / n;
            self.confidence_m2 += delta * (confidence - self.confidence_mean);
            if self.total_observations >= 2 {
                let stddev = (self.confidence_m2 / (n - 1.0)).sqrt();
                // Stddev 0.125 maps to the neutral 0.5.
                self.complexity_score = (stddev * 4.0).clamp(0.0, 1.0);
            }
        }
    }

    /// Threshold after the complexity adjustment.
    ///
    /// Noisy fields (complexity above neutral) demand a higher bar; stable
    /// fields earn a slightly lower one. The shift is capped at
    /// [`COMPLEXITY_CAP`] either way.
    #[must_use]
    pub fn effective_threshold(&self) -> f64 {
        let shift = (self.complexity_score.clamp(0.0, 1.0) - 0.5) * 2.0 * COMPLEXITY_CAP;
        (self.current_threshold + shift).clamp(MIN_THRESHOLD, MAX_THRESHOLD)
    }
}

/// Read/update contract for threshold state.
///
/// Updates are scoped to one field-pattern key; unrelated fields never
/// contend. Implementations must be safe to share across threads.
pub trait ThresholdStore: Send + Sync {
    /// Fetch the record for one key and scope, if it exists.
    fn get(&self, field_key: &str, scope: &Scope) -> Result<Option<AdaptiveThresholdRecord>>;

    /// Read-modify-write one record, creating it at defaults if absent.
    /// Returns the record after the update.
    fn update(
        &self,
        field_key: &str,
        scope: &Scope,
        apply: &mut dyn FnMut(&mut AdaptiveThresholdRecord),
    ) -> Result<AdaptiveThresholdRecord>;
}

/// In-memory store used in production for the process lifetime and in tests.
#[derive(Debug, Default)]
pub struct MemoryThresholdStore {
    records: RwLock<HashMap<(String, Scope), AdaptiveThresholdRecord>>,
}

impl MemoryThresholdStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ThresholdStore for MemoryThresholdStore {
    fn get(&self, field_key: &str, scope: &Scope) -> Result<Option<AdaptiveThresholdRecord>> {
        let records = self
            .records
            .read()
            .map_err(|_| FinsembleError::StoreUnavailable("poisoned lock".to_string()))?;
        Ok(records.get(&(field_key.to_string(), scope.clone())).cloned())
    }

    fn update(
        &self,
        field_key: &str,
        scope: &Scope,
        apply: &mut dyn FnMut(&mut AdaptiveThresholdRecord),
    ) -> Result<AdaptiveThresholdRecord> {
        let mut records = self
            .records
            .write()
            .map_err(|_| FinsembleError::StoreUnavailable("poisoned lock".to_string()))?;
        let record = records
            .entry((field_key.to_string(), scope.clone()))
            .or_insert_with(|| AdaptiveThresholdRecord::new(field_key, scope.clone()));
        apply(record);
        Ok(record.clone())
    }
}

/// Resolve the effective threshold for one field.
///
/// Lookup order: property-specific record, then global record, then the
/// hard-coded default. A store failure falls back to the default and is
/// logged; decisions are never blocked on store availability.
#[must_use]
pub fn resolve_threshold(
    store: &dyn ThresholdStore,
    field_key: &str,
    property_id: Option<&str>,
) -> (f64, ThresholdSource) {
    let mut scopes = Vec::with_capacity(2);
    if let Some(id) = property_id {
        scopes.push((Scope::Property(id.to_string()), ThresholdSource::Property));
    }
    scopes.push((Scope::Global, ThresholdSource::Global));

    for (scope, source) in scopes {
        match store.get(field_key, &scope) {
            Ok(Some(record)) => return (record.effective_threshold(), source),
            Ok(None) => {}
            Err(err) => {
                log::warn!("threshold lookup failed for '{field_key}': {err}; using default");
                return (DEFAULT_THRESHOLD, ThresholdSource::Default);
            }
        }
    }
    (DEFAULT_THRESHOLD, ThresholdSource::Default)
}

/// Where an effective threshold came from, kept for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdSource {
    /// Property-specific learned record.
    Property,
    /// Global learned record.
    Global,
    /// Hard-coded default (no record, or store unavailable).
    Default,
}

impl std::fmt::Display for ThresholdSource {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Property => write!(f, "property"),
            Self::Global => write!(f, "global"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_at_default() {
        let record = AdaptiveThresholdRecord::new("4010-0000", Scope::Global);
        assert!((record.current_threshold - DEFAULT_THRESHOLD).abs() < f64::EPSILON);
        assert_eq!(record.total_observations, 0);
        assert!((record.effective_threshold() - DEFAULT_THRESHOLD).abs() < f64::EPSILON);
    }

    #[test]
    fn test_adjustment_is_capped_per_event() {
        let mut record = AdaptiveThresholdRecord::new("x", Scope::Global);
        record.apply_adjustment(0.30, Utc::now());
        assert!((record.current_threshold - (DEFAULT_THRESHOLD + MAX_ADJUSTMENT)).abs() < 1e-9);
        assert!((record.last_adjustment_delta - MAX_ADJUSTMENT).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_stays_within_bounds() {
        let mut record = AdaptiveThresholdRecord::new("x", Scope::Global);
        for _ in 0..10 {
            record.apply_adjustment(-MAX_ADJUSTMENT, Utc::now());
        }
        assert!((record.current_threshold - MIN_THRESHOLD).abs() < f64::EPSILON);

        for _ in 0..20 {
            record.apply_adjustment(MAX_ADJUSTMENT, Utc::now());
        }
        assert!((record.current_threshold - MAX_THRESHOLD).abs() < f64::EPSILON);
    }

    #[test]
    fn test_recorded_delta_reflects_clamping() {
        let mut record = AdaptiveThresholdRecord::new("x", Scope::Global);
        record.current_threshold = MAX_THRESHOLD - 0.01;
        record.apply_adjustment(0.05, Utc::now());
        assert!((record.current_threshold - MAX_THRESHOLD).abs() < f64::EPSILON);
        assert!((record.last_adjustment_delta - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_observation_accuracy() {
        let mut record = AdaptiveThresholdRecord::new("x", Scope::Global);
        record.record_observation(0.90, true);
        record.record_observation(0.90, true);
        record.record_observation(0.90, false);
        assert_eq!(record.total_observations, 3);
        assert_eq!(record.successful_observations, 2);
        assert!((record.historical_accuracy - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_complexity_tracks_confidence_variance() {
        let mut stable = AdaptiveThresholdRecord::new("stable", Scope::Global);
        for _ in 0..10 {
            stable.record_observation(0.90, true);
        }
        let mut noisy = AdaptiveThresholdRecord::new("noisy", Scope::Global);
        for confidence in [0.30, 0.95, 0.40, 0.92, 0.35, 0.97, 0.45, 0.90] {
            noisy.record_observation(confidence, true);
        }
        assert!(stable.complexity_score < noisy.complexity_score);
        // Noisy fields demand a higher effective threshold.
        assert!(noisy.effective_threshold() > stable.effective_threshold());
    }

    #[test]
    fn test_complexity_shift_is_capped() {
        let mut record = AdaptiveThresholdRecord::new("x", Scope::Global);
        record.complexity_score = 1.0;
        assert!((record.effective_threshold() - (DEFAULT_THRESHOLD + COMPLEXITY_CAP)).abs() < 1e-9);
        record.complexity_score = 0.0;
        assert!((record.effective_threshold() - (DEFAULT_THRESHOLD - COMPLEXITY_CAP)).abs() < 1e-9);
    }

    #[test]
    fn test_memory_store_lazy_creation() {
        let store = MemoryThresholdStore::new();
        assert!(store.get("4010-0000", &Scope::Global).unwrap().is_none());

        let record = store
            .update("4010-0000", &Scope::Global, &mut |r| {
                r.record_observation(0.92, true);
            })
            .unwrap();
        assert_eq!(record.total_observations, 1);
        assert!(store.get("4010-0000", &Scope::Global).unwrap().is_some());
    }

    #[test]
    fn test_scopes_are_independent_keys() {
        let store = MemoryThresholdStore::new();
        let property = Scope::Property("prop-17".to_string());
        store
            .update("4010-0000", &property, &mut |r| {
                r.apply_adjustment(-0.05, Utc::now());
            })
            .unwrap();
        assert!(store.get("4010-0000", &Scope::Global).unwrap().is_none());
        assert!(store.get("4010-0000", &property).unwrap().is_some());
    }

    #[test]
    fn test_resolve_prefers_property_over_global() {
        let store = MemoryThresholdStore::new();
        store
            .update("4010-0000", &Scope::Global, &mut |r| {
                r.current_threshold = 0.90;
            })
            .unwrap();
        store
            .update("4010-0000", &Scope::Property("prop-17".to_string()), &mut |r| {
                r.current_threshold = 0.80;
            })
            .unwrap();

        let (threshold, source) = resolve_threshold(&store, "4010-0000", Some("prop-17"));
        assert!((threshold - 0.80).abs() < f64::EPSILON);
        assert_eq!(source, ThresholdSource::Property);

        let (threshold, source) = resolve_threshold(&store, "4010-0000", None);
        assert!((threshold - 0.90).abs() < f64::EPSILON);
        assert_eq!(source, ThresholdSource::Global);
    }

    #[test]
    fn test_resolve_falls_back_to_default() {
        let store = MemoryThresholdStore::new();
        let (threshold, source) = resolve_threshold(&store, "never-seen", Some("prop-17"));
        assert!((threshold - DEFAULT_THRESHOLD).abs() < f64::EPSILON);
        assert_eq!(source, ThresholdSource::Default);
    }

    #[test]
    fn test_resolve_survives_store_failure() {
        struct BrokenStore;
        impl ThresholdStore for BrokenStore {
            fn get(&self, _: &str, _: &Scope) -> Result<Option<AdaptiveThresholdRecord>> {
                Err(FinsembleError::StoreUnavailable("down".to_string()))
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

        let (threshold, source) = resolve_threshold(&BrokenStore, "4010-0000", None);
        assert!((threshold - DEFAULT_THRESHOLD).abs() < f64::EPSILON);
        assert_eq!(source, ThresholdSource::Default);
    }

    #[test]
    fn test_record_serde_roundtrip() {
        let mut record = AdaptiveThresholdRecord::new("4010-0000", Scope::Global);
        record.record_observation(0.9, true);
        let json = serde_json::to_string(&record).unwrap();
        let back: AdaptiveThresholdRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}

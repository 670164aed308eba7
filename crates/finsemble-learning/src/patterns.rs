//! Learned field patterns.
//!
//! A pattern accumulates human approve/reject decisions plus silent
//! high-confidence sightings for one field key. Trustworthiness drives
//! auto-approval eligibility independently of the numeric threshold path.

use chrono::{DateTime, Duration, Utc};
use finsemble_core::Scope;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Reliability at or above which a pattern can become trustworthy.
pub const TRUST_RELIABILITY: f64 = 0.95;

/// Occurrences required before trustworthiness is considered.
pub const TRUST_OCCURRENCES: u64 = 10;

/// Reliability below which a trustworthy pattern is demoted immediately.
pub const DEMOTION_RELIABILITY: f64 = 0.90;

/// Sightings required for promotion without explicit approvals.
pub const PROMOTION_SIGHTINGS: u64 = 10;

/// Mean sighting confidence required for promotion.
pub const PROMOTION_CONFIDENCE: f64 = 0.90;

/// Age beyond which sighting confidence starts to decay.
pub const DECAY_GRACE_DAYS: i64 = 30;

/// Half-life of sighting confidence once decay starts.
pub const DECAY_HALF_LIFE_DAYS: f64 = 90.0;

/// Accumulated knowledge about one field pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedPattern {
    /// Canonical field key.
    pub field_key: String,
    /// Global or property-specific.
    pub scope: Scope,
    /// Review decisions processed for this pattern.
    pub total_occurrences: u64,
    /// Approvals among those decisions.
    pub approved_count: u64,
    /// Rejections among those decisions.
    pub rejected_count: u64,
    /// `approved_count / total_occurrences`; 0 before any feedback.
    pub reliability_score: f64,
    /// Whether this pattern may bypass per-instance review.
    pub is_trustworthy: bool,
    /// Label spellings observed for this field across engines.
    pub common_value_variations: BTreeSet<String>,
    /// Extractions seen without going through review.
    pub sightings: u64,
    /// Running mean confidence of those sightings, subject to decay.
    pub mean_sighting_confidence: f64,
    /// Last time this pattern was touched by feedback or a sighting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl LearnedPattern {
    /// Fresh pattern with no history.
    #[must_use]
    pub fn new(field_key: impl Into<String>, scope: Scope) -> Self {
        Self {
            field_key: field_key.into(),
            scope,
            total_occurrences: 0,
            approved_count: 0,
            rejected_count: 0,
            reliability_score: 0.0,
            is_trustworthy: false,
            common_value_variations: BTreeSet::new(),
            sightings: 0,
            mean_sighting_confidence: 0.0,
            last_seen_at: None,
        }
    }

    /// Fold one review decision into the pattern.
    pub fn record_feedback(&mut self, approved: bool, at: DateTime<Utc>) {
        self.total_occurrences += 1;
        if approved {
            self.approved_count += 1;
        } else {
            self.rejected_count += 1;
        }
        self.last_seen_at = Some(at);
        self.recompute_trust();
    }

    /// Fold one extraction sighting (an extraction that never hit review).
    pub fn record_sighting(&mut self, confidence: f64, at: DateTime<Utc>) {
        self.sightings += 1;
        #[allow(clippy::cast_precision_loss)]
        {
            let n = self.sightings as f64;
            self.mean_sighting_confidence += (confidence - self.mean_sighting_confidence) / n;
        }
        self.last_seen_at = Some(at);
    }

    /// Record a label spelling variant for this field.
    pub fn record_variation(&mut self, label: impl Into<String>) {
        self.common_value_variations.insert(label.into());
    }

    /// Recompute reliability and the trustworthiness flag.
    ///
    /// Trust is gained at ≥ [`TRUST_RELIABILITY`] over ≥
    /// [`TRUST_OCCURRENCES`] decisions, lost immediately below
    /// [`DEMOTION_RELIABILITY`], and otherwise keeps its current state (the
    /// band between the two bars is hysteresis, not a third outcome).
    fn recompute_trust(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        if self.total_occurrences > 0 {
            self.reliability_score = self.approved_count as f64 / self.total_occurrences as f64;
        }
        if self.total_occurrences >= TRUST_OCCURRENCES
            && self.reliability_score >= TRUST_RELIABILITY
        {
            self.is_trustworthy = true;
        } else if self.total_occurrences > 0 && self.reliability_score < DEMOTION_RELIABILITY {
            self.is_trustworthy = false;
        }
    }

    /// Sighting confidence after temporal decay.
    ///
    /// Flat for [`DECAY_GRACE_DAYS`], then exponential with a
    /// [`DECAY_HALF_LIFE_DAYS`] half-life: document formats drift, so an
    /// untouched pattern slowly loses its claim to auto-approval.
    #[must_use]
    pub fn decayed_confidence(&self, now: DateTime<Utc>) -> f64 {
        let Some(last_seen) = self.last_seen_at else {
            return self.mean_sighting_confidence;
        };
        let age = now.signed_duration_since(last_seen);
        if age <= Duration::days(DECAY_GRACE_DAYS) {
            return self.mean_sighting_confidence;
        }
        #[allow(clippy::cast_precision_loss)]
        let excess_days = (age - Duration::days(DECAY_GRACE_DAYS)).num_days() as f64;
        self.mean_sighting_confidence * 0.5_f64.powf(excess_days / DECAY_HALF_LIFE_DAYS)
    }

    /// Whether this pattern qualifies for sweep promotion: enough silent
    /// sightings at high enough (decay-adjusted) confidence, no rejections
    /// weighing against it.
    #[must_use]
    pub fn qualifies_for_promotion(&self, now: DateTime<Utc>) -> bool {
        !self.is_trustworthy
            && self.rejected_count == 0
            && self.sightings >= PROMOTION_SIGHTINGS
            && self.decayed_confidence(now) >= PROMOTION_CONFIDENCE
    }
}

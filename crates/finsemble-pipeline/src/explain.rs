//! Per-field decision explanations.
//!
//! Every decision the pipeline makes must be reconstructible after the
//! fact: which engines agreed, which boosts fired, what threshold the score
//! was compared against and where that threshold came from. This module
//! assembles that audit trail into one serializable record per field.

use finsemble_core::{Boost, ConfidenceScore, Decision, EngineId, FieldConsensus};
use finsemble_learning::{GateOutcome, ThresholdSource};
use serde::Serialize;
use std::collections::BTreeSet;

/// The full audit trail for one field's score and decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldExplanation {
    /// Canonical field key.
    pub field_key: String,
    /// Score before boosts.
    pub base_score: f64,
    /// Every boost applied, in order.
    pub boosts: Vec<Boost>,
    /// Clamped final score.
    pub final_score: f64,
    /// Agreement percentage across attempted engines.
    pub agreement_percentage: f64,
    /// Engines that matched the consensus value.
    pub contributing_engines: BTreeSet<EngineId>,
    /// Engines that reported a different value.
    pub dissenting_engines: BTreeSet<EngineId>,
    /// Threshold the score was compared against.
    pub effective_threshold: f64,
    /// Where that threshold came from.
    pub threshold_source: ThresholdSource,
    /// Trust state of the learned pattern, if one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_trustworthy: Option<bool>,
    /// The decision all of the above produced.
    pub decision: Decision,
}

impl FieldExplanation {
    /// Assemble the audit trail for a scored and gated field.
    #[must_use]
    pub fn assemble(
        consensus: &FieldConsensus,
        score: &ConfidenceScore,
        outcome: &GateOutcome,
    ) -> Self {
        Self {
            field_key: consensus.field_key.clone(),
            base_score: score.base_score,
            boosts: score.boosts.clone(),
            final_score: score.final_score,
            agreement_percentage: consensus.agreement_percentage,
            contributing_engines: consensus.contributing_engines.clone(),
            dissenting_engines: consensus.dissenting_engines.clone(),
            effective_threshold: outcome.effective_threshold,
            threshold_source: outcome.threshold_source,
            pattern_trustworthy: outcome.pattern_trustworthy,
            decision: outcome.decision,
        }
    }

    /// Audit trail for a field no engine reported.
    #[must_use]
    pub fn unextracted(field_key: String, outcome: &GateOutcome) -> Self {
        Self {
            field_key,
            base_score: 0.0,
            boosts: Vec::new(),
            final_score: 0.0,
            agreement_percentage: 0.0,
            contributing_engines: BTreeSet::new(),
            dissenting_engines: BTreeSet::new(),
            effective_threshold: outcome.effective_threshold,
            threshold_source: outcome.threshold_source,
            pattern_trustworthy: outcome.pattern_trustworthy,
            decision: outcome.decision,
        }
    }
}

impl std::fmt::Display for FieldExplanation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{}: {} (score {:.3} vs threshold {:.3} [{}])",
            self.field_key,
            self.decision,
            self.final_score,
            self.effective_threshold,
            self.threshold_source
        )?;
        writeln!(
            f,
            "  agreement {:.1}% ({} for, {} against)",
            self.agreement_percentage,
            self.contributing_engines.len(),
            self.dissenting_engines.len()
        )?;
        writeln!(f, "  base {:.3}", self.base_score)?;
        for boost in &self.boosts {
            writeln!(f, "  +{:.3} {} ({})", boost.amount, boost.kind, boost.reason)?;
        }
        if let Some(trustworthy) = self.pattern_trustworthy {
            writeln!(
                f,
                "  pattern: {}",
                if trustworthy { "trustworthy" } else { "not yet trusted" }
            )?;
        }
        Ok(())
    }
}

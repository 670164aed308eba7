//! Calibrated confidence scoring.
//!
//! Two scoring paths share the same additive boost machinery:
//!
//! * [`score_field`] — extraction confidence for one [`FieldConsensus`]. The
//!   base is the agreement ratio itself (agreement is the primary signal);
//!   historical accuracy and recent confirmation add fractions of the
//!   remaining headroom.
//! * [`score_metric`] — confidence that a computed metric (for example a
//!   variance anomaly) is genuine rather than noise. The base is a fixed
//!   0.70 floor; banded boosts for deviation magnitude, statistical
//!   significance, history depth, and severity stack on top.
//!
//! Every boost is retained on the resulting [`ConfidenceScore`], not just
//! the sum, so the decision gate and any later audit can reconstruct why a
//! score was produced. The total is always clamped to
//! [`CONFIDENCE_CEILING`]; a score of 1.00 is unrepresentable on purpose.

use chrono::{DateTime, Duration, Utc};
use finsemble_core::{
    Boost, BoostKind, ConfidenceScore, FieldConsensus, Severity, CONFIDENCE_CEILING,
};

/// Base score for metric/anomaly-style confidence.
pub const METRIC_BASE: f64 = 0.70;

/// Minimum threshold-record observations before historical accuracy is
/// trusted enough to move a score.
pub const MIN_ACCURACY_OBSERVATIONS: usize = 5;

/// Confirmations older than this earn no recency boost.
pub const RECENCY_WINDOW_DAYS: i64 = 30;

/// Historical signals for one field, read from the adaptive threshold
/// store. All zero/none for a field never seen before.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FieldSignals {
    /// Fraction of past extractions for this field confirmed correct.
    pub historical_accuracy: f64,
    /// How many observations back that accuracy figure.
    pub observations: usize,
    /// Most recent human approval or high-confidence sighting.
    pub last_confirmed_at: Option<DateTime<Utc>>,
}

/// Context for scoring a computed metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricContext {
    /// Relative change against the historical baseline, in percent.
    pub relative_change_pct: f64,
    /// Z-score of the deviation, when computable.
    pub z_score: Option<f64>,
    /// Number of historical periods backing the baseline.
    pub historical_periods: usize,
    /// Severity classification of the finding.
    pub severity: Severity,
    /// Engines that independently derived the same metric, when the metric
    /// came out of the ensemble rather than a single computation.
    pub agreeing_engines: Option<usize>,
}

/// Score one field's extraction confidence.
#[must_use]
pub fn score_field(
    consensus: &FieldConsensus,
    signals: &FieldSignals,
    now: DateTime<Utc>,
) -> ConfidenceScore {
    let base = consensus.agreement_percentage / 100.0;
    let mut boosts = Vec::new();

    if let Some(boost) = historical_accuracy_boost(base, signals) {
        boosts.push(boost);
    }
    if let Some(boost) = temporal_recency_boost(base, signals, now) {
        boosts.push(boost);
    }

    ConfidenceScore::new(base, boosts)
}

/// Score a computed metric.
#[must_use]
pub fn score_metric(ctx: &MetricContext) -> ConfidenceScore {
    let mut boosts = Vec::new();

    if let Some(boost) = consensus_boost(METRIC_BASE, ctx.agreeing_engines) {
        boosts.push(boost);
    }
    if let Some(boost) = magnitude_boost(ctx.relative_change_pct) {
        boosts.push(boost);
    }
    if let Some(boost) = significance_boost(ctx.z_score, ctx.historical_periods) {
        boosts.push(boost);
    }
    if let Some(boost) = history_depth_boost(ctx.historical_periods) {
        boosts.push(boost);
    }
    if let Some(boost) = severity_boost(ctx.severity) {
        boosts.push(boost);
    }

    ConfidenceScore::new(METRIC_BASE, boosts)
}

/// +15% of remaining headroom for ≥3 agreeing engines, +20% for ≥5.
///
/// Metric-path only: for field extraction the agreement ratio is already
/// the base score and must not be counted twice.
fn consensus_boost(base: f64, agreeing_engines: Option<usize>) -> Option<Boost> {
    let n = agreeing_engines?;
    let share = match n {
        0..=2 => return None,
        3 | 4 => 0.15,
        _ => 0.20,
    };
    let headroom = (CONFIDENCE_CEILING - base).max(0.0);
    Some(Boost {
        kind: BoostKind::Consensus,
        amount: share * headroom,
        reason: format!("{n} engines agree"),
    })
}

/// Banded boost for the relative deviation from the historical baseline.
fn magnitude_boost(relative_change_pct: f64) -> Option<Boost> {
    let pct = relative_change_pct.abs();
    let amount = if pct >= 100.0 {
        0.25
    } else if pct >= 50.0 {
        0.15
    } else if pct >= 25.0 {
        0.10
    } else if pct >= 15.0 {
        0.05
    } else {
        return None;
    };
    Some(Boost {
        kind: BoostKind::Magnitude,
        amount,
        reason: format!("{pct:.0}% relative change"),
    })
}

/// Banded boost for |z|. Needs at least two historical periods, below which
/// a z-score is not meaningful.
fn significance_boost(z_score: Option<f64>, historical_periods: usize) -> Option<Boost> {
    if historical_periods < 2 {
        return None;
    }
    let z = z_score?.abs();
    let amount = if z >= 4.0 {
        0.10
    } else if z >= 3.0 {
        0.05
    } else if z >= 2.0 {
        0.02
    } else {
        return None;
    };
    Some(Boost {
        kind: BoostKind::StatisticalSignificance,
        amount,
        reason: format!("|z| = {z:.2}"),
    })
}

/// Banded boost for the number of historical periods behind the baseline.
fn history_depth_boost(historical_periods: usize) -> Option<Boost> {
    let amount = match historical_periods {
        0 | 1 => return None,
        2 => 0.01,
        3 | 4 => 0.03,
        _ => 0.05,
    };
    Some(Boost {
        kind: BoostKind::HistoryDepth,
        amount,
        reason: format!("{historical_periods} historical periods"),
    })
}

/// Small boost for critical/high findings; medium and low earn nothing.
fn severity_boost(severity: Severity) -> Option<Boost> {
    let amount = match severity {
        Severity::Critical => 0.03,
        Severity::High => 0.02,
        Severity::Medium | Severity::Low => return None,
    };
    Some(Boost {
        kind: BoostKind::Severity,
        amount,
        reason: format!("{severity} severity"),
    })
}

/// Up to 10% of remaining headroom, scaled by how accurate this field's
/// extractions have historically been. Needs a minimum sample size.
fn historical_accuracy_boost(base: f64, signals: &FieldSignals) -> Option<Boost> {
    if signals.observations < MIN_ACCURACY_OBSERVATIONS || signals.historical_accuracy <= 0.0 {
        return None;
    }
    let headroom = (CONFIDENCE_CEILING - base).max(0.0);
    Some(Boost {
        kind: BoostKind::HistoricalAccuracy,
        amount: 0.10 * headroom * signals.historical_accuracy.min(1.0),
        reason: format!(
            "{:.0}% accurate over {} observations",
            signals.historical_accuracy * 100.0,
            signals.observations
        ),
    })
}

/// 5% of remaining headroom when the field was confirmed within the last
/// thirty days.
fn temporal_recency_boost(
    base: f64,
    signals: &FieldSignals,
    now: DateTime<Utc>,
) -> Option<Boost> {
    let confirmed = signals.last_confirmed_at?;
    let age = now.signed_duration_since(confirmed);
    if age < Duration::zero() || age > Duration::days(RECENCY_WINDOW_DAYS) {
        return None;
    }
    let headroom = (CONFIDENCE_CEILING - base).max(0.0);
    Some(Boost {
        kind: BoostKind::TemporalRecency,
        amount: 0.05 * headroom,
        reason: format!("confirmed {} days ago", age.num_days()),
    })
}

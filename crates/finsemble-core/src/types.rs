//! Core data model for the extraction ensemble.
//!
//! These types flow through the whole system: engines emit
//! [`CandidateExtraction`]s, the aggregator reconciles them into
//! [`FieldConsensus`] records, the scorer derives a [`ConfidenceScore`], and
//! the decision gate stamps a [`Decision`] on each field. Review decisions
//! come back as [`ReviewFeedback`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Hard ceiling for every confidence score produced by this system.
///
/// Scores are never rounded up to 1.00: the last percentage point is reserved
/// for irreducible data-quality and business-context uncertainty.
pub const CONFIDENCE_CEILING: f64 = 0.99;

/// Agreement percentage at or above which a field has consensus.
pub const CONSENSUS_THRESHOLD_PCT: f64 = 75.0;

/// Document type hint supplied by the ingestion collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Balance sheet (assets, liabilities, equity).
    BalanceSheet,
    /// Income statement / P&L.
    IncomeStatement,
    /// Cash-flow statement.
    CashFlow,
    /// Rent roll (per-unit lease detail).
    RentRoll,
    /// No usable hint; engines fall back to generic strategies.
    #[default]
    Unknown,
}

impl std::fmt::Display for DocumentType {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BalanceSheet => write!(f, "balance_sheet"),
            Self::IncomeStatement => write!(f, "income_statement"),
            Self::CashFlow => write!(f, "cash_flow"),
            Self::RentRoll => write!(f, "rent_roll"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "balance_sheet" | "balance-sheet" => Ok(Self::BalanceSheet),
            "income_statement" | "income-statement" | "pnl" => Ok(Self::IncomeStatement),
            "cash_flow" | "cash-flow" => Ok(Self::CashFlow),
            "rent_roll" | "rent-roll" => Ok(Self::RentRoll),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!(
                "unknown document type: '{s}' (expected: balance_sheet, income_statement, cash_flow, rent_roll, unknown)"
            )),
        }
    }
}

/// Identifier of one extraction engine.
///
/// The six engines differ in strategy and latency; their per-field
/// reliability is not hard-coded here but discovered by the pattern learner.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EngineId {
    /// Fast deterministic text-pattern extraction.
    TextPattern,
    /// Geometric table-structure extraction (column alignment).
    TableGeometry,
    /// Advanced table detection (delimiter/grid sniffing).
    TableDetect,
    /// Primary optical-recognition engine for scanned documents.
    OcrPrimary,
    /// Secondary optical-recognition engine.
    OcrSecondary,
    /// Layout-aware learned model.
    LayoutModel,
}

impl EngineId {
    /// All engines, in fixed priority order.
    pub const ALL: [Self; 6] = [
        Self::TextPattern,
        Self::TableGeometry,
        Self::TableDetect,
        Self::OcrPrimary,
        Self::OcrSecondary,
        Self::LayoutModel,
    ];

    /// Fixed priority used only as a final tie-break during consensus.
    ///
    /// Lower is higher priority. Deterministic engines rank above
    /// probabilistic ones.
    #[inline]
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            Self::TextPattern => 0,
            Self::TableGeometry => 1,
            Self::TableDetect => 2,
            Self::OcrPrimary => 3,
            Self::OcrSecondary => 4,
            Self::LayoutModel => 5,
        }
    }

    /// Whether this engine's output is deterministic for fixed input.
    #[inline]
    #[must_use]
    pub const fn is_deterministic(self) -> bool {
        !matches!(self, Self::LayoutModel)
    }
}

impl std::fmt::Display for EngineId {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TextPattern => write!(f, "text_pattern"),
            Self::TableGeometry => write!(f, "table_geometry"),
            Self::TableDetect => write!(f, "table_detect"),
            Self::OcrPrimary => write!(f, "ocr_primary"),
            Self::OcrSecondary => write!(f, "ocr_secondary"),
            Self::LayoutModel => write!(f, "layout_model"),
        }
    }
}

impl std::str::FromStr for EngineId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text_pattern" => Ok(Self::TextPattern),
            "table_geometry" => Ok(Self::TableGeometry),
            "table_detect" => Ok(Self::TableDetect),
            "ocr_primary" => Ok(Self::OcrPrimary),
            "ocr_secondary" => Ok(Self::OcrSecondary),
            "layout_model" => Ok(Self::LayoutModel),
            _ => Err(format!("unknown engine id: '{s}'")),
        }
    }
}

/// Severity attached to a computed metric (variance anomaly etc.).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Critical deviation requiring immediate attention.
    Critical,
    /// High-impact deviation.
    High,
    /// Medium-impact deviation.
    #[default]
    Medium,
    /// Low-impact deviation.
    Low,
}

impl std::fmt::Display for Severity {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(format!(
                "unknown severity: '{s}' (expected: critical, high, medium, low)"
            )),
        }
    }
}

/// Terminal decision for one field in one extraction run.
///
/// Decision records are immutable audit entries. A later human approval or
/// rejection is recorded as a separate downstream fact; the original
/// decision is never rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Confidence cleared the effective threshold; accepted without review.
    AutoApproved,
    /// Sent to the human review queue.
    NeedsReview,
    /// No engine produced a candidate for this field.
    Unextracted,
}

impl std::fmt::Display for Decision {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AutoApproved => write!(f, "auto_approved"),
            Self::NeedsReview => write!(f, "needs_review"),
            Self::Unextracted => write!(f, "unextracted"),
        }
    }
}

/// Scope of a learned pattern or threshold record.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Applies across all properties.
    #[default]
    Global,
    /// Applies to one property only.
    Property(String),
}

impl std::fmt::Display for Scope {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Property(id) => write!(f, "property:{id}"),
        }
    }
}

/// Canonical value extracted for a field.
///
/// Monetary and numeric values normalize to exact decimals so consensus
/// grouping can use equality; anything unparseable stays a folded string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    /// Exact decimal amount.
    Number(Decimal),
    /// Normalized (trimmed, case-folded) text.
    Text(String),
}

impl std::fmt::Display for FieldValue {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(d) => write!(f, "{d}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Where in the source document a candidate was found.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// 1-based page number.
    pub page: u32,
    /// Bounding box as `[x0, y0, x1, y1]` in page coordinates, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f32; 4]>,
}

/// One engine's opinion about one field.
///
/// Immutable; owned by the aggregator for the duration of a single job and
/// discarded after aggregation. Only the reconciled consensus is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateExtraction {
    /// Engine that produced this candidate.
    pub engine: EngineId,
    /// Normalized field identity (account code + folded label).
    pub field_key: crate::similarity::FieldKey,
    /// Label text exactly as it appeared in the document.
    pub raw_label: String,
    /// Value text exactly as the engine read it; the aggregator normalizes.
    pub raw_value: String,
    /// Engine-local confidence in [0, 1]. Not comparable across engines.
    pub local_confidence: f64,
    /// Location of the extraction in the source document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_location: Option<SourceLocation>,
}

/// Reconciled view of one field across all engines for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConsensus {
    /// Normalized field key.
    pub field_key: String,
    /// The consensus value (most frequent normalized value).
    pub normalized_value: FieldValue,
    /// Number of candidates equal to the consensus value.
    pub agreement_count: usize,
    /// Number of engines that attempted extraction on this document.
    ///
    /// Engines that found nothing (or timed out) still count here: absence
    /// of a matching answer is itself informative.
    pub total_engines: usize,
    /// `agreement_count / total_engines * 100`, rounded to one decimal.
    pub agreement_percentage: f64,
    /// Engines whose candidate matched the consensus value.
    pub contributing_engines: BTreeSet<EngineId>,
    /// Engines that produced a different value.
    pub dissenting_engines: BTreeSet<EngineId>,
    /// Value selected for the field (consensus value after tie-break).
    pub final_value: FieldValue,
    /// Engine whose candidate supplied the final value.
    pub final_engine: EngineId,
}

impl FieldConsensus {
    /// Build a consensus record, computing the agreement percentage.
    ///
    /// # Panics
    /// Debug-asserts that `agreement_count <= total_engines`.
    #[must_use = "creates the reconciled consensus record for a field"]
    #[allow(clippy::cast_precision_loss, clippy::too_many_arguments)]
    pub fn new(
        field_key: String,
        normalized_value: FieldValue,
        agreement_count: usize,
        total_engines: usize,
        contributing_engines: BTreeSet<EngineId>,
        dissenting_engines: BTreeSet<EngineId>,
        final_value: FieldValue,
        final_engine: EngineId,
    ) -> Self {
        debug_assert!(agreement_count <= total_engines);
        let agreement_percentage = if total_engines == 0 {
            0.0
        } else {
            let raw = agreement_count as f64 / total_engines as f64 * 100.0;
            (raw * 10.0).round() / 10.0
        };
        Self {
            field_key,
            normalized_value,
            agreement_count,
            total_engines,
            agreement_percentage,
            contributing_engines,
            dissenting_engines,
            final_value,
            final_engine,
        }
    }

    /// Every attempted engine matched the consensus value.
    #[inline]
    #[must_use]
    pub fn is_perfect_agreement(&self) -> bool {
        (self.agreement_percentage - 100.0).abs() < f64::EPSILON
    }

    /// Agreement at or above the 75% consensus bar.
    #[inline]
    #[must_use]
    pub fn has_consensus(&self) -> bool {
        self.agreement_percentage >= CONSENSUS_THRESHOLD_PCT
    }
}

/// Named kind of a confidence boost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoostKind {
    /// Multiple engines agreeing on the value.
    Consensus,
    /// Large relative deviation from the historical baseline.
    Magnitude,
    /// Statistical significance (z-score) of the deviation.
    StatisticalSignificance,
    /// Depth of historical data backing the metric.
    HistoryDepth,
    /// Severity classification of the finding.
    Severity,
    /// Pattern recently confirmed by review or extraction.
    TemporalRecency,
    /// Strong historical accuracy for this field pattern.
    HistoricalAccuracy,
}

impl std::fmt::Display for BoostKind {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Consensus => write!(f, "consensus"),
            Self::Magnitude => write!(f, "magnitude"),
            Self::StatisticalSignificance => write!(f, "statistical_significance"),
            Self::HistoryDepth => write!(f, "history_depth"),
            Self::Severity => write!(f, "severity"),
            Self::TemporalRecency => write!(f, "temporal_recency"),
            Self::HistoricalAccuracy => write!(f, "historical_accuracy"),
        }
    }
}

/// A named, bounded additive contribution to a base confidence score.
///
/// Every applied boost is retained, not just the sum, so an audit can
/// reconstruct why a score was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Boost {
    /// Which rule produced this boost.
    pub kind: BoostKind,
    /// Contribution on the 0–1 confidence scale.
    pub amount: f64,
    /// Short human-readable justification.
    pub reason: String,
}

/// Calibrated confidence for one field in one extraction run.
///
/// Immutable once created; a re-run creates a new score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScore {
    /// Starting score before boosts.
    pub base_score: f64,
    /// Ordered list of applied boosts.
    pub boosts: Vec<Boost>,
    /// Final score, clamped to `[0, CONFIDENCE_CEILING]`.
    pub final_score: f64,
}

impl ConfidenceScore {
    /// Assemble a score from a base and its boosts, clamping the total.
    #[must_use = "creates the calibrated confidence score for a field"]
    pub fn new(base_score: f64, boosts: Vec<Boost>) -> Self {
        let total: f64 = base_score + boosts.iter().map(|b| b.amount).sum::<f64>();
        let final_score = total.clamp(0.0, CONFIDENCE_CEILING);
        Self {
            base_score,
            boosts,
            final_score,
        }
    }
}

/// A human decision on one extracted field.
///
/// Produced by the external review queue; consumed exactly once by the
/// pattern learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewFeedback {
    /// Field the decision applies to.
    pub field_key: String,
    /// Confidence the system had reported at extraction time.
    pub extraction_confidence_at_time: f64,
    /// Whether the reviewer approved the extracted value.
    pub approved: bool,
    /// Reviewer identity for the audit trail.
    pub reviewer_id: String,
    /// When the decision was made.
    pub timestamp: DateTime<Utc>,
    /// Global or property-specific scope.
    pub scope: Scope,
}

/// Per-field row of the per-document result consumed by downstream layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldResult {
    /// Normalized field key.
    pub field_key: String,
    /// Final reconciled value, if any engine produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_value: Option<FieldValue>,
    /// Calibrated confidence in [0, 0.99].
    pub final_score: f64,
    /// Gate decision.
    pub decision: Decision,
    /// Engines that matched the consensus value.
    pub contributing_engines: BTreeSet<EngineId>,
    /// Agreement percentage across attempted engines.
    pub agreement_percentage: f64,
}

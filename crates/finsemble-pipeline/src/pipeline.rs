//! The extraction pipeline.
//!
//! One job per uploaded document: all engine adapters run concurrently,
//! each bounded by the job deadline; the aggregator then reconciles their
//! candidates, the scorer calibrates per-field confidence, and the gate
//! stamps a decision on every field. Cancellation mid-job discards all
//! partial results; nothing half-formed is ever returned.

use crate::explain::FieldExplanation;
use chrono::{DateTime, Utc};
use finsemble_core::{
    AccountCategory, ChartOfAccounts, ConfidenceScore, DocumentType, EngineId, FieldKey,
    FieldResult, FinsembleError, Result, ReviewFeedback, Scope,
};
use finsemble_engines::{default_engines, EngineAdapter, EngineRun};
use finsemble_ensemble::{aggregate, score_field, AggregatedField, EngineMatrix, FieldSignals};
use finsemble_learning::{AdaptiveThresholdRecord, DecisionGate, PatternLearner, ThresholdStore};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;

/// Default per-job deadline; slower engines are cancelled at this point.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// One document to extract, as supplied by the ingestion collaborator.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    /// Raw document bytes.
    pub bytes: Vec<u8>,
    /// Document type hint; engines fall back to generic strategies on
    /// [`DocumentType::Unknown`].
    pub document_type: DocumentType,
    /// Property the document belongs to, when known.
    pub property_id: Option<String>,
    /// Reporting period identifier, passed through to the result.
    pub period_id: Option<String>,
    /// Fields the caller expects in this document. Expected fields no
    /// engine reports come back as `unextracted` rather than disappearing.
    pub expected_fields: Vec<FieldKey>,
}

impl ExtractionRequest {
    /// Request with just bytes and a type hint.
    #[must_use]
    pub fn new(bytes: Vec<u8>, document_type: DocumentType) -> Self {
        Self {
            bytes,
            document_type,
            property_id: None,
            period_id: None,
            expected_fields: Vec::new(),
        }
    }
}

/// Per-engine diagnostics for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineDiagnostic {
    /// Which engine.
    pub engine: EngineId,
    /// Whether it completed without an internal failure.
    pub succeeded: bool,
    /// Failure reason, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    /// Wall-clock milliseconds spent.
    pub duration_ms: u64,
    /// Candidates the engine produced.
    pub candidates: usize,
}

/// One decided field in the document result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedField {
    /// The row downstream validation layers and the UI consume.
    pub result: FieldResult,
    /// Account category from the chart of accounts; `None` for codes the
    /// chart does not know (flagged for later chart expansion).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<AccountCategory>,
    /// Full audit trail for this field's score and decision.
    pub explanation: FieldExplanation,
}

/// Result of one extraction job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentExtraction {
    /// Type hint the job ran with.
    pub document_type: DocumentType,
    /// Reporting period, passed through from the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_id: Option<String>,
    /// Decided fields in canonical key order; expected-but-missing fields
    /// appear with `unextracted` decisions.
    pub fields: Vec<ExtractedField>,
    /// Side-by-side per-engine value comparison.
    pub matrix: EngineMatrix,
    /// Per-engine run diagnostics.
    pub diagnostics: Vec<EngineDiagnostic>,
}

/// Orchestrates engines, aggregation, scoring, and gating for one document
/// at a time.
pub struct ExtractionPipeline {
    engines: Vec<Arc<dyn EngineAdapter>>,
    learner: Arc<PatternLearner>,
    gate: DecisionGate,
    store: Arc<dyn ThresholdStore>,
    chart: ChartOfAccounts,
    deadline: Duration,
}

impl ExtractionPipeline {
    /// Pipeline over the standard six engines.
    #[must_use]
    pub fn new(store: Arc<dyn ThresholdStore>, chart: ChartOfAccounts) -> Self {
        let learner = Arc::new(PatternLearner::new(store.clone()));
        let gate = DecisionGate::new(store.clone(), learner.clone());
        Self {
            engines: default_engines(),
            learner,
            gate,
            store,
            chart,
            deadline: DEFAULT_DEADLINE,
        }
    }

    /// Replace the engine set (tests, reduced deployments).
    #[must_use]
    pub fn with_engines(mut self, engines: Vec<Arc<dyn EngineAdapter>>) -> Self {
        self.engines = engines;
        self
    }

    /// Override the per-job deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// The learner, for wiring up background sweeps and inspection.
    #[must_use]
    pub fn learner(&self) -> &Arc<PatternLearner> {
        &self.learner
    }

    /// Run one extraction job to completion.
    ///
    /// # Errors
    /// [`FinsembleError::DocumentUnreadable`] when every engine fails at
    /// the byte level; no partial results are returned.
    pub async fn run(&self, request: ExtractionRequest) -> Result<DocumentExtraction> {
        let (_keep_alive, cancel) = watch::channel(false);
        self.run_cancellable(request, cancel).await
    }

    /// Run one job, aborting if `cancel` flips to `true`.
    ///
    /// # Errors
    /// [`FinsembleError::Cancelled`] on cancellation; partial aggregation
    /// results are discarded entirely. Otherwise as [`Self::run`].
    pub async fn run_cancellable(
        &self,
        request: ExtractionRequest,
        cancel: watch::Receiver<bool>,
    ) -> Result<DocumentExtraction> {
        let runs = self
            .run_engines(&request.bytes, request.document_type, cancel)
            .await?;

        // Byte-level unreadability: every engine failed. Fail the job fast;
        // persist nothing.
        if runs.iter().all(|r| !r.succeeded()) {
            let reason = runs
                .first()
                .and_then(|r| r.failure.clone())
                .unwrap_or_else(|| "no engines available".to_string());
            return Err(FinsembleError::DocumentUnreadable(reason));
        }

        let diagnostics = runs
            .iter()
            .map(|run| EngineDiagnostic {
                engine: run.engine,
                succeeded: run.succeeded(),
                failure: run.failure.clone(),
                duration_ms: u64::try_from(run.duration.as_millis()).unwrap_or(u64::MAX),
                candidates: run.candidates.len(),
            })
            .collect();

        let aggregated = aggregate(&runs);
        let matrix = EngineMatrix::project(&aggregated);
        let now = Utc::now();
        let property = request.property_id.as_deref();

        let mut fields: Vec<ExtractedField> = aggregated
            .iter()
            .map(|field| self.decide_field(field, property, now))
            .collect();
        for missing in missing_expected(&request.expected_fields, &aggregated) {
            fields.push(self.unextracted_field(&missing, property, runs.len()));
        }
        fields.sort_by(|a, b| a.result.field_key.cmp(&b.result.field_key));

        Ok(DocumentExtraction {
            document_type: request.document_type,
            period_id: request.period_id,
            fields,
            matrix,
            diagnostics,
        })
    }

    /// Accept one review decision from the review queue.
    ///
    /// Orphaned feedback (no extraction history) is logged and dropped;
    /// nothing is learned from it.
    ///
    /// # Errors
    /// Store failures only.
    pub fn record_feedback(&self, feedback: &ReviewFeedback) -> Result<()> {
        match self.learner.record_feedback(feedback) {
            Ok(()) => Ok(()),
            Err(FinsembleError::InconsistentFeedback(key)) => {
                log::warn!("ignoring feedback for '{key}': no extraction history");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Run all adapters concurrently, each under the job deadline.
    ///
    /// A timed-out adapter contributes an empty run that still counts as
    /// attempted; a cancellation aborts every outstanding task and fails
    /// the whole job.
    async fn run_engines(
        &self,
        bytes: &[u8],
        hint: DocumentType,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<Vec<EngineRun>> {
        let data: Arc<[u8]> = Arc::from(bytes);
        let deadline = self.deadline;

        let handles: Vec<(EngineId, tokio::task::JoinHandle<EngineRun>)> = self
            .engines
            .iter()
            .map(|adapter| {
                let adapter = adapter.clone();
                let data = data.clone();
                let engine = adapter.engine_id();
                let handle = tokio::spawn(async move {
                    let work = tokio::task::spawn_blocking(move || adapter.extract(&data, hint));
                    match timeout(deadline, work).await {
                        Ok(Ok(run)) => run,
                        Ok(Err(_)) => {
                            EngineRun::failed(engine, "engine task panicked", Duration::ZERO)
                        }
                        Err(_) => EngineRun::timed_out(engine, deadline),
                    }
                });
                (engine, handle)
            })
            .collect();

        let mut runs = Vec::with_capacity(handles.len());
        let mut pending = handles.into_iter();
        while let Some((engine, mut handle)) = pending.next() {
            let run = loop {
                tokio::select! {
                    changed = cancel.changed() => {
                        if changed.is_err() {
                            // Sender gone; cancellation can no longer arrive.
                            break unwrap_join(engine, (&mut handle).await);
                        }
                        if *cancel.borrow() {
                            handle.abort();
                            for (_, outstanding) in pending {
                                outstanding.abort();
                            }
                            return Err(FinsembleError::Cancelled(
                                "document job cancelled".to_string(),
                            ));
                        }
                    }
                    joined = &mut handle => break unwrap_join(engine, joined),
                }
            };
            runs.push(run);
        }
        Ok(runs)
    }

    /// Score, gate, and record one aggregated field.
    fn decide_field(
        &self,
        field: &AggregatedField,
        property: Option<&str>,
        now: DateTime<Utc>,
    ) -> ExtractedField {
        let key = &field.consensus.field_key;
        let signals = self.field_signals(key, property);
        let score = score_field(&field.consensus, &signals, now);
        let outcome = self.gate.decide(key, property, &score, true);

        let scope = property.map_or(Scope::Global, |id| Scope::Property(id.to_string()));
        if let Err(err) = self.learner.record_extraction(
            key,
            &scope,
            score.final_score,
            field.label_variations.iter().cloned(),
            now,
        ) {
            log::warn!("failed to record extraction for '{key}': {err}");
        }

        let category = self
            .chart
            .lookup(&field.key.code)
            .map(|info| info.category);
        let explanation = FieldExplanation::assemble(&field.consensus, &score, &outcome);

        ExtractedField {
            result: FieldResult {
                field_key: key.clone(),
                final_value: Some(field.consensus.final_value.clone()),
                final_score: score.final_score,
                decision: outcome.decision,
                contributing_engines: field.consensus.contributing_engines.clone(),
                agreement_percentage: field.consensus.agreement_percentage,
            },
            category,
            explanation,
        }
    }

    /// Historical signals for scoring. Lookup failures degrade to empty
    /// signals; scoring is never blocked on store availability.
    fn field_signals(&self, field_key: &str, property: Option<&str>) -> FieldSignals {
        let record = property
            .and_then(|id| self.fetch_record(field_key, &Scope::Property(id.to_string())))
            .or_else(|| self.fetch_record(field_key, &Scope::Global));
        let last_confirmed_at = match self.learner.pattern(field_key, property) {
            Ok(pattern) => pattern.and_then(|p| p.last_seen_at),
            Err(err) => {
                log::warn!("pattern lookup failed for '{field_key}': {err}");
                None
            }
        };

        record.map_or_else(FieldSignals::default, |r| FieldSignals {
            historical_accuracy: r.historical_accuracy,
            observations: usize::try_from(r.total_observations).unwrap_or(usize::MAX),
            last_confirmed_at,
        })
    }

    fn fetch_record(&self, field_key: &str, scope: &Scope) -> Option<AdaptiveThresholdRecord> {
        match self.store.get(field_key, scope) {
            Ok(record) => record,
            Err(err) => {
                log::warn!("threshold lookup failed for '{field_key}': {err}");
                None
            }
        }
    }

    /// Terminal `unextracted` record for an expected-but-missing field.
    fn unextracted_field(
        &self,
        key: &FieldKey,
        property: Option<&str>,
        total_engines: usize,
    ) -> ExtractedField {
        let canonical = key.canonical();
        let score = ConfidenceScore::new(0.0, Vec::new());
        let outcome = self.gate.decide(&canonical, property, &score, false);
        log::info!("field '{canonical}' unextracted across {total_engines} engines");

        let category = self.chart.lookup(&key.code).map(|info| info.category);
        ExtractedField {
            result: FieldResult {
                field_key: canonical.clone(),
                final_value: None,
                final_score: 0.0,
                decision: outcome.decision,
                contributing_engines: BTreeSet::new(),
                agreement_percentage: 0.0,
            },
            category,
            explanation: FieldExplanation::unextracted(canonical, &outcome),
        }
    }
}

/// Expected fields no engine reported, fuzzy-matched against the
/// aggregation output.
fn missing_expected(expected: &[FieldKey], aggregated: &[AggregatedField]) -> Vec<FieldKey> {
    expected
        .iter()
        .filter(|wanted| {
            !aggregated
                .iter()
                .any(|field| finsemble_core::similarity::keys_match(wanted, &field.key))
        })
        .cloned()
        .collect()
}

fn unwrap_join(
    engine: EngineId,
    joined: std::result::Result<EngineRun, tokio::task::JoinError>,
) -> EngineRun {
    joined.unwrap_or_else(|_| EngineRun::failed(engine, "engine task panicked", Duration::ZERO))
}

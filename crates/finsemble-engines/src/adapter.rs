//! Engine adapter contract.
//!
//! Every extraction strategy sits behind [`EngineAdapter`]. The contract is
//! deliberately infallible: an adapter must never return an error for
//! malformed input. Internal failures produce an empty candidate list plus a
//! failure note carried on the [`EngineRun`], consumed only for diagnostics.
//! Adapters are stateless across calls.

use finsemble_core::{CandidateExtraction, DocumentType, EngineId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main trait for extraction engines.
///
/// Each of the six strategies (text pattern, table geometry, table
/// detection, two OCR engines, layout model) implements this trait so the
/// pipeline can run them uniformly and concurrently.
pub trait EngineAdapter: Send + Sync {
    /// Identifier of this engine.
    fn engine_id(&self) -> EngineId;

    /// Extract candidate fields from raw document bytes.
    ///
    /// Never fails: malformed input yields an empty candidate list with the
    /// failure recorded on the returned run.
    fn extract(&self, data: &[u8], hint: DocumentType) -> EngineRun;
}

/// Outcome of one engine's attempt on one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineRun {
    /// Which engine ran.
    pub engine: EngineId,
    /// Candidate extractions; empty on failure or when nothing was found.
    pub candidates: Vec<CandidateExtraction>,
    /// Failure reason, for diagnostics only. A failed engine still counts
    /// as attempted in agreement math.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    /// Wall-clock time the engine spent.
    pub duration: Duration,
}

impl EngineRun {
    /// A run that produced candidates (possibly none) without failing.
    #[must_use]
    pub fn completed(
        engine: EngineId,
        candidates: Vec<CandidateExtraction>,
        duration: Duration,
    ) -> Self {
        Self {
            engine,
            candidates,
            failure: None,
            duration,
        }
    }

    /// A run that failed internally. No candidates, reason retained.
    #[must_use]
    pub fn failed(engine: EngineId, reason: impl Into<String>, duration: Duration) -> Self {
        let reason = reason.into();
        log::debug!("engine {engine} failed: {reason}");
        Self {
            engine,
            candidates: Vec::new(),
            failure: Some(reason),
            duration,
        }
    }

    /// A run cancelled at the job deadline. Treated as "no candidates"
    /// rather than a hard failure.
    #[must_use]
    pub fn timed_out(engine: EngineId, deadline: Duration) -> Self {
        Self {
            engine,
            candidates: Vec::new(),
            failure: Some(format!("deadline of {deadline:?} exceeded")),
            duration: deadline,
        }
    }

    /// Whether the engine completed without an internal failure.
    #[inline]
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

//! Error types for extraction ensemble operations.
//!
//! Most failures in this system are deliberately non-fatal: a single engine
//! failing, timing out, or producing nothing must never abort a document job.
//! Only byte-level unreadability is surfaced to the caller as an error; the
//! rest degrade into diagnostics carried on the affected records.

use thiserror::Error;

/// Error types that can occur during extraction, scoring, and learning.
#[derive(Error, Debug)]
pub enum FinsembleError {
    /// The input cannot be parsed by any engine at the byte level.
    ///
    /// Fatal to the document job: no partial consensus records are persisted.
    #[error("document unreadable: {0}")]
    DocumentUnreadable(String),

    /// One extraction engine failed internally.
    ///
    /// Recoverable and local: the engine is excluded from the candidate set
    /// for this job and the failure is retained for diagnostics only.
    #[error("engine {engine} failed: {reason}")]
    EngineFailure {
        /// Identifier of the failing engine.
        engine: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The adaptive threshold store could not be read or written.
    ///
    /// Callers fall back to the hard-coded default threshold; decisions are
    /// never blocked on store availability.
    #[error("threshold store unavailable: {0}")]
    StoreUnavailable(String),

    /// Review feedback references a field with no extraction history.
    ///
    /// Logged and ignored: no learning happens from orphaned feedback.
    #[error("inconsistent feedback for field '{0}': no matching extraction history")]
    InconsistentFeedback(String),

    /// The document job was cancelled before aggregation completed.
    ///
    /// Partial results are discarded entirely, never partially persisted.
    #[error("job cancelled: {0}")]
    Cancelled(String),

    /// A candidate value could not be normalized to canonical form.
    #[error("normalization error: {0}")]
    Normalization(String),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Type alias for [`Result<T, FinsembleError>`].
pub type Result<T> = std::result::Result<T, FinsembleError>;

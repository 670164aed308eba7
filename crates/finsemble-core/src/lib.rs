//! Core types for the finsemble extraction ensemble.
//!
//! This crate holds everything the other workspace members share: the data
//! model flowing from engines through aggregation to decisions, the error
//! taxonomy, value/label normalization, fuzzy field-key matching, and the
//! chart-of-accounts lookup.
//!
//! # Architecture
//!
//! ```text
//! raw bytes ──▶ engine adapters ──▶ CandidateExtraction (per engine)
//!                                        │
//!                                        ▼ normalize + fuzzy-match keys
//!                                   FieldConsensus (per field)
//!                                        │
//!                                        ▼ boost pipeline
//!                                   ConfidenceScore
//!                                        │
//!                                        ▼ adaptive threshold
//!                                   Decision (auto_approved | needs_review | unextracted)
//! ```
//!
//! Review decisions flow back as [`ReviewFeedback`] and close the learning
//! loop in `finsemble-learning`.

pub mod chart;
pub mod error;
pub mod normalize;
pub mod similarity;
pub mod types;

pub use chart::{AccountCategory, AccountInfo, ChartOfAccounts};
pub use error::{FinsembleError, Result};
pub use similarity::FieldKey;
pub use types::{
    Boost, BoostKind, CandidateExtraction, ConfidenceScore, Decision, DocumentType, EngineId,
    FieldConsensus, FieldResult, FieldValue, ReviewFeedback, Scope, Severity, SourceLocation,
    CONFIDENCE_CEILING, CONSENSUS_THRESHOLD_PCT,
};

//! Document extraction pipeline.
//!
//! Ties the workspace together: `finsemble-engines` adapters run
//! concurrently under a job deadline, `finsemble-ensemble` reconciles and
//! scores their output, and `finsemble-learning` supplies thresholds and
//! decisions. The pipeline's [`DocumentExtraction`] is the per-document
//! contract consumed by downstream validation layers and the UI; review
//! decisions come back in through [`ExtractionPipeline::record_feedback`].

pub mod explain;
pub mod pipeline;

pub use explain::FieldExplanation;
pub use pipeline::{
    DocumentExtraction, EngineDiagnostic, ExtractedField, ExtractionPipeline, ExtractionRequest,
    DEFAULT_DEADLINE,
};

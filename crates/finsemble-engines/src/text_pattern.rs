//! Fast deterministic text-pattern extraction.
//!
//! The cheapest engine in the ensemble: a single pass over the text layer
//! matching `code  label  amount` lines. Completes in microseconds and is
//! the highest-priority tie-breaker precisely because it is deterministic.

use crate::adapter::{EngineAdapter, EngineRun};
use crate::textutil::{decode_text, pages, parse_line};
use finsemble_core::{CandidateExtraction, DocumentType, EngineId, FieldKey, SourceLocation};
use std::time::Instant;

/// Text-pattern extraction engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TextPatternEngine;

impl TextPatternEngine {
    /// Create a new engine instance.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Local confidence for one parsed line.
    ///
    /// Lines anchored by an account code are more reliable than label-only
    /// matches. Grid-shaped rent rolls are a weak fit for pattern matching,
    /// so the hint lowers confidence there.
    fn line_confidence(has_code: bool, hint: DocumentType) -> f64 {
        let base = if has_code { 0.95 } else { 0.85 };
        if hint == DocumentType::RentRoll {
            base - 0.10
        } else {
            base
        }
    }
}

impl EngineAdapter for TextPatternEngine {
    fn engine_id(&self) -> EngineId {
        EngineId::TextPattern
    }

    fn extract(&self, data: &[u8], hint: DocumentType) -> EngineRun {
        let started = Instant::now();
        let text = match decode_text(data) {
            Ok(text) => text,
            Err(reason) => return EngineRun::failed(self.engine_id(), reason, started.elapsed()),
        };

        let mut candidates = Vec::new();
        for (page, page_text) in pages(text) {
            for line in page_text.lines() {
                let Some(item) = parse_line(line, page) else {
                    continue;
                };
                let key = FieldKey::new(item.code.as_deref().unwrap_or(""), &item.label);
                candidates.push(CandidateExtraction {
                    engine: self.engine_id(),
                    field_key: key,
                    raw_label: item.label,
                    raw_value: item.value,
                    local_confidence: Self::line_confidence(item.code.is_some(), hint),
                    source_location: Some(SourceLocation {
                        page: item.page,
                        bbox: None,
                    }),
                });
            }
        }

        EngineRun::completed(self.engine_id(), candidates, started.elapsed())
    }
}

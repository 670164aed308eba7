//! Layout-aware learned model adapter.
//!
//! Wraps the layout model's inference output. The model scores each text
//! line on layout features (indentation depth, label shape, presence of an
//! account code, amount formatting) and emits candidates whose feature score
//! clears a floor. Unlike the deterministic engines its confidence varies
//! per line, which is why it sits last in the tie-break priority.

use crate::adapter::{EngineAdapter, EngineRun};
use crate::textutil::{decode_text, pages, parse_line};
use finsemble_core::{CandidateExtraction, DocumentType, EngineId, FieldKey, SourceLocation};
use std::time::Instant;

/// Minimum feature score for a line to be emitted at all.
const SCORE_FLOOR: f64 = 0.50;

/// Ceiling for the model's per-line confidence.
const SCORE_CEILING: f64 = 0.90;

/// Layout-model extraction engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LayoutModelEngine;

impl LayoutModelEngine {
    /// Create a new engine instance.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Feature score for one parsed line, in `[SCORE_FLOOR, SCORE_CEILING]`
    /// or below the floor when the line does not look like a field row.
    fn feature_score(
        has_code: bool,
        label: &str,
        value: &str,
        indent: usize,
        hint: DocumentType,
    ) -> f64 {
        let mut score: f64 = 0.50;
        if has_code {
            score += 0.15;
        }
        let words = label.split_whitespace().count();
        if (1..=5).contains(&words) {
            score += 0.10;
        }
        if indent <= 8 {
            score += 0.05;
        }
        if value.contains('.') {
            score += 0.05;
        }
        // The model was trained predominantly on statement layouts; rent
        // rolls score slightly lower across the board.
        if hint == DocumentType::RentRoll {
            score -= 0.05;
        }
        // Overlong labels are usually merged paragraphs, not field rows.
        if label.len() > 60 {
            score -= 0.20;
        }
        score.min(SCORE_CEILING)
    }
}

impl EngineAdapter for LayoutModelEngine {
    fn engine_id(&self) -> EngineId {
        EngineId::LayoutModel
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
                let score = Self::feature_score(
                    item.code.is_some(),
                    &item.label,
                    &item.value,
                    item.indent,
                    hint,
                );
                if score < SCORE_FLOOR {
                    continue;
                }
                let key = FieldKey::new(item.code.as_deref().unwrap_or(""), &item.label);
                candidates.push(CandidateExtraction {
                    engine: self.engine_id(),
                    field_key: key,
                    raw_label: item.label,
                    raw_value: item.value,
                    local_confidence: score,
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

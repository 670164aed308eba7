//! Optical-recognition adapters.
//!
//! Both OCR engines consume the recognized text layer produced upstream for
//! scanned documents. Recognition output confuses visually similar glyphs
//! inside numbers (`O`/`0`, `l`/`1`), so each engine repairs mostly-numeric
//! tokens before line parsing. The secondary engine applies a wider
//! confusion table and reports lower local confidence; running both gives
//! the ensemble two partially independent reads of the same scan.

use crate::adapter::{EngineAdapter, EngineRun};
use crate::textutil::{decode_text, pages, parse_line};
use finsemble_core::{CandidateExtraction, DocumentType, EngineId, FieldKey, SourceLocation};
use std::time::Instant;

/// Glyph confusions repaired by the primary engine.
const PRIMARY_CONFUSIONS: [(char, char); 3] = [('O', '0'), ('o', '0'), ('l', '1')];

/// Additional confusions repaired by the secondary engine.
const SECONDARY_CONFUSIONS: [(char, char); 6] = [
    ('O', '0'),
    ('o', '0'),
    ('l', '1'),
    ('I', '1'),
    ('S', '5'),
    ('B', '8'),
];

/// OCR-based extraction engine (primary or secondary).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OcrEngine {
    id: EngineId,
    confusions: &'static [(char, char)],
    confidence: f64,
}

impl OcrEngine {
    /// The primary OCR engine: conservative glyph repair, confidence 0.75.
    #[must_use]
    pub const fn primary() -> Self {
        Self {
            id: EngineId::OcrPrimary,
            confusions: &PRIMARY_CONFUSIONS,
            confidence: 0.75,
        }
    }

    /// The secondary OCR engine: wider glyph repair, confidence 0.70.
    #[must_use]
    pub const fn secondary() -> Self {
        Self {
            id: EngineId::OcrSecondary,
            confusions: &SECONDARY_CONFUSIONS,
            confidence: 0.70,
        }
    }

    /// Repair glyph confusions inside mostly-numeric tokens.
    ///
    /// A token qualifies when at least half of its alphanumeric characters
    /// are digits; labels are left untouched.
    fn repair_line(&self, line: &str) -> String {
        line.split(' ')
            .map(|token| self.repair_token(token))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn repair_token(&self, token: &str) -> String {
        let alnum = token.chars().filter(|c| c.is_alphanumeric()).count();
        let digits = token.chars().filter(char::is_ascii_digit).count();
        if alnum == 0 || digits * 2 < alnum {
            return token.to_string();
        }
        token
            .chars()
            .map(|c| {
                self.confusions
                    .iter()
                    .find(|(from, _)| *from == c)
                    .map_or(c, |(_, to)| *to)
            })
            .collect()
    }
}

impl EngineAdapter for OcrEngine {
    fn engine_id(&self) -> EngineId {
        self.id
    }

    fn extract(&self, data: &[u8], _hint: DocumentType) -> EngineRun {
        let started = Instant::now();
        let text = match decode_text(data) {
            Ok(text) => text,
            Err(reason) => return EngineRun::failed(self.engine_id(), reason, started.elapsed()),
        };

        let mut candidates = Vec::new();
        for (page, page_text) in pages(text) {
            for line in page_text.lines() {
                let repaired = self.repair_line(line);
                let Some(item) = parse_line(&repaired, page) else {
                    continue;
                };
                let key = FieldKey::new(item.code.as_deref().unwrap_or(""), &item.label);
                candidates.push(CandidateExtraction {
                    engine: self.engine_id(),
                    field_key: key,
                    raw_label: item.label,
                    raw_value: item.value,
                    local_confidence: self.confidence,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_repairs_o_for_zero() {
        let engine = OcrEngine::primary();
        let run = engine.extract(
            b"4010-0000  Rental Income  $215,671.29\n",
            DocumentType::Unknown,
        );
        assert_eq!(run.candidates.len(), 1);

        // Same line as the scanner would garble it.
        let garbled = engine.extract(
            b"4O10-0000  Rental Income  $215,671.29\n",
            DocumentType::Unknown,
        );
        assert_eq!(garbled.candidates.len(), 1);
        assert_eq!(garbled.candidates[0].field_key.canonical(), "4010-0000 rental income");
    }

    #[test]
    fn test_labels_are_not_repaired() {
        let engine = OcrEngine::primary();
        let run = engine.extract(b"Total Income  1,500.00\n", DocumentType::Unknown);
        // "Total" contains an 'o' but is not mostly numeric.
        assert_eq!(run.candidates[0].raw_label, "Total Income");
    }

    #[test]
    fn test_secondary_repairs_wider_confusions() {
        let engine = OcrEngine::secondary();
        let run = engine.extract(b"Rental Income  1,S00.00\n", DocumentType::Unknown);
        assert_eq!(run.candidates.len(), 1);
        assert_eq!(run.candidates[0].raw_value, "1,500.00");
    }

    #[test]
    fn test_primary_does_not_repair_s() {
        let engine = OcrEngine::primary();
        let run = engine.extract(b"Rental Income  1,S00.00\n", DocumentType::Unknown);
        // 'S' stays, so the token does not parse as an amount.
        assert!(run.candidates.is_empty());
    }

    #[test]
    fn test_confidence_levels() {
        let primary = OcrEngine::primary();
        let secondary = OcrEngine::secondary();
        let line = b"4010-0000  Rental Income  100.00\n";
        let p = primary.extract(line, DocumentType::Unknown);
        let s = secondary.extract(line, DocumentType::Unknown);
        assert!((p.candidates[0].local_confidence - 0.75).abs() < f64::EPSILON);
        assert!((s.candidates[0].local_confidence - 0.70).abs() < f64::EPSILON);
    }

    #[test]
    fn test_binary_input_fails_softly() {
        let run = OcrEngine::primary().extract(&[0x89, 0x50, 0x4e, 0x47], DocumentType::Unknown);
        assert!(!run.succeeded());
        assert!(run.candidates.is_empty());
    }
}

//! Geometric table-structure extraction.
//!
//! Treats runs of two or more spaces (or tabs) as column gutters and reads
//! each line as a row: code column, label column(s), amount in the last
//! column. Complementary to the pattern engine on documents where labels
//! themselves contain amounts or dot leaders confuse the line regex.

use crate::adapter::{EngineAdapter, EngineRun};
use crate::textutil::{decode_text, is_amount_cell, is_noise_line, leading_code, pages};
use finsemble_core::{CandidateExtraction, DocumentType, EngineId, FieldKey, SourceLocation};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Instant;

/// Column gutter: two or more spaces, or any tabs.
static GUTTER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}|\t+").expect("static regex"));

/// Geometric table extraction engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TableGeometryEngine;

impl TableGeometryEngine {
    /// Create a new engine instance.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl EngineAdapter for TableGeometryEngine {
    fn engine_id(&self) -> EngineId {
        EngineId::TableGeometry
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
                if is_noise_line(line) {
                    continue;
                }
                let cells: Vec<&str> = GUTTER_RE
                    .split(line.trim())
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .collect();
                if cells.len() < 2 {
                    continue;
                }
                let value = *cells.last().expect("len checked");
                if !is_amount_cell(value) {
                    continue;
                }

                let head = &cells[..cells.len() - 1];
                let (code, label_cells) = match leading_code(head[0]) {
                    // A pure code cell anchors the row; a code glued to the
                    // label stays part of the label split.
                    Some(code) if code.len() == head[0].len() => (Some(code), &head[1..]),
                    _ => (None, head),
                };
                let label = label_cells.join(" ");
                if code.is_none() && !label.chars().any(char::is_alphabetic) {
                    continue;
                }

                let key = FieldKey::new(code.unwrap_or(""), &label);
                candidates.push(CandidateExtraction {
                    engine: self.engine_id(),
                    field_key: key,
                    raw_label: label,
                    raw_value: value.to_string(),
                    // Three or more columns means the gutter structure is
                    // real, not accidental spacing.
                    local_confidence: if cells.len() >= 3 { 0.90 } else { 0.80 },
                    source_location: Some(SourceLocation { page, bbox: None }),
                });
            }
        }

        EngineRun::completed(self.engine_id(), candidates, started.elapsed())
    }
}

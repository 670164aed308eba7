//! Advanced table detection.
//!
//! Sniffs an explicit cell delimiter (pipe, semicolon, comma, tab) the way a
//! CSV dialect detector does, then classifies columns across the whole
//! table: the amount column is the rightmost column that is mostly numeric,
//! the code column is one that is mostly account codes, and the label column
//! is the first mostly-alphabetic one. Row-level noise does not fool it
//! because classification is per column, not per line.

use crate::adapter::{EngineAdapter, EngineRun};
use crate::textutil::{decode_text, is_amount_cell, is_noise_line, leading_code, pages};
use finsemble_core::{CandidateExtraction, DocumentType, EngineId, FieldKey, SourceLocation};
use std::time::Instant;

/// Candidate delimiters, tried in order of specificity.
const DELIMITERS: [char; 4] = ['|', ';', '\t', ','];

/// Minimum fraction of rows a column must satisfy to be classified.
const COLUMN_MAJORITY: f64 = 0.5;

/// Delimiter-based table detection engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TableDetectEngine;

impl TableDetectEngine {
    /// Create a new engine instance.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Detect the cell delimiter from the first data line.
    fn detect_delimiter(text: &str) -> Option<char> {
        let first_line = text.lines().find(|l| !is_noise_line(l))?;
        DELIMITERS
            .iter()
            .copied()
            .map(|d| (d, Self::delimiter_count(first_line, d)))
            .filter(|(_, count)| *count > 0)
            .max_by_key(|(_, count)| *count)
            .map(|(d, _)| d)
    }

    /// Occurrences of `d` acting as a delimiter. A comma flanked by digits
    /// is a thousands separator, not a cell boundary.
    fn delimiter_count(line: &str, d: char) -> usize {
        let chars: Vec<char> = line.chars().collect();
        (0..chars.len())
            .filter(|&i| {
                chars[i] == d
                    && !(d == ','
                        && i > 0
                        && chars[i - 1].is_ascii_digit()
                        && chars.get(i + 1).is_some_and(char::is_ascii_digit))
            })
            .count()
    }

    /// Index of the rightmost column that is mostly amounts.
    fn amount_column(rows: &[Vec<String>]) -> Option<usize> {
        let width = rows.iter().map(Vec::len).max()?;
        (0..width).rev().find(|&col| {
            let hits = rows
                .iter()
                .filter(|row| row.get(col).is_some_and(|c| is_amount_cell(c)))
                .count();
            #[allow(clippy::cast_precision_loss)]
            let ratio = hits as f64 / rows.len() as f64;
            ratio >= COLUMN_MAJORITY
        })
    }

    /// Index of a column that is mostly account codes, if any.
    fn code_column(rows: &[Vec<String>], skip: usize) -> Option<usize> {
        let width = rows.iter().map(Vec::len).max()?;
        (0..width).filter(|&col| col != skip).find(|&col| {
            let hits = rows
                .iter()
                .filter(|row| {
                    row.get(col)
                        .is_some_and(|c| leading_code(c).is_some_and(|code| code.len() == c.len()))
                })
                .count();
            #[allow(clippy::cast_precision_loss)]
            let ratio = hits as f64 / rows.len() as f64;
            ratio >= COLUMN_MAJORITY
        })
    }
}

impl EngineAdapter for TableDetectEngine {
    fn engine_id(&self) -> EngineId {
        EngineId::TableDetect
    }

    fn extract(&self, data: &[u8], _hint: DocumentType) -> EngineRun {
        let started = Instant::now();
        let text = match decode_text(data) {
            Ok(text) => text,
            Err(reason) => return EngineRun::failed(self.engine_id(), reason, started.elapsed()),
        };

        let Some(delimiter) = Self::detect_delimiter(text) else {
            // Not a delimited table; nothing for this strategy to do.
            return EngineRun::completed(self.engine_id(), Vec::new(), started.elapsed());
        };

        let mut candidates = Vec::new();
        for (page, page_text) in pages(text) {
            let rows: Vec<Vec<String>> = page_text
                .lines()
                .filter(|l| !is_noise_line(l))
                .map(|l| {
                    l.split(delimiter)
                        .map(|c| c.trim().to_string())
                        .filter(|c| !c.is_empty())
                        .collect()
                })
                .filter(|row: &Vec<String>| !row.is_empty())
                .collect();
            if rows.is_empty() {
                continue;
            }

            let Some(value_col) = Self::amount_column(&rows) else {
                continue;
            };
            let code_col = Self::code_column(&rows, value_col);

            for row in &rows {
                let Some(value) = row.get(value_col).filter(|c| is_amount_cell(c.as_str())) else {
                    continue;
                };
                let code = code_col
                    .and_then(|col| row.get(col))
                    .map(String::as_str)
                    .unwrap_or("");
                let label = row
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != value_col && Some(*i) != code_col)
                    .map(|(_, c)| c.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                if code.is_empty() && !label.chars().any(char::is_alphabetic) {
                    continue;
                }

                let key = FieldKey::new(code, &label);
                candidates.push(CandidateExtraction {
                    engine: self.engine_id(),
                    field_key: key,
                    raw_label: label,
                    raw_value: value.clone(),
                    local_confidence: 0.88,
                    source_location: Some(SourceLocation { page, bbox: None }),
                });
            }
        }

        EngineRun::completed(self.engine_id(), candidates, started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIPE_TABLE: &str = "\
4010-0000 | Rental Income | 215,671.29
4020-0000 | Parking Income | 4,310.00
6310-0000 | Repairs and Maintenance | (12,450.00)
";

    #[test]
    fn test_pipe_delimited_table() {
        let engine = TableDetectEngine::new();
        let run = engine.extract(PIPE_TABLE.as_bytes(), DocumentType::IncomeStatement);
        assert!(run.succeeded());
        assert_eq!(run.candidates.len(), 3);
        assert_eq!(run.candidates[0].field_key.canonical(), "4010-0000 rental income");
        assert_eq!(run.candidates[2].raw_value, "(12,450.00)");
    }

    #[test]
    fn test_semicolon_delimited_table() {
        let engine = TableDetectEngine::new();
        let run = engine.extract(
            b"Rental Income; 215671.29\nParking Income; 4310.00\n",
            DocumentType::Unknown,
        );
        assert_eq!(run.candidates.len(), 2);
        assert_eq!(run.candidates[0].field_key.canonical(), "rental income");
    }

    #[test]
    fn test_undelimited_text_yields_nothing() {
        let engine = TableDetectEngine::new();
        let run = engine.extract(
            b"4010-0000  Rental Income  215671.29\n",
            DocumentType::Unknown,
        );
        assert!(run.succeeded());
        assert!(run.candidates.is_empty());
    }

    #[test]
    fn test_header_row_does_not_emit_candidate() {
        let table = "Account | Description | Amount\n4010-0000 | Rental Income | 215,671.29\n";
        let engine = TableDetectEngine::new();
        let run = engine.extract(table.as_bytes(), DocumentType::Unknown);
        // Header row has no amount in the value column.
        assert_eq!(run.candidates.len(), 1);
        assert_eq!(run.candidates[0].field_key.canonical(), "4010-0000 rental income");
    }

    #[test]
    fn test_binary_input_fails_softly() {
        let engine = TableDetectEngine::new();
        let run = engine.extract(&[0xde, 0xad, 0xbe, 0xef], DocumentType::Unknown);
        assert!(!run.succeeded());
    }

    #[test]
    fn test_delimiter_detection_prefers_most_frequent() {
        assert_eq!(
            TableDetectEngine::detect_delimiter("a | b | c, d"),
            Some('|')
        );
        assert_eq!(TableDetectEngine::detect_delimiter("a, b, c"), Some(','));
        assert_eq!(TableDetectEngine::detect_delimiter("plain text"), None);
    }

    #[test]
    fn test_thousands_separator_is_not_a_delimiter() {
        assert_eq!(
            TableDetectEngine::detect_delimiter("Rental Income  $215,671.29"),
            None
        );
        // A comma followed by a space still delimits.
        assert_eq!(
            TableDetectEngine::detect_delimiter("Rental Income, 215671.29"),
            Some(',')
        );
    }
}

//! Value and label normalization.
//!
//! Every engine candidate passes through here before aggregation so that
//! consensus grouping compares canonical forms: `$215,671.29`, `215671.29`,
//! and `215,671.29 ` must all group as the same value. Accountant notations
//! are handled: parenthesized negatives, trailing minus, `CR`/`DR` suffixes,
//! and dash placeholders for zero.

use crate::types::FieldValue;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Currency symbols stripped during amount parsing.
const CURRENCY_SYMBOLS: [char; 4] = ['$', '€', '£', '¥'];

/// Canonical numeric body after cleaning: digits with optional fraction.
static NUMERIC_BODY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(\.\d+)?$").expect("static regex must compile"));

/// Normalize a raw candidate value to canonical form.
///
/// Amounts become exact decimals; anything unparseable as a number becomes a
/// folded text value.
#[must_use = "returns the canonical value used for consensus grouping"]
pub fn normalize_value(raw: &str) -> FieldValue {
    match parse_amount(raw) {
        Some(amount) => FieldValue::Number(amount),
        None => FieldValue::Text(fold_label(raw)),
    }
}

/// Parse a monetary or numeric string into an exact decimal.
///
/// Returns `None` when the input is not recognizably numeric. Handles:
/// currency symbols, thousands separators, parenthesized negatives,
/// leading/trailing minus, `CR` (credit, negative) / `DR` (debit) suffixes,
/// and a bare dash meaning zero.
#[must_use]
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let mut s = raw.trim();
    if s.is_empty() {
        return None;
    }

    // Bare dash placeholder in statement columns means zero.
    if matches!(s, "-" | "\u{2013}" | "\u{2014}") {
        return Some(Decimal::ZERO);
    }

    let mut negative = false;

    // CR = credit balance (negative), DR = debit balance.
    if let Some(stripped) = strip_suffix_ignore_case(s, "cr") {
        negative = true;
        s = stripped;
    } else if let Some(stripped) = strip_suffix_ignore_case(s, "dr") {
        s = stripped;
    }
    s = s.trim();

    // Parenthesized amounts are negative.
    if let Some(inner) = s.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        negative = true;
        s = inner.trim();
    }

    // Trailing minus (legacy ledger exports).
    if let Some(stripped) = s.strip_suffix('-') {
        negative = true;
        s = stripped.trim_end();
    }
    if let Some(stripped) = s.strip_prefix('-') {
        negative = true;
        s = stripped.trim_start();
    }

    // Strip currency symbols and thousands separators.
    let cleaned: String = s
        .chars()
        .filter(|c| !CURRENCY_SYMBOLS.contains(c) && *c != ',' && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() || !NUMERIC_BODY.is_match(&cleaned) {
        return None;
    }

    let amount = Decimal::from_str(&cleaned).ok()?;
    Some(if negative { -amount } else { amount })
}

/// Fold a label for comparison: lowercase, collapsed whitespace, trailing
/// punctuation trimmed. Idempotent.
#[must_use]
pub fn fold_label(raw: &str) -> String {
    raw.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(|c: char| matches!(c, ':' | '.' | ';' | ' '))
        .to_string()
}

/// Normalize an account code: whitespace dropped, trailing punctuation
/// removed, uppercased. Idempotent.
#[must_use]
pub fn normalize_account_code(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .trim_end_matches([':', '.'])
        .to_uppercase()
}

fn strip_suffix_ignore_case<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    let trimmed = s.trim_end();
    let split = trimmed.len().checked_sub(suffix.len())?;
    // A multibyte character in the suffix position (a trailing currency
    // symbol, say) means the suffix cannot be present.
    if !trimmed.is_char_boundary(split) {
        return None;
    }
    let (head, tail) = trimmed.split_at(split);
    if tail.eq_ignore_ascii_case(suffix) {
        // Require a boundary so "ledger" does not lose its "er".
        if head.ends_with(|c: char| c.is_ascii_digit() || c.is_whitespace() || c == ')') {
            return Some(head);
        }
    }
    None
}

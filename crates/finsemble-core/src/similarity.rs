//! Fuzzy field-key matching.
//!
//! Engines see the same account under slightly different spellings
//! ("4010-0000 Rental Income" vs "4010-000O Rental  Income"). Before
//! grouping, a candidate's key is matched against previously seen keys using
//! a weighted similarity of account code and label text. Matches at or above
//! the acceptance bar are treated as the same field; the variant spelling is
//! recorded so the pattern learner can track label drift.

use crate::normalize::{fold_label, normalize_account_code};
use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;

/// Weight of the account-code component in the combined similarity.
pub const CODE_WEIGHT: f64 = 0.60;

/// Weight of the label-text component in the combined similarity.
pub const LABEL_WEIGHT: f64 = 0.40;

/// Combined similarity at or above which two keys are the same field.
pub const MATCH_THRESHOLD: f64 = 0.85;

/// A field identity: normalized account code plus folded label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldKey {
    /// Normalized account code (may be empty when the document has none).
    pub code: String,
    /// Folded label text.
    pub label: String,
}

impl FieldKey {
    /// Build a key from raw code and label text, normalizing both.
    #[must_use]
    pub fn new(raw_code: &str, raw_label: &str) -> Self {
        Self {
            code: normalize_account_code(raw_code),
            label: fold_label(raw_label),
        }
    }

    /// Canonical string form used as the grouping key.
    #[must_use]
    pub fn canonical(&self) -> String {
        if self.code.is_empty() {
            self.label.clone()
        } else if self.label.is_empty() {
            self.code.clone()
        } else {
            format!("{} {}", self.code, self.label)
        }
    }
}

impl std::fmt::Display for FieldKey {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// Weighted similarity between two field keys, in [0, 1].
///
/// 60% account-code similarity, 40% label similarity. When both sides lack a
/// code, the label carries full weight (and vice versa), so code-less
/// documents still match sensibly.
#[must_use]
pub fn key_similarity(a: &FieldKey, b: &FieldKey) -> f64 {
    let have_codes = !a.code.is_empty() && !b.code.is_empty();
    let have_labels = !a.label.is_empty() && !b.label.is_empty();

    match (have_codes, have_labels) {
        (true, true) => {
            CODE_WEIGHT * code_similarity(&a.code, &b.code)
                + LABEL_WEIGHT * jaro_winkler(&a.label, &b.label)
        }
        (true, false) => code_similarity(&a.code, &b.code),
        (false, true) => jaro_winkler(&a.label, &b.label),
        (false, false) => 0.0,
    }
}

/// Account-code similarity.
///
/// A clean all-numeric code is authoritative: adjacent codes like
/// `4010-0000` and `4020-0000` identify different accounts no matter how
/// close the digits look, so two differing clean codes never match. Fuzzy
/// matching only applies when a code carries non-digit characters, which is
/// where OCR confusions (`O` for `0`, `l` for `1`) live.
fn code_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if is_clean_numeric(a) && is_clean_numeric(b) {
        return 0.0;
    }
    jaro_winkler(a, b)
}

fn is_clean_numeric(code: &str) -> bool {
    code.chars().all(|c| c.is_ascii_digit() || c == '-')
}

/// Whether two keys identify the same field despite spelling variation.
#[inline]
#[must_use]
pub fn keys_match(a: &FieldKey, b: &FieldKey) -> bool {
    a == b || key_similarity(a, b) >= MATCH_THRESHOLD
}

/// Find the best match for `key` among `seen`, if any clears the bar.
#[must_use]
pub fn best_match<'a>(key: &FieldKey, seen: impl Iterator<Item = &'a FieldKey>) -> Option<&'a FieldKey> {
    let mut best: Option<(&'a FieldKey, f64)> = None;
    for candidate in seen {
        if candidate == key {
            return Some(candidate);
        }
        let sim = key_similarity(key, candidate);
        if sim >= MATCH_THRESHOLD && best.map_or(true, |(_, b)| sim > b) {
            best = Some((candidate, sim));
        }
    }
    best.map(|(k, _)| k)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_keys_match() {
        let a = FieldKey::new("4010-0000", "Rental Income");
        let b = FieldKey::new("4010-0000", "Rental Income");
        assert!((key_similarity(&a, &b) - 1.0).abs() < f64::EPSILON);
        assert!(keys_match(&a, &b));
    }

    #[test]
    fn test_minor_typo_matches() {
        // One transposed character in the label, same code.
        let a = FieldKey::new("4010-0000", "Rental Income");
        let b = FieldKey::new("4010-0000", "Rentla Income");
        assert!(keys_match(&a, &b), "similarity {}", key_similarity(&a, &b));
    }

    #[test]
    fn test_ocr_confusion_in_code_matches() {
        // O-for-0 confusion in the code, identical label.
        let a = FieldKey::new("4010-0000", "Rental Income");
        let b = FieldKey::new("4010-000O", "Rental Income");
        assert!(keys_match(&a, &b));
    }

    #[test]
    fn test_different_accounts_do_not_match() {
        let a = FieldKey::new("4010-0000", "Rental Income");
        let b = FieldKey::new("6310-0000", "Repairs and Maintenance");
        assert!(!keys_match(&a, &b));
    }

    #[test]
    fn test_adjacent_clean_codes_stay_distinct() {
        // One digit apart with similar labels: still two accounts.
        let a = FieldKey::new("4010-0000", "Rental Income");
        let b = FieldKey::new("4020-0000", "Parking Income");
        assert!(!keys_match(&a, &b), "similarity {}", key_similarity(&a, &b));
    }

    #[test]
    fn test_label_only_keys_use_full_label_weight() {
        let a = FieldKey::new("", "Net Operating Income");
        let b = FieldKey::new("", "Net Operating  Income");
        assert!(keys_match(&a, &b));
    }

    #[test]
    fn test_empty_keys_never_match() {
        let a = FieldKey::new("", "");
        let b = FieldKey::new("", "");
        assert!((key_similarity(&a, &b) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_best_match_prefers_exact() {
        let key = FieldKey::new("4010-0000", "Rental Income");
        let seen = vec![
            FieldKey::new("4010-0001", "Rental Income Other"),
            FieldKey::new("4010-0000", "Rental Income"),
        ];
        let found = best_match(&key, seen.iter()).unwrap();
        assert_eq!(found, &seen[1]);
    }

    #[test]
    fn test_best_match_none_below_bar() {
        let key = FieldKey::new("4010-0000", "Rental Income");
        let seen = vec![FieldKey::new("9999-9999", "Depreciation Expense")];
        assert!(best_match(&key, seen.iter()).is_none());
    }

    #[test]
    fn test_canonical_forms() {
        assert_eq!(
            FieldKey::new("4010-0000", "Rental Income").canonical(),
            "4010-0000 rental income"
        );
        assert_eq!(FieldKey::new("", "Rental Income").canonical(), "rental income");
        assert_eq!(FieldKey::new("4010-0000", "").canonical(), "4010-0000");
    }
}

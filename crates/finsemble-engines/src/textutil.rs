//! Shared helpers for the line-oriented engines.
//!
//! Financial statements exported to text keep one account per line: an
//! optional account code, a label, dot leaders or whitespace, then the
//! amount in the rightmost column. Pages are separated by form feeds.

use once_cell::sync::Lazy;
use regex::Regex;

/// Leading account code: 3-5 digits with an optional dashed suffix.
static CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?P<code>\d{3,5}(?:-\d{2,5})?)\b").expect("static regex"));

/// Trailing amount token: optional currency symbol, separators, accountant
/// negatives (parens, trailing minus, CR/DR).
/// Anchored at end of line and bounded on the left by whitespace (or line
/// start) so a garbled token like `1,S00.00` cannot shed its prefix and
/// match as `00.00`.
static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:^|\s)(?P<value>\(?\s*-?\s*[$€£¥]?\s*\d[\d,]*(?:\.\d+)?\s*\)?(?:\s*[CcDd][Rr])?-?)\s*$",
    )
    .expect("static regex")
});

/// Dot leaders between label and amount.
static LEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.\u{00b7}]{2,}").expect("static regex"));

/// One parsed statement line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LineItem {
    /// Account code, when the line starts with one.
    pub code: Option<String>,
    /// Label text between code and amount.
    pub label: String,
    /// Amount text exactly as it appeared.
    pub value: String,
    /// 1-based page number.
    pub page: u32,
    /// Leading whitespace width, used by the layout engine.
    pub indent: usize,
}

/// Decode document bytes as UTF-8 text.
///
/// Engines treat non-text input as an internal failure (empty candidates,
/// failure note), never as a panic.
pub(crate) fn decode_text(data: &[u8]) -> Result<&str, String> {
    if data.is_empty() {
        return Err("empty input".to_string());
    }
    std::str::from_utf8(data).map_err(|e| format!("input is not valid UTF-8 text: {e}"))
}

/// Iterate `(page_number, page_text)` over form-feed-separated pages.
pub(crate) fn pages(text: &str) -> impl Iterator<Item = (u32, &str)> {
    text.split('\u{0c}')
        .enumerate()
        .map(|(i, page)| (u32::try_from(i).unwrap_or(u32::MAX).saturating_add(1), page))
}

/// Lines that carry no account data: titles, date headers, rules, totals of
/// page furniture.
pub(crate) fn is_noise_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return true;
    }
    if trimmed.chars().all(|c| matches!(c, '-' | '=' | '_' | '*' | ' ')) {
        return true;
    }
    let lower = trimmed.to_lowercase();
    const NOISE_PREFIXES: [&str; 6] = [
        "page ",
        "as of ",
        "for the ",
        "period end",
        "prepared by",
        "run date",
    ];
    NOISE_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Leading account code of a cell or line head, if present.
pub(crate) fn leading_code(s: &str) -> Option<&str> {
    CODE_RE
        .captures(s)
        .and_then(|caps| caps.name("code"))
        .map(|m| m.as_str())
}

/// Whether a whole cell reads as an amount.
pub(crate) fn is_amount_cell(s: &str) -> bool {
    finsemble_core::normalize::parse_amount(s).is_some()
}

/// Parse one line into `(code, label, amount)`.
///
/// Returns `None` for lines without a trailing amount or without any label
/// or code in front of it.
pub(crate) fn parse_line(line: &str, page: u32) -> Option<LineItem> {
    if is_noise_line(line) {
        return None;
    }

    let amount = AMOUNT_RE.captures(line)?;
    let value_match = amount.name("value").expect("named group");
    let value = value_match.as_str().trim().to_string();
    let head = &line[..value_match.start()];

    let indent = head.len() - head.trim_start().len();

    let (code, rest) = match CODE_RE.captures(head) {
        Some(caps) => {
            let m = caps.name("code").expect("named group");
            (Some(m.as_str().to_string()), &head[m.end()..])
        }
        None => (None, head),
    };

    let label = LEADER_RE.replace_all(rest, " ").trim().to_string();

    // An amount with nothing in front of it is a column total or stray
    // number, not a field.
    if label.is_empty() && code.is_none() {
        return None;
    }
    // A bare number cannot be a label.
    if code.is_none() && label.chars().all(|c| !c.is_alphabetic()) {
        return None;
    }

    Some(LineItem {
        code,
        label,
        value,
        page,
        indent,
    })
}

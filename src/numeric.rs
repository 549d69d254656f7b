//! Locale-aware numeric conversion for count and length columns.
//!
//! Source files mix decimal points and `.` thousands separators in the same
//! fields. Each token is decided on its own: `"1.234.567"` can only be a
//! grouped integer, while a token with a single `.` such as `"128.457"` is
//! always a decimal.

use regex::Regex;
use std::sync::LazyLock;

/// Digits split by `.` into groups of exactly three after a 1-3 digit lead.
static GROUPED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}(\.\d{3})+$").expect("valid grouping pattern"));

/// Tokens that mean "no value" in the source files.
const MISSING_TOKENS: &[&str] = &["", "NA", "N/A", "NaN", "nan", "null"];

/// Converts a sequence of raw tokens into numbers.
///
/// With `strip_thousands` enabled, a token made of 3-digit groups joined by
/// more than one `.` has its separators removed. Every other token parses
/// as an ordinary decimal. Tokens that do not parse become `None`.
pub fn normalize_numeric<S: AsRef<str>>(tokens: &[S], strip_thousands: bool) -> Vec<Option<f64>> {
    tokens
        .iter()
        .map(|t| normalize_token(t.as_ref(), strip_thousands))
        .collect()
}

/// Converts a single token.
pub fn normalize_token(token: &str, strip_thousands: bool) -> Option<f64> {
    let token = token.trim();
    if is_missing_token(token) {
        return None;
    }
    if strip_thousands && is_thousands_grouped(token) {
        return token.replace('.', "").parse::<f64>().ok();
    }
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Whether `token` is one of the explicit "no value" markers.
pub fn is_missing_token(token: &str) -> bool {
    MISSING_TOKENS.contains(&token.trim())
}

fn is_thousands_grouped(token: &str) -> bool {
    token.matches('.').count() > 1 && GROUPED.is_match(token)
}

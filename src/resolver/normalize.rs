//! Date and price normalization.
//!
//! Extracted strings are volatile and author-controlled; anything that does
//! not parse cleanly becomes `None`. Dates are re-emitted strictly as
//! `YYYY-MM-DD` in UTC, never as a partial or locale-formatted string.

use chrono::{DateTime, NaiveDate, Utc};

/// Accepted textual date layouts, tried in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%B %d, %Y", "%b %d, %Y", "%m/%d/%Y"];

/// Parse a date string into a calendar date, or `None`.
pub fn parse_release_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Structured data often carries full RFC3339 timestamps.
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }

    // "Sept" is common in listing copy but is not a chrono month token.
    let cleaned = trimmed.replace("Sept ", "Sep ").replace("Sept. ", "Sep ");

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&cleaned, fmt).ok())
}

/// Parse a currency-prefixed or plain numeric amount ("$1,299.99", "59.99").
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .replace(',', "")
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Collapse runs of whitespace into single spaces.
pub fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_long_month_date() {
        assert_eq!(parse_release_date("March 14, 2025"), Some(date("2025-03-14")));
    }

    #[test]
    fn test_parse_short_month_date() {
        assert_eq!(parse_release_date("Mar 14, 2025"), Some(date("2025-03-14")));
        assert_eq!(parse_release_date("Sept 5, 2025"), Some(date("2025-09-05")));
    }

    #[test]
    fn test_parse_iso_and_rfc3339() {
        assert_eq!(parse_release_date("2025-03-14"), Some(date("2025-03-14")));
        assert_eq!(
            parse_release_date("2025-03-14T00:00:00Z"),
            Some(date("2025-03-14"))
        );
    }

    #[test]
    fn test_unparseable_date_is_none() {
        assert_eq!(parse_release_date("not a date"), None);
        assert_eq!(parse_release_date(""), None);
        assert_eq!(parse_release_date("March 2025"), None);
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("$59.99"), Some(59.99));
        assert_eq!(parse_amount("$ 1,299.99"), Some(1299.99));
        assert_eq!(parse_amount("59.99"), Some(59.99));
        assert_eq!(parse_amount("free"), None);
    }

    #[test]
    fn test_collapse_ws() {
        assert_eq!(collapse_ws("  a \n b\t c "), "a b c");
    }
}

//! String format validators
//!
//! Checks behind the schema `format` constraint: email, URL, and ISO date.

use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

static ISO_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    // Calendar date with optional time and optional zone designator.
    Regex::new(r"^\d{4}-\d{2}-\d{2}(T\d{2}:\d{2}:\d{2}(\.\d{1,9})?(Z|[+-]\d{2}:\d{2})?)?$")
        .expect("iso date regex is valid")
});

/// Email shape: a non-whitespace local part, one `@`, and a non-whitespace
/// domain containing a dot. No attempt at full RFC 5322.
pub fn is_email(value: &str) -> bool {
    let mut parts = value.splitn(2, '@');
    let (local, domain) = match (parts.next(), parts.next()) {
        (Some(local), Some(domain)) => (local, domain),
        _ => return false,
    };
    if local.is_empty() || local.chars().any(char::is_whitespace) {
        return false;
    }
    if domain.is_empty() || domain.chars().any(char::is_whitespace) || domain.contains('@') {
        return false;
    }
    let dot = match domain.find('.') {
        Some(i) => i,
        None => return false,
    };
    // A leading or trailing dot leaves an empty label.
    dot > 0 && dot < domain.len() - 1
}

/// URL shape: anything the `url` crate parses as absolute.
pub fn is_url(value: &str) -> bool {
    url::Url::parse(value).is_ok()
}

/// ISO-8601 date or datetime: structural check plus a parse/reformat
/// round-trip, so synthetically valid dates like `2024-02-30` fail.
pub fn is_iso_date(value: &str) -> bool {
    if !ISO_DATE_RE.is_match(value) {
        return false;
    }
    if value.len() == 10 {
        return NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(|d| d.format("%Y-%m-%d").to_string() == value)
            .unwrap_or(false);
    }
    // Datetimes without a zone are interpreted as UTC for the round-trip.
    let candidate = if value.ends_with('Z') || value.contains('+') || value[10..].contains('-') {
        value.to_string()
    } else {
        format!("{}Z", value)
    };
    DateTime::parse_from_rfc3339(&candidate).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_accepts_plain_addresses() {
        assert!(is_email("a@x.com"));
        assert!(is_email("first.last@sub.domain.org"));
        assert!(is_email("a+tag@x.co"));
    }

    #[test]
    fn email_rejects_malformed() {
        assert!(!is_email("plain"));
        assert!(!is_email("@x.com"));
        assert!(!is_email("a@"));
        assert!(!is_email("a@nodot"));
        assert!(!is_email("a b@x.com"));
        assert!(!is_email("a@x .com"));
        assert!(!is_email("a@.com"));
        assert!(!is_email("a@com."));
    }

    #[test]
    fn url_accepts_parseable() {
        assert!(is_url("https://example.com/path?q=1"));
        assert!(is_url("ftp://host"));
        assert!(is_url("custom-scheme:thing"));
    }

    #[test]
    fn url_rejects_relative_and_garbage() {
        assert!(!is_url("not a url"));
        assert!(!is_url("/relative/path"));
        assert!(!is_url(""));
    }

    #[test]
    fn iso_date_accepts_real_dates() {
        assert!(is_iso_date("2024-02-29"));
        assert!(is_iso_date("2024-01-15T10:30:00Z"));
        assert!(is_iso_date("2024-01-15T10:30:00.123+02:00"));
        assert!(is_iso_date("2024-01-15T10:30:00"));
    }

    #[test]
    fn iso_date_rejects_impossible_dates() {
        // Structurally valid, calendar-invalid.
        assert!(!is_iso_date("2024-02-30"));
        assert!(!is_iso_date("2023-02-29"));
        assert!(!is_iso_date("2024-13-01"));
    }

    #[test]
    fn iso_date_rejects_wrong_shapes() {
        assert!(!is_iso_date("01/15/2024"));
        assert!(!is_iso_date("2024-1-5"));
        assert!(!is_iso_date("20240115"));
    }
}

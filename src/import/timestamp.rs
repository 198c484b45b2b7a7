//! Timestamp resolution
//!
//! Uploaded files carry timestamps in whatever shape the exporting system
//! produced. Resolution is total: a generic parse first, then an ordered
//! chain of fixed patterns, and finally the current instant. The fallback
//! means an unparseable timestamp is indistinguishable from "ingested just
//! now" after the fact.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Fixed fallback patterns, tried in order. Naive matches are taken as UTC.
const FALLBACK_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
];

/// Resolve heterogeneous date/time text into an absolute instant. Never fails.
pub fn resolve(text: &str) -> DateTime<Utc> {
    try_resolve(text).unwrap_or_else(Utc::now)
}

pub(crate) fn try_resolve(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = trimmed.parse::<DateTime<Utc>>() {
        return Some(dt);
    }

    for format in FALLBACK_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_rfc3339_parses_directly() {
        let resolved = resolve("2024-03-01T10:00:00Z");
        assert_eq!(resolved, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_iso_like_pattern() {
        let resolved = resolve("2024-03-01 10:00:00");
        assert_eq!(resolved, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_us_slash_pattern_reorders_fields() {
        let resolved = resolve("03/15/2024 08:30:00");
        assert_eq!(resolved, Utc.with_ymd_and_hms(2024, 3, 15, 8, 30, 0).unwrap());
    }

    #[test]
    fn test_day_first_dash_pattern() {
        let resolved = resolve("15-03-2024 08:30:00");
        assert_eq!(resolved, Utc.with_ymd_and_hms(2024, 3, 15, 8, 30, 0).unwrap());
    }

    #[test]
    fn test_garbage_falls_back_to_now() {
        assert!(try_resolve("not a date").is_none());
        let before = Utc::now();
        let resolved = resolve("not a date");
        let after = Utc::now();
        assert!(resolved >= before && resolved <= after);
    }

    #[test]
    fn test_surrounding_whitespace_tolerated() {
        let resolved = resolve("  2024-03-01 10:00:00  ");
        assert_eq!(resolved, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
    }
}

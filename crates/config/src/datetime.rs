//! Datetime parsing shared by config validation and bookmark handling
//!
//! A `start_date` is accepted exactly when the same string would be accepted
//! as a saved bookmark.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Parse a datetime string in any of the shapes Iterable produces
///
/// Strings without an offset are taken as UTC.
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in [
        "%Y-%m-%d %H:%M:%S%.f %:z",
        "%Y-%m-%d %H:%M:%S%.f %z",
        "%Y-%m-%d %H:%M:%S%.f%:z",
        "%Y-%m-%dT%H:%M:%S%.f%z",
    ] {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    // Trailing zone names like "UTC" carry no offset information we need
    let naive_value = value.strip_suffix(" UTC").unwrap_or(value);
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(naive_value, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_iterable_export_shape() {
        assert_eq!(
            parse_datetime("2021-01-01 00:00:00 +00:00"),
            Some(Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_offset_is_applied() {
        assert_eq!(
            parse_datetime("2021-01-01 02:00:00 +02:00"),
            Some(Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_whitespace_only() {
        assert!(parse_datetime("   ").is_none());
    }
}

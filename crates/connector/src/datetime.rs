//! Datetime normalization
//!
//! Iterable returns timestamps as epoch milliseconds on the REST endpoints and
//! as `YYYY-MM-DD HH:MM:SS +00:00` strings in bulk exports. Everything is
//! normalized to one canonical ISO 8601 form (`2021-01-01T00:00:00Z`) and
//! compared as parsed datetimes, never as strings.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

pub use tap_iterable_config::parse_datetime;

/// Datetime format expected by `export/data.json`
const EXPORT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Canonical string form used for records and bookmarks
pub fn format_iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Format for the `startDateTime`/`endDateTime` export parameters (UTC)
pub fn format_export(dt: DateTime<Utc>) -> String {
    dt.format(EXPORT_FORMAT).to_string()
}

/// Convert epoch milliseconds to UTC
pub fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

/// Interpret a replication value (epoch millis or datetime string)
///
/// Returns the parsed datetime and its canonical string. Strings are returned
/// unchanged; numbers are converted.
pub fn normalize_value(value: &Value) -> Option<(DateTime<Utc>, String)> {
    match value {
        Value::String(s) => parse_datetime(s).map(|dt| (dt, s.clone())),
        Value::Number(n) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            from_epoch_millis(millis).map(|dt| (dt, format_iso(dt)))
        }
        _ => None,
    }
}

/// Replace numeric epoch-millisecond fields with ISO strings in place
///
/// Missing fields, nulls and values that are already strings are left alone.
pub fn normalize_epoch_fields(record: &mut Value, fields: &[&str]) {
    let Some(object) = record.as_object_mut() else {
        return;
    };
    for field in fields {
        if let Some(value) = object.get_mut(*field)
            && let Some(millis) = value.as_i64()
            && let Some(dt) = from_epoch_millis(millis)
        {
            *value = Value::String(format_iso(dt));
        }
    }
}

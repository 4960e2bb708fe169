//! Bulk data export
//!
//! `export/data.json` answers one data type over a bounded time range with
//! newline-delimited JSON. The range from the bookmark to now is split into
//! consecutive windows so no single request covers more than the configured
//! number of days.

use chrono::{DateTime, Duration, Utc};
use futures_util::{StreamExt, TryStreamExt, stream};
use serde_json::Value;
use tracing::{debug, warn};

use super::{FetchRequest, RecordStream};
use crate::client::IterableClient;
use crate::datetime::{format_export, parse_datetime};
use crate::error::IterableError;
use crate::lines::LinePolicy;

const EXPORT_PATH: &str = "export/data.json";

/// Split `[start, end)` into consecutive windows of at most `window_days`
///
/// Each window starts where the previous one ended and the last one ends at
/// `end`. An empty range (start at or after end) yields no windows.
pub fn export_windows(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    window_days: u32,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let step = Duration::days(i64::from(window_days.max(1)));
    let mut windows = Vec::new();
    let mut cursor = start;
    while cursor < end {
        let next = (cursor + step).min(end);
        windows.push((cursor, next));
        cursor = next;
    }
    windows
}

pub(super) fn fetch_export<'a>(
    client: &'a IterableClient,
    data_type: &'static str,
    parse_transactional: bool,
    request: &FetchRequest,
) -> RecordStream<'a> {
    let Some(start) = parse_datetime(&request.bookmark) else {
        let bookmark = request.bookmark.clone();
        return stream::once(async move { Err(IterableError::InvalidDatetime(bookmark)) }).boxed();
    };

    let windows = export_windows(start, request.now, request.window_days);
    debug!(
        data_type,
        windows = windows.len(),
        from = %format_export(start),
        to = %format_export(request.now),
        "planned export windows"
    );

    stream::iter(windows)
        .then(move |(from, to)| async move {
            let (from, to) = (format_export(from), format_export(to));
            debug!(data_type, from = %from, to = %to, "exporting window");
            client
                .get_lines(
                    EXPORT_PATH,
                    &[
                        ("dataTypeName", data_type),
                        ("startDateTime", from.as_str()),
                        ("endDateTime", to.as_str()),
                    ],
                    LinePolicy::Json,
                )
                .await
        })
        .try_flatten()
        .map_ok(move |mut record| {
            if parse_transactional {
                parse_transactional_data(&mut record);
            }
            record
        })
        .boxed()
}

/// Replace a JSON-encoded `transactionalData` string with the parsed value
///
/// Records without the field, or whose field does not parse, pass through
/// unchanged.
pub(crate) fn parse_transactional_data(record: &mut Value) {
    let Some(field) = record.get_mut("transactionalData") else {
        return;
    };
    let parsed = field.as_str().map(serde_json::from_str::<Value>);
    match parsed {
        Some(Ok(value)) => *field = value,
        Some(Err(e)) => warn!(error = %e, "transactionalData is not valid JSON, keeping string"),
        None => {}
    }
}

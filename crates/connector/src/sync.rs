//! Stream engine
//!
//! A [`SyncRun`] drives one stream sync: it resolves the starting bookmark,
//! pulls records from the stream's fetcher, tracks the session high-water-mark
//! for incremental streams and commits it to [`State`] once the fetcher is
//! exhausted.
//!
//! Incremental records are always emitted. The high-water-mark only moves the
//! bookmark; it never filters records, since exports are not strictly ordered
//! within a window.
//!
//! The bookmark is written at most once, after the last record. A run that is
//! dropped early or that fails leaves [`State`] untouched, so the next run
//! re-reads from the last committed bookmark.

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde_json::Value;
use tap_iterable_config::Config;
use tracing::{debug, info, warn};

use crate::client::IterableClient;
use crate::datetime::{format_iso, normalize_value, parse_datetime};
use crate::error::Result;
use crate::fetchers::{FetchRequest, RecordStream};
use crate::state::State;
use crate::streams::StreamDef;

/// Run-wide sync inputs taken from the config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Bookmark used when a stream has none
    pub start_date: String,
    /// Export window size in days
    pub window_days: u32,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            start_date: config.start_date.clone(),
            window_days: config.api_window_in_days,
        }
    }
}

/// One record tagged with its stream
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedRecord {
    pub stream: &'static str,
    pub record: Value,
}

/// Outcome of a sync run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    pub stream: &'static str,
    /// Records emitted so far
    pub records: u64,
    /// Bookmark written to state, if any
    pub committed_bookmark: Option<String>,
    /// Whether the fetcher was exhausted
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Fetching,
    Done,
    Failed,
}

/// Sync of a single stream
///
/// Not reusable: once [`SyncRun::next`] has returned `Ok(None)` or an error,
/// every later call returns `Ok(None)`.
///
/// The record stream borrows the client for `'c`; state is borrowed for `'s`
/// only, so it can be read again as soon as the run is no longer used.
pub struct SyncRun<'c, 's> {
    stream: &'static StreamDef,
    state: &'s mut State,
    records: Option<RecordStream<'c>>,
    phase: Phase,
    persisted: Option<DateTime<Utc>>,
    high_water_mark: Option<DateTime<Utc>>,
    emitted: u64,
    committed: Option<String>,
}

impl<'c, 's> SyncRun<'c, 's> {
    /// Start a sync using the current time as the end of export ranges
    pub fn start(
        client: &'c IterableClient,
        stream: &'static StreamDef,
        state: &'s mut State,
        settings: &SyncSettings,
    ) -> Self {
        Self::start_at(client, stream, state, settings, Utc::now())
    }

    /// Start a sync with an explicit "now"
    pub fn start_at(
        client: &'c IterableClient,
        stream: &'static StreamDef,
        state: &'s mut State,
        settings: &SyncSettings,
        now: DateTime<Utc>,
    ) -> Self {
        let saved = stream
            .replication_key
            .and_then(|key| state.bookmark(stream.name, key.name))
            .map(str::to_string);

        let persisted = saved.as_deref().and_then(|value| {
            let parsed = parse_datetime(value);
            if parsed.is_none() {
                warn!(stream = stream.name, bookmark = value, "saved bookmark is not a datetime");
            }
            parsed
        });

        let bookmark = saved.unwrap_or_else(|| settings.start_date.clone());
        info!(
            stream = stream.name,
            method = %stream.replication_method,
            bookmark = %bookmark,
            "starting stream sync"
        );

        let request = FetchRequest {
            bookmark,
            now,
            window_days: settings.window_days,
        };
        let records = stream.fetcher.fetch(client, &request);

        Self {
            stream,
            state,
            records: Some(records),
            phase: Phase::Fetching,
            persisted,
            high_water_mark: None,
            emitted: 0,
            committed: None,
        }
    }

    /// Stream being synced
    pub fn stream(&self) -> &'static StreamDef {
        self.stream
    }

    /// Next record, or `None` once the stream is exhausted
    ///
    /// # Errors
    ///
    /// Returns the fetch error that ended the run. Nothing is committed.
    pub async fn next(&mut self) -> Result<Option<EmittedRecord>> {
        let Some(records) = self.records.as_mut() else {
            return Ok(None);
        };

        let item = records.next().await;
        match item {
            Some(Ok(record)) => {
                self.observe(&record);
                self.emitted += 1;
                Ok(Some(EmittedRecord {
                    stream: self.stream.name,
                    record,
                }))
            }
            Some(Err(e)) => {
                self.records = None;
                self.phase = Phase::Failed;
                warn!(
                    stream = self.stream.name,
                    records = self.emitted,
                    error = %e,
                    "stream sync failed, bookmark not advanced"
                );
                Err(e)
            }
            None => {
                self.records = None;
                self.finalize();
                Ok(None)
            }
        }
    }

    /// Counts and committed bookmark so far
    pub fn summary(&self) -> SyncSummary {
        SyncSummary {
            stream: self.stream.name,
            records: self.emitted,
            committed_bookmark: self.committed.clone(),
            completed: self.phase == Phase::Done,
        }
    }

    fn observe(&mut self, record: &Value) {
        if !self.stream.is_incremental() {
            return;
        }
        let Some(key) = self.stream.replication_key else {
            return;
        };

        match key.value(record).and_then(normalize_value) {
            Some((value, _)) => {
                if self.high_water_mark.is_none_or(|current| value > current) {
                    self.high_water_mark = Some(value);
                }
            }
            None => warn!(
                stream = self.stream.name,
                key = key.path,
                "record has no usable replication value"
            ),
        }
    }

    fn finalize(&mut self) {
        if self.phase != Phase::Fetching {
            return;
        }
        self.phase = Phase::Done;

        if let Some(key) = self.stream.replication_key
            && self.stream.is_incremental()
            && let Some(mark) = self.high_water_mark
        {
            if self.persisted.is_none_or(|persisted| mark > persisted) {
                let value = format_iso(mark);
                self.state.write_bookmark(self.stream.name, key.name, value.clone());
                self.committed = Some(value);
            } else {
                debug!(
                    stream = self.stream.name,
                    "high-water-mark not newer than saved bookmark"
                );
            }
        }

        info!(
            stream = self.stream.name,
            records = self.emitted,
            bookmark = self.committed.as_deref().unwrap_or("-"),
            "stream sync complete"
        );
    }
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod tests;

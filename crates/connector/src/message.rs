//! Singer output messages
//!
//! One JSON object per line: `SCHEMA` before a stream's records, `RECORD` per
//! record and `STATE` after each stream completes.

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::datetime::format_iso;
use crate::state::State;
use crate::streams::StreamDef;
use crate::sync::EmittedRecord;

/// A Singer message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    Schema {
        stream: String,
        schema: Value,
        key_properties: Vec<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        bookmark_properties: Vec<String>,
    },
    Record {
        stream: String,
        record: Value,
        time_extracted: String,
    },
    State {
        value: Value,
    },
}

impl Message {
    pub fn schema(stream: &StreamDef, schema: Value) -> Self {
        Message::Schema {
            stream: stream.name.to_string(),
            schema,
            key_properties: stream.key_properties.iter().map(|k| k.to_string()).collect(),
            bookmark_properties: stream
                .replication_key
                .map(|key| vec![key.name.to_string()])
                .unwrap_or_default(),
        }
    }

    pub fn record(emitted: EmittedRecord, extracted_at: DateTime<Utc>) -> Self {
        Message::Record {
            stream: emitted.stream.to_string(),
            record: emitted.record,
            time_extracted: format_iso(extracted_at),
        }
    }

    pub fn state(state: &State) -> Self {
        Message::State {
            value: state.to_value(),
        }
    }
}

/// Writes messages as JSON lines
pub struct MessageWriter<W: Write> {
    out: W,
    written: u64,
}

impl<W: Write> MessageWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    /// Write one message; `STATE` messages are flushed immediately
    pub fn write(&mut self, message: &Message) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, message)?;
        self.out.write_all(b"\n")?;
        self.written += 1;
        if matches!(message, Message::State { .. }) {
            self.out.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    /// Number of messages written
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

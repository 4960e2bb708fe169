//! Replication state
//!
//! Singer-shaped: `{"bookmarks": {"<stream>": {"<key>": "<value>"}}}`. Unknown
//! top-level fields survive a load/save round trip.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{IterableError, Result};

/// Bookmarks per stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub bookmarks: BTreeMap<String, BTreeMap<String, Value>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl State {
    /// Load state from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not valid state JSON
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| IterableError::Init(format!("failed to read state {}: {}", path.display(), e)))?;
        Self::from_json(&content).map_err(|e| match e {
            IterableError::Decode { source, .. } => {
                IterableError::decode(path.display().to_string(), source)
            }
            other => other,
        })
    }

    /// Parse state from a JSON string; an empty string is an empty state
    pub fn from_json(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(content).map_err(|e| IterableError::decode("state", e))
    }

    /// Bookmark value as a string, if one is stored
    pub fn bookmark(&self, stream: &str, key: &str) -> Option<&str> {
        self.bookmarks
            .get(stream)
            .and_then(|keys| keys.get(key))
            .and_then(Value::as_str)
    }

    /// Store a bookmark, replacing any previous value
    pub fn write_bookmark(&mut self, stream: &str, key: &str, value: impl Into<String>) {
        self.bookmarks
            .entry(stream.to_string())
            .or_default()
            .insert(key.to_string(), Value::String(value.into()));
    }

    /// Serialize to a JSON value (for STATE messages)
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

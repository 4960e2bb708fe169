//! Discovery and catalog selection
//!
//! [`discover`] builds a Singer catalog from the stream registry and schemas
//! without touching the network. A catalog read back from disk decides which
//! streams a sync run includes.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::warn;

use crate::error::{IterableError, Result};
use crate::schema::{SchemaSource, property_names};
use crate::streams::{STREAMS, StreamDef};

/// Stream that custom user fields are merged into
const USERS_STREAM: &str = "users";

/// Singer catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub streams: Vec<CatalogEntry>,
}

/// One stream in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub stream: String,
    pub tap_stream_id: String,
    pub schema: Value,
    #[serde(default)]
    pub metadata: Vec<MetadataEntry>,
}

/// Metadata for the stream (empty breadcrumb) or one of its properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub breadcrumb: Vec<String>,
    pub metadata: Map<String, Value>,
}

impl MetadataEntry {
    fn stream_level(metadata: Map<String, Value>) -> Self {
        Self {
            breadcrumb: Vec::new(),
            metadata,
        }
    }

    fn property(name: &str, inclusion: &str) -> Self {
        let mut metadata = Map::new();
        metadata.insert("inclusion".to_string(), json!(inclusion));
        Self {
            breadcrumb: vec!["properties".to_string(), name.to_string()],
            metadata,
        }
    }
}

/// Build the catalog for every registered stream
///
/// # Errors
///
/// Returns error if a stream's schema is missing or invalid
pub fn discover(source: &SchemaSource) -> Result<Catalog> {
    let streams = STREAMS
        .iter()
        .map(|stream| -> Result<CatalogEntry> {
            let schema = source.resolved(stream.name)?;
            Ok(CatalogEntry::new(stream, schema))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Catalog { streams })
}

fn inclusion(stream: &StreamDef, field: &str) -> &'static str {
    let is_key = stream.key_properties.iter().any(|key| *key == field);
    let is_replication = stream
        .replication_key
        .is_some_and(|key| key.top_level_field() == field);
    if is_key || is_replication {
        "automatic"
    } else {
        "available"
    }
}

impl CatalogEntry {
    /// Entry for a registered stream with its resolved schema
    pub fn new(stream: &StreamDef, schema: Value) -> Self {
        let mut root = Map::new();
        root.insert(
            "table-key-properties".to_string(),
            json!(stream.key_properties),
        );
        root.insert(
            "forced-replication-method".to_string(),
            json!(stream.replication_method.as_str()),
        );
        if let Some(key) = stream.replication_key {
            root.insert("valid-replication-keys".to_string(), json!([key.name]));
        }

        let metadata = std::iter::once(MetadataEntry::stream_level(root))
            .chain(
                property_names(&schema)
                    .iter()
                    .map(|field| MetadataEntry::property(field, inclusion(stream, field))),
            )
            .collect();

        Self {
            stream: stream.name.to_string(),
            tap_stream_id: stream.name.to_string(),
            schema,
            metadata,
        }
    }

    fn root_metadata(&self) -> Option<&Map<String, Value>> {
        self.metadata
            .iter()
            .find(|m| m.breadcrumb.is_empty())
            .map(|m| &m.metadata)
    }

    /// Whether the stream-level metadata has `selected: true`
    pub fn is_selected(&self) -> bool {
        self.root_metadata()
            .and_then(|m| m.get("selected"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

impl Catalog {
    /// Load a catalog from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            IterableError::Init(format!("failed to read catalog {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| IterableError::decode(path.display().to_string(), e))
    }

    /// Entry by stream id
    pub fn entry(&self, stream: &str) -> Option<&CatalogEntry> {
        self.streams.iter().find(|e| e.tap_stream_id == stream)
    }

    /// Registered streams selected in this catalog, in registry order
    ///
    /// Selected entries that name no registered stream are skipped with a warning.
    pub fn selected_streams(&self) -> Vec<&'static StreamDef> {
        for entry in self.streams.iter().filter(|e| e.is_selected()) {
            if !STREAMS.iter().any(|s| s.name == entry.tap_stream_id) {
                warn!(stream = %entry.tap_stream_id, "selected stream is not supported, skipping");
            }
        }
        STREAMS
            .iter()
            .filter(|s| self.entry(s.name).is_some_and(CatalogEntry::is_selected))
            .collect()
    }

    /// Add custom user fields to the `users` schema
    ///
    /// `fields` maps field name to Iterable type as returned by
    /// `users/getFields`. Properties already in the schema are kept as they
    /// are; nested names (containing `.`) are covered by their parent field.
    pub fn merge_user_fields(&mut self, fields: &BTreeMap<String, String>) {
        let Some(entry) = self.streams.iter_mut().find(|e| e.tap_stream_id == USERS_STREAM) else {
            return;
        };
        let Some(properties) = entry
            .schema
            .get_mut("properties")
            .and_then(Value::as_object_mut)
        else {
            return;
        };

        let mut added = Vec::new();
        for (name, kind) in fields {
            if name.contains('.') || properties.contains_key(name) {
                continue;
            }
            properties.insert(name.clone(), user_field_schema(kind));
            added.push(name.clone());
        }

        entry.metadata.extend(
            added
                .iter()
                .map(|name| MetadataEntry::property(name, "available")),
        );
    }
}

/// JSON Schema for an Iterable user field type
fn user_field_schema(kind: &str) -> Value {
    match kind {
        "long" => json!({"type": ["null", "integer"]}),
        "double" => json!({"type": ["null", "number"]}),
        "boolean" => json!({"type": ["null", "boolean"]}),
        "date" => json!({"type": ["null", "string"], "format": "date-time"}),
        "object" | "nested" => json!({"type": ["null", "object"], "additionalProperties": true}),
        _ => json!({"type": ["null", "string"]}),
    }
}

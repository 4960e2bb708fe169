//! Stream schemas
//!
//! One JSON Schema per stream, compiled into the binary from `schemas/`. A
//! schema directory can override individual streams by file name
//! (`<stream>.json`); streams without an override use the embedded copy.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tap_iterable_config::Config;
use tracing::debug;

use crate::error::{IterableError, Result};

fn embedded(stream: &str) -> Option<&'static str> {
    let schema = match stream {
        "lists" => include_str!("../schemas/lists.json"),
        "list_users" => include_str!("../schemas/list_users.json"),
        "campaigns" => include_str!("../schemas/campaigns.json"),
        "channels" => include_str!("../schemas/channels.json"),
        "message_types" => include_str!("../schemas/message_types.json"),
        "templates" => include_str!("../schemas/templates.json"),
        "metadata" => include_str!("../schemas/metadata.json"),
        "email_bounce" => include_str!("../schemas/email_bounce.json"),
        "email_click" => include_str!("../schemas/email_click.json"),
        "email_complaint" => include_str!("../schemas/email_complaint.json"),
        "email_open" => include_str!("../schemas/email_open.json"),
        "email_send" => include_str!("../schemas/email_send.json"),
        "email_send_skip" => include_str!("../schemas/email_send_skip.json"),
        "email_subscribe" => include_str!("../schemas/email_subscribe.json"),
        "email_unsubscribe" => include_str!("../schemas/email_unsubscribe.json"),
        "users" => include_str!("../schemas/users.json"),
        _ => return None,
    };
    Some(schema)
}

/// Where schemas are loaded from
#[derive(Debug, Clone, Default)]
pub struct SchemaSource {
    dir: Option<PathBuf>,
}

impl SchemaSource {
    /// Embedded schemas only
    pub fn embedded() -> Self {
        Self { dir: None }
    }

    /// Embedded schemas, overridden by files in `dir`
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            dir: config.schema_dir.clone(),
        }
    }

    /// Load a stream's schema as written, without resolving references
    ///
    /// # Errors
    ///
    /// Returns error if no schema exists for the stream or it is not valid JSON
    pub fn load(&self, stream: &str) -> Result<Value> {
        if let Some(dir) = &self.dir {
            let path = dir.join(format!("{stream}.json"));
            if path.is_file() {
                debug!(stream, path = %path.display(), "loading schema override");
                return read_schema_file(stream, &path);
            }
        }

        let raw = embedded(stream)
            .ok_or_else(|| IterableError::schema(stream, "no schema for stream"))?;
        parse_schema(stream, raw)
    }

    /// Load a stream's schema with local references inlined
    pub fn resolved(&self, stream: &str) -> Result<Value> {
        let schema = self.load(stream)?;
        resolve_refs(stream, &schema)
    }
}

fn read_schema_file(stream: &str, path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        IterableError::schema(stream, format!("failed to read {}: {}", path.display(), e))
    })?;
    parse_schema(stream, &content)
}

fn parse_schema(stream: &str, content: &str) -> Result<Value> {
    let schema: Value = serde_json::from_str(content)
        .map_err(|e| IterableError::schema(stream, format!("invalid JSON: {e}")))?;
    if !schema.get("properties").is_some_and(Value::is_object) {
        return Err(IterableError::schema(stream, "schema has no 'properties' object"));
    }
    Ok(schema)
}

/// Inline local `$ref` pointers (`#/definitions/...`)
///
/// The top-level `definitions` block is dropped from the result. Remote
/// references and reference cycles are errors.
pub fn resolve_refs(stream: &str, schema: &Value) -> Result<Value> {
    let Value::Object(root) = schema else {
        return Err(IterableError::schema(stream, "schema is not an object"));
    };

    let mut stack = Vec::new();
    let mut resolved = Map::new();
    for (key, value) in root {
        if key == "definitions" {
            continue;
        }
        resolved.insert(key.clone(), resolve_node(stream, schema, value, &mut stack)?);
    }
    Ok(Value::Object(resolved))
}

fn resolve_node(
    stream: &str,
    root: &Value,
    node: &Value,
    stack: &mut Vec<String>,
) -> Result<Value> {
    match node {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get("$ref") {
                let pointer = reference.strip_prefix('#').ok_or_else(|| {
                    IterableError::schema(stream, format!("unsupported reference '{reference}'"))
                })?;
                if stack.contains(reference) {
                    return Err(IterableError::schema(
                        stream,
                        format!("reference cycle through '{reference}'"),
                    ));
                }
                let target = root.pointer(pointer).ok_or_else(|| {
                    IterableError::schema(stream, format!("unresolved reference '{reference}'"))
                })?;

                stack.push(reference.clone());
                let resolved = resolve_node(stream, root, target, stack);
                stack.pop();
                return resolved;
            }

            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key.clone(), resolve_node(stream, root, value, stack)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_node(stream, root, item, stack))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

/// Top-level property names of a schema
pub fn property_names(schema: &Value) -> Vec<String> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| props.keys().cloned().collect())
        .unwrap_or_default()
}

//! Resource fetchers
//!
//! Each Iterable resource is read by one [`Fetcher`] variant. A fetcher turns a
//! starting bookmark into a lazy, single-pass [`RecordStream`]: requests are
//! issued only as the caller pulls records, and dropping the stream stops all
//! further network calls.

mod collection;
mod export;
mod list_users;
mod metadata;
mod templates;

use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use serde_json::Value;

use crate::client::IterableClient;
use crate::error::{IterableError, Result};

pub use export::export_windows;
pub use templates::{MESSAGE_MEDIUMS, TEMPLATE_TYPES};

/// Raw records of one resource
pub type RecordStream<'a> = BoxStream<'a, Result<Value>>;

/// Inputs for one fetch
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Effective starting bookmark (saved bookmark or start date)
    pub bookmark: String,
    /// Wall clock at sync start; end of export ranges
    pub now: DateTime<Utc>,
    /// Export window size in days
    pub window_days: u32,
}

/// How a resource is read from the API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetcher {
    /// One GET returning an array under `field`
    Collection {
        path: &'static str,
        field: &'static str,
        epoch_fields: &'static [&'static str],
    },
    /// Every template type crossed with every message medium
    Templates,
    /// Lists, then the members of each list
    ListUsers,
    /// Tables, then keys per table, then the value per key
    Metadata,
    /// Windowed bulk export of one data type
    Export {
        data_type: &'static str,
        parse_transactional: bool,
    },
}

impl Fetcher {
    /// Start reading records
    pub fn fetch<'a>(self, client: &'a IterableClient, request: &FetchRequest) -> RecordStream<'a> {
        match self {
            Fetcher::Collection {
                path,
                field,
                epoch_fields,
            } => collection::fetch_collection(client, path, field, epoch_fields),
            Fetcher::Templates => templates::fetch_templates(client),
            Fetcher::ListUsers => list_users::fetch_list_users(client, request.now),
            Fetcher::Metadata => metadata::fetch_metadata(client),
            Fetcher::Export {
                data_type,
                parse_transactional,
            } => export::fetch_export(client, data_type, parse_transactional, request),
        }
    }
}

/// Take the array under `field`, failing if it is absent
pub(crate) fn required_array(path: &str, mut body: Value, field: &str) -> Result<Vec<Value>> {
    match body.get_mut(field).map(Value::take) {
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(IterableError::unexpected(
            path,
            format!("'{}' is not an array: {}", field, type_name(&other)),
        )),
        None => Err(IterableError::unexpected(
            path,
            format!("missing '{}' array", field),
        )),
    }
}

/// Take the array under `field`; absent or null means no records
pub(crate) fn optional_array(path: &str, mut body: Value, field: &str) -> Result<Vec<Value>> {
    match body.get_mut(field).map(Value::take) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(IterableError::unexpected(
            path,
            format!("'{}' is not an array: {}", field, type_name(&other)),
        )),
    }
}

/// Render an id for use as a query parameter or path segment
pub(crate) fn id_param(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests;

//! Metadata tables
//!
//! Three levels: `metadata` lists tables, `metadata/{table}` lists keys and
//! `metadata/{table}/{key}` returns the value object that becomes the record.

use futures_util::{StreamExt, TryStreamExt, stream};
use serde_json::Value;

use super::{RecordStream, id_param, required_array};
use crate::client::IterableClient;
use crate::error::{IterableError, Result};

pub(super) fn fetch_metadata(client: &IterableClient) -> RecordStream<'_> {
    stream::once(async move {
        let body = client.get_json("metadata", &[]).await?;
        required_array("metadata", body, "results")
    })
    .map_ok(move |tables| {
        stream::iter(tables.into_iter().map(Ok::<Value, IterableError>))
            .and_then(move |table| table_keys(client, table))
            .map_ok(|keys| stream::iter(keys.into_iter().map(Ok::<Value, IterableError>)))
            .try_flatten()
    })
    .try_flatten()
    .and_then(move |key| key_value(client, key))
    .boxed()
}

fn string_field(path: &str, value: &Value, field: &str) -> Result<String> {
    value
        .get(field)
        .filter(|v| !v.is_null())
        .map(id_param)
        .ok_or_else(|| IterableError::unexpected(path, format!("entry without '{}'", field)))
}

async fn table_keys(client: &IterableClient, table: Value) -> Result<Vec<Value>> {
    let name = string_field("metadata", &table, "name")?;
    let path = format!("metadata/{}", urlencoding::encode(&name));
    let body = client.get_json(&path, &[]).await?;
    required_array(&path, body, "results")
}

async fn key_value(client: &IterableClient, key: Value) -> Result<Value> {
    let table = string_field("metadata", &key, "table")?;
    let key = string_field("metadata", &key, "key")?;
    let path = format!(
        "metadata/{}/{}",
        urlencoding::encode(&table),
        urlencoding::encode(&key)
    );
    client.get_json(&path, &[]).await
}

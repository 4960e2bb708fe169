//! List membership
//!
//! `lists/getUsers` streams one member email per line. Members carry no
//! timestamp of their own, so every record is stamped with the sync time.

use chrono::{DateTime, Utc};
use futures_util::{StreamExt, TryStreamExt, stream};
use serde_json::{Value, json};

use super::{RecordStream, id_param, required_array};
use crate::client::IterableClient;
use crate::datetime::format_iso;
use crate::error::{IterableError, Result};
use crate::lines::LinePolicy;

pub(super) fn fetch_list_users(client: &IterableClient, now: DateTime<Utc>) -> RecordStream<'_> {
    let updated_at = format_iso(now);

    stream::once(async move {
        let body = client.get_json("lists", &[]).await?;
        required_array("lists", body, "lists")
    })
    .map_ok(move |lists| {
        let updated_at = updated_at.clone();
        stream::iter(lists.into_iter().map(Ok::<Value, IterableError>))
            .and_then(move |list| list_members(client, list, updated_at.clone()))
            .try_flatten()
    })
    .try_flatten()
    .boxed()
}

async fn list_members(
    client: &IterableClient,
    list: Value,
    updated_at: String,
) -> Result<RecordStream<'static>> {
    let list_id = list
        .get("id")
        .cloned()
        .ok_or_else(|| IterableError::unexpected("lists", "list entry without 'id'"))?;
    let list_param = id_param(&list_id);

    let members = client
        .get_lines(
            "lists/getUsers",
            &[("listId", list_param.as_str())],
            LinePolicy::JsonOrRaw,
        )
        .await?;

    Ok(members
        .map_ok(move |email| {
            json!({
                "email": email,
                "listId": list_id.clone(),
                "updatedAt": updated_at.clone(),
            })
        })
        .boxed())
}

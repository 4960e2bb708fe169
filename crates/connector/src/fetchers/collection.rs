//! Single-request collections (lists, campaigns, channels, message types)

use futures_util::{StreamExt, TryStreamExt, stream};
use serde_json::Value;

use super::{RecordStream, required_array};
use crate::client::IterableClient;
use crate::datetime::normalize_epoch_fields;
use crate::error::IterableError;

pub(super) fn fetch_collection<'a>(
    client: &'a IterableClient,
    path: &'static str,
    field: &'static str,
    epoch_fields: &'static [&'static str],
) -> RecordStream<'a> {
    stream::once(async move {
        let body = client.get_json(path, &[]).await?;
        required_array(path, body, field)
    })
    .map_ok(|items| stream::iter(items.into_iter().map(Ok::<Value, IterableError>)))
    .try_flatten()
    .map_ok(move |mut record| {
        normalize_epoch_fields(&mut record, epoch_fields);
        record
    })
    .boxed()
}

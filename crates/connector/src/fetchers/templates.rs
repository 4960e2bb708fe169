//! Templates
//!
//! The templates endpoint only filters, it never lists everything, so every
//! template type is requested once per message medium.

use futures_util::{StreamExt, TryStreamExt, stream};
use serde_json::Value;
use tracing::debug;

use super::{RecordStream, optional_array};
use crate::client::IterableClient;
use crate::datetime::normalize_epoch_fields;
use crate::error::IterableError;

/// `templateTypes` values, in request order
pub const TEMPLATE_TYPES: [&str; 4] = ["Base", "Blast", "Triggered", "Workflow"];

/// `messageMedium` values, in request order
pub const MESSAGE_MEDIUMS: [&str; 4] = ["Email", "Push", "InApp", "SMS"];

const EPOCH_FIELDS: &[&str] = &["createdAt", "updatedAt"];

fn template_queries() -> impl Iterator<Item = (&'static str, &'static str)> {
    TEMPLATE_TYPES
        .into_iter()
        .flat_map(|kind| MESSAGE_MEDIUMS.into_iter().map(move |medium| (kind, medium)))
}

pub(super) fn fetch_templates(client: &IterableClient) -> RecordStream<'_> {
    stream::iter(template_queries())
        .then(move |(kind, medium)| async move {
            let body = client
                .get_json(
                    "templates",
                    &[("templateTypes", kind), ("messageMedium", medium)],
                )
                .await?;
            let templates = optional_array("templates", body, "templates")?;
            debug!(
                template_type = kind,
                medium,
                count = templates.len(),
                "fetched templates"
            );
            Ok::<_, IterableError>(templates)
        })
        .map_ok(|items| stream::iter(items.into_iter().map(Ok::<Value, IterableError>)))
        .try_flatten()
        .map_ok(|mut record| {
            normalize_epoch_fields(&mut record, EPOCH_FIELDS);
            record
        })
        .boxed()
}

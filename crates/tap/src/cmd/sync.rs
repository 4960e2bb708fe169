//! Sync command - emit Singer messages for each selected stream
//!
//! Streams are synced one after another. A stream that fails is logged and
//! skipped; its bookmark stays where it was and the remaining streams still
//! run. The command fails at the end if any stream failed.

use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use tap_iterable_config::Config;
use tap_iterable_connector::{
    Catalog, IterableClient, IterableError, Message, MessageWriter, STREAMS, SchemaSource, State,
    StreamDef, SyncRun, SyncSettings, SyncSummary,
};
use tracing::{error, info};

/// Outcome of syncing several streams
#[derive(Debug, Default)]
pub struct SyncReport {
    pub completed: Vec<SyncSummary>,
    pub failed: Vec<(&'static str, String)>,
}

/// Run the sync and write messages to stdout
pub async fn run(config: &Config, state_path: Option<&Path>, catalog_path: Option<&Path>) -> Result<()> {
    let client = IterableClient::new(config).context("failed to create Iterable client")?;

    let mut state = match state_path {
        Some(path) => State::from_file(path).context("failed to load state")?,
        None => State::default(),
    };

    let catalog = match catalog_path {
        Some(path) => Some(Catalog::from_file(path).context("failed to load catalog")?),
        None => None,
    };
    let streams: Vec<&'static StreamDef> = match &catalog {
        Some(catalog) => catalog.selected_streams(),
        None => STREAMS.iter().collect(),
    };

    let source = SchemaSource::from_config(config);
    let settings = SyncSettings::from_config(config);
    let mut writer = MessageWriter::new(BufWriter::new(std::io::stdout()));

    let report = sync_streams(
        &client,
        &streams,
        catalog.as_ref(),
        &source,
        &settings,
        &mut state,
        &mut writer,
    )
    .await?;
    writer.flush().context("failed to flush output")?;

    let metrics = client.metrics();
    info!(
        completed = report.completed.len(),
        failed = report.failed.len(),
        requests = metrics.requests(),
        retries = metrics.retries(),
        "sync finished"
    );

    if !report.failed.is_empty() {
        let names: Vec<&str> = report.failed.iter().map(|(name, _)| *name).collect();
        anyhow::bail!("{} stream(s) failed: {}", names.len(), names.join(", "));
    }
    Ok(())
}

/// Sync each stream in order, isolating stream failures
///
/// # Errors
///
/// Only output failures are returned; stream failures are collected in the report.
pub async fn sync_streams<W: Write>(
    client: &IterableClient,
    streams: &[&'static StreamDef],
    catalog: Option<&Catalog>,
    source: &SchemaSource,
    settings: &SyncSettings,
    state: &mut State,
    writer: &mut MessageWriter<W>,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    for &stream in streams {
        match sync_stream(client, stream, catalog, source, settings, state, writer).await? {
            Ok(summary) => {
                writer
                    .write(&Message::state(state))
                    .context("failed to write STATE message")?;
                report.completed.push(summary);
            }
            Err(e) => {
                error!(stream = stream.name, error = %e, "stream sync failed");
                report.failed.push((stream.name, e.to_string()));
            }
        }
    }

    Ok(report)
}

/// Outer error: output failure. Inner error: the stream itself failed.
async fn sync_stream<W: Write>(
    client: &IterableClient,
    stream: &'static StreamDef,
    catalog: Option<&Catalog>,
    source: &SchemaSource,
    settings: &SyncSettings,
    state: &mut State,
    writer: &mut MessageWriter<W>,
) -> Result<std::result::Result<SyncSummary, IterableError>> {
    let schema = match stream_schema(stream, catalog, source) {
        Ok(schema) => schema,
        Err(e) => return Ok(Err(e)),
    };
    writer
        .write(&Message::schema(stream, schema))
        .context("failed to write SCHEMA message")?;

    let mut run = SyncRun::start(client, stream, state, settings);
    loop {
        match run.next().await {
            Ok(Some(emitted)) => writer
                .write(&Message::record(emitted, Utc::now()))
                .context("failed to write RECORD message")?,
            Ok(None) => return Ok(Ok(run.summary())),
            Err(e) => return Ok(Err(e)),
        }
    }
}

/// Schema from the catalog entry when one was given, else from the schema source
fn stream_schema(
    stream: &StreamDef,
    catalog: Option<&Catalog>,
    source: &SchemaSource,
) -> std::result::Result<Value, IterableError> {
    match catalog.and_then(|c| c.entry(stream.name)) {
        Some(entry) => Ok(entry.schema.clone()),
        None => source.resolved(stream.name),
    }
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod tests;

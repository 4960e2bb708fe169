//! Discover command - print the Singer catalog

use std::io::Write;

use anyhow::{Context, Result};
use tap_iterable_config::Config;
use tap_iterable_connector::{Catalog, IterableClient, SchemaSource, discover};

/// Run discovery and print the catalog to stdout
pub async fn run(config: &Config, user_fields: bool) -> Result<()> {
    let client = if user_fields {
        Some(IterableClient::new(config).context("failed to create Iterable client")?)
    } else {
        None
    };

    let catalog = build_catalog(config, client.as_ref()).await?;

    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &catalog).context("failed to write catalog")?;
    writeln!(stdout)?;
    Ok(())
}

/// Catalog from the registry, optionally enriched with custom user fields
pub async fn build_catalog(config: &Config, client: Option<&IterableClient>) -> Result<Catalog> {
    let source = SchemaSource::from_config(config);
    let mut catalog = discover(&source).context("failed to build catalog")?;

    if let Some(client) = client {
        let fields = client
            .user_fields()
            .await
            .context("failed to fetch custom user fields")?;
        tracing::info!(fields = fields.len(), "merging custom user fields");
        catalog.merge_user_fields(&fields);
    }

    tracing::info!(streams = catalog.streams.len(), "discovery complete");
    Ok(catalog)
}

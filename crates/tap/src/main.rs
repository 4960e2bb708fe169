//! tap-iterable - Singer tap for the Iterable API
//!
//! # Usage
//!
//! ```bash
//! # Print the catalog
//! tap-iterable --config config.json --discover
//!
//! # Include custom user fields in the users schema
//! tap-iterable --config config.json --discover --user-fields
//!
//! # Sync selected streams, resuming from saved bookmarks
//! tap-iterable --config config.json --catalog catalog.json --state state.json
//! ```
//!
//! Singer messages go to stdout; logs go to stderr or the configured file.

mod cmd;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tap_iterable_config::{Config, LogConfig, LogFormat, LogLevel, LogOutput};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

/// Singer tap for the Iterable API
#[derive(Parser, Debug)]
#[command(name = "tap-iterable")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (JSON, or TOML with a .toml extension)
    #[arg(short, long)]
    config: PathBuf,

    /// Path to state file with saved bookmarks
    #[arg(short, long)]
    state: Option<PathBuf>,

    /// Path to catalog file; only selected streams are synced
    #[arg(long, alias = "properties")]
    catalog: Option<PathBuf>,

    /// Print the catalog instead of syncing
    #[arg(short, long)]
    discover: bool,

    /// With --discover, add custom user fields from the API to the users schema
    #[arg(long, requires = "discover")]
    user_fields: bool,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "tap-iterable failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_file(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;

    let log_level = resolve_log_level(cli.log_level, &config);
    init_logging(log_level, &config.log)?;

    if cli.discover {
        cmd::discover::run(&config, cli.user_fields).await
    } else {
        cmd::sync::run(&config, cli.state.as_deref(), cli.catalog.as_deref()).await
    }
}

/// Resolve log level: CLI flag > config file > default "info"
fn resolve_log_level(cli_level: Option<LogLevel>, config: &Config) -> LogLevel {
    cli_level.unwrap_or(config.log.level)
}

/// Initialize the tracing subscriber; never writes to stdout
fn init_logging(level: LogLevel, log: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(level.filter_directive())
        .map_err(|e| anyhow::anyhow!("invalid log filter for level {level}: {e}"))?;

    let writer = match &log.output {
        LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
        LogOutput::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
    };
    let ansi = log.ansi();

    let layer = match log.format {
        LogFormat::Console => fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_writer(writer)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    Ok(())
}

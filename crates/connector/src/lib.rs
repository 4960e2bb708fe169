//! Iterable connector
//!
//! Pulls records from the Iterable REST API and tracks replication bookmarks
//! so each sync resumes where the last successful one ended.
//!
//! # Layers
//!
//! - **Client** ([`IterableClient`]): GET requests with the `api_key` parameter,
//!   backoff on 429, buffered or line-streamed JSON decoding
//! - **Fetchers** ([`Fetcher`]): per-resource request patterns (fan-out,
//!   template cross product, windowed exports) as lazy record streams
//! - **Registry** ([`STREAMS`]): static stream definitions
//! - **Engine** ([`SyncRun`]): emits records and commits the bookmark once the
//!   stream is exhausted
//! - **Discovery** ([`discover`]): Singer catalog from the registry and schemas
//!
//! # Example
//!
//! ```no_run
//! use tap_iterable_connector::{IterableClient, State, SyncRun, SyncSettings, streams};
//!
//! # async fn example(config: tap_iterable_config::Config) -> tap_iterable_connector::Result<()> {
//! let client = IterableClient::new(&config)?;
//! let settings = SyncSettings::from_config(&config);
//! let mut state = State::default();
//!
//! let mut run = SyncRun::start(&client, streams::get("campaigns")?, &mut state, &settings);
//! while let Some(emitted) = run.next().await? {
//!     println!("{}", emitted.record);
//! }
//! println!("{:?}", state.bookmark("campaigns", "updatedAt"));
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod client;
pub mod datetime;
mod error;
pub mod fetchers;
pub mod lines;
pub mod message;
pub mod resilience;
pub mod schema;
pub mod state;
pub mod streams;
pub mod sync;
pub mod test_utils;
pub mod transport;

// Re-exports
pub use catalog::{Catalog, CatalogEntry, MetadataEntry, discover};
pub use client::IterableClient;
pub use error::{IterableError, Result};
pub use fetchers::{FetchRequest, Fetcher, RecordStream};
pub use message::{Message, MessageWriter};
pub use schema::SchemaSource;
pub use state::State;
pub use streams::{ReplicationKey, ReplicationMethod, STREAMS, StreamDef};
pub use sync::{EmittedRecord, SyncRun, SyncSettings, SyncSummary};
pub use transport::{ReqwestTransport, Transport};

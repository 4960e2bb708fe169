//! Stream registry
//!
//! Every stream the connector can sync is declared once in [`STREAMS`]. The
//! table is static and never changes during a run.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{IterableError, Result};
use crate::fetchers::Fetcher;

/// How a stream is replicated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicationMethod {
    /// Every sync re-reads everything; no bookmark
    FullTable,
    /// Sync resumes from the saved bookmark
    Incremental,
}

impl ReplicationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicationMethod::FullTable => "FULL_TABLE",
            ReplicationMethod::Incremental => "INCREMENTAL",
        }
    }
}

impl fmt::Display for ReplicationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bookmark field of an incremental stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationKey {
    /// Name the bookmark is stored under
    pub name: &'static str,
    /// Dotted path the value is read from in each record
    pub path: &'static str,
}

impl ReplicationKey {
    /// Value at this key's path, if present and not null
    pub fn value<'r>(&self, record: &'r Value) -> Option<&'r Value> {
        self.path
            .split('.')
            .try_fold(record, |node, segment| node.get(segment))
            .filter(|v| !v.is_null())
    }

    /// Top-level schema property the key lives under
    pub fn top_level_field(&self) -> &'static str {
        self.path.split('.').next().unwrap_or(self.path)
    }
}

/// One registered stream
#[derive(Debug, Clone, Copy)]
pub struct StreamDef {
    pub name: &'static str,
    pub replication_method: ReplicationMethod,
    pub replication_key: Option<ReplicationKey>,
    pub key_properties: &'static [&'static str],
    pub fetcher: Fetcher,
}

impl StreamDef {
    pub fn is_incremental(&self) -> bool {
        self.replication_method == ReplicationMethod::Incremental
    }
}

const DOCUMENT_UPDATED_AT: ReplicationKey = ReplicationKey {
    name: "documentUpdatedAt",
    path: "itblInternal.documentUpdatedAt",
};

const fn export(
    name: &'static str,
    data_type: &'static str,
    replication_key: ReplicationKey,
    key_properties: &'static [&'static str],
    parse_transactional: bool,
) -> StreamDef {
    StreamDef {
        name,
        replication_method: ReplicationMethod::Incremental,
        replication_key: Some(replication_key),
        key_properties,
        fetcher: Fetcher::Export {
            data_type,
            parse_transactional,
        },
    }
}

/// All streams, in sync order
pub static STREAMS: &[StreamDef] = &[
    StreamDef {
        name: "lists",
        replication_method: ReplicationMethod::FullTable,
        replication_key: None,
        key_properties: &["id"],
        fetcher: Fetcher::Collection {
            path: "lists",
            field: "lists",
            epoch_fields: &["createdAt"],
        },
    },
    StreamDef {
        name: "list_users",
        replication_method: ReplicationMethod::FullTable,
        replication_key: None,
        key_properties: &["email", "listId"],
        fetcher: Fetcher::ListUsers,
    },
    StreamDef {
        name: "campaigns",
        replication_method: ReplicationMethod::Incremental,
        replication_key: Some(ReplicationKey {
            name: "updatedAt",
            path: "updatedAt",
        }),
        key_properties: &["id"],
        fetcher: Fetcher::Collection {
            path: "campaigns",
            field: "campaigns",
            epoch_fields: &["createdAt", "updatedAt", "startAt", "endedAt"],
        },
    },
    StreamDef {
        name: "channels",
        replication_method: ReplicationMethod::FullTable,
        replication_key: None,
        key_properties: &["id"],
        fetcher: Fetcher::Collection {
            path: "channels",
            field: "channels",
            epoch_fields: &[],
        },
    },
    StreamDef {
        name: "message_types",
        replication_method: ReplicationMethod::FullTable,
        replication_key: None,
        key_properties: &["id"],
        fetcher: Fetcher::Collection {
            path: "messageTypes",
            field: "messageTypes",
            epoch_fields: &[],
        },
    },
    StreamDef {
        name: "templates",
        replication_method: ReplicationMethod::Incremental,
        replication_key: Some(ReplicationKey {
            name: "updatedAt",
            path: "updatedAt",
        }),
        key_properties: &["templateId"],
        fetcher: Fetcher::Templates,
    },
    StreamDef {
        name: "metadata",
        replication_method: ReplicationMethod::FullTable,
        replication_key: None,
        key_properties: &["key"],
        fetcher: Fetcher::Metadata,
    },
    export(
        "email_bounce",
        "emailBounce",
        ReplicationKey {
            name: "createdAt",
            path: "createdAt",
        },
        &["messageId"],
        false,
    ),
    export("email_click", "emailClick", DOCUMENT_UPDATED_AT, &["messageId"], false),
    export("email_complaint", "emailComplaint", DOCUMENT_UPDATED_AT, &["messageId"], false),
    export("email_open", "emailOpen", DOCUMENT_UPDATED_AT, &["messageId"], false),
    export("email_send", "emailSend", DOCUMENT_UPDATED_AT, &["messageId"], true),
    export("email_send_skip", "emailSendSkip", DOCUMENT_UPDATED_AT, &["messageId"], true),
    export("email_subscribe", "emailSubscribe", DOCUMENT_UPDATED_AT, &["messageId"], false),
    export("email_unsubscribe", "emailUnSubscribe", DOCUMENT_UPDATED_AT, &["messageId"], false),
    export("users", "user", DOCUMENT_UPDATED_AT, &["userId"], false),
];

/// Look up a stream by name
pub fn find(name: &str) -> Option<&'static StreamDef> {
    STREAMS.iter().find(|s| s.name == name)
}

/// Look up a stream by name, failing for unknown names
pub fn get(name: &str) -> Result<&'static StreamDef> {
    find(name).ok_or_else(|| IterableError::UnknownStream(name.to_string()))
}

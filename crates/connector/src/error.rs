//! Error types for the Iterable connector

use thiserror::Error;

/// Result type for connector operations
pub type Result<T> = std::result::Result<T, IterableError>;

/// Errors that can occur while talking to Iterable or syncing a stream
///
/// Only [`IterableError::RateLimited`] is retried (by the HTTP client).
/// Everything else aborts the current stream sync and leaves its bookmark
/// untouched, so the stream can be retried from the last committed bookmark.
#[derive(Error, Debug)]
pub enum IterableError {
    /// Failed to initialize the client (e.g., HTTP client creation failed)
    #[error("failed to initialize connector: {0}")]
    Init(String),

    /// API answered 429. Retried with backoff; never escapes the client.
    #[error("rate limited by {url}")]
    RateLimited { url: String },

    /// Non-2xx response, or 429 after the last retry
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// Connection, timeout or body read failure
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Response body or streamed line is not valid JSON
    #[error("JSON decode error ({context}): {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// Response JSON does not have the expected shape
    #[error("unexpected response from {path}: {message}")]
    UnexpectedResponse { path: String, message: String },

    /// Schema file missing or malformed
    #[error("schema error for stream '{stream}': {message}")]
    Schema { stream: String, message: String },

    /// Stream name not in the registry
    #[error("unknown stream: {0}")]
    UnknownStream(String),

    /// Datetime value could not be interpreted
    #[error("invalid datetime '{0}'")]
    InvalidDatetime(String),
}

impl IterableError {
    /// Create a Decode error with context
    pub fn decode(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            context: context.into(),
            source,
        }
    }

    /// Create an UnexpectedResponse error
    pub fn unexpected(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a Schema error
    pub fn schema(stream: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            stream: stream.into(),
            message: message.into(),
        }
    }

    /// Check if this error is retried by the HTTP client
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { .. } => Some(429),
            Self::Http { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

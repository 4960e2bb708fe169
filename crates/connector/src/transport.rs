//! HTTP transport seam
//!
//! The client never talks to reqwest directly; it goes through [`Transport`]
//! so that tests can script responses without a network.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;

use crate::error::{IterableError, Result};
use crate::resilience::ResilienceConfig;

/// Response body as a stream of chunks
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Status plus an unread body
///
/// Dropping the response before the body is drained closes the connection.
pub struct TransportResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Issues GET requests
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a GET for a fully built URL (query string included)
    async fn get(&self, url: &str) -> Result<TransportResponse>;
}

/// Production transport backed by reqwest
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with the configured timeout and user agent
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client creation fails (e.g., TLS misconfiguration)
    pub fn new(resilience: &ResilienceConfig, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(resilience.timeout())
            .build()
            .map_err(|e| IterableError::Init(format!("Iterable HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(IterableError::from))
            .boxed();
        Ok(TransportResponse { status, body })
    }
}

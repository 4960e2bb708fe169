//! Iterable API client
//!
//! Thin wrapper over a [`Transport`] that adds the `api_key` parameter,
//! backs off on rate limits, and decodes responses either buffered (one JSON
//! document) or streamed (one JSON item per line).

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use tap_iterable_config::Config;
use tracing::debug;

use crate::error::{IterableError, Result};
use crate::lines::{LinePolicy, LineStream, decode_lines};
use crate::resilience::{ClientMetrics, ResilienceConfig, execute_with_backoff};
use crate::transport::{ReqwestTransport, Transport, TransportResponse};

/// Query parameters for one request
pub type Params<'a> = &'a [(&'a str, &'a str)];

/// Client for the Iterable REST API
pub struct IterableClient {
    base_url: String,
    api_key: String,
    transport: Arc<dyn Transport>,
    resilience: ResilienceConfig,
    max_stream_bytes: Option<u64>,
    metrics: Arc<ClientMetrics>,
}

impl IterableClient {
    /// Create a client backed by reqwest
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client creation fails
    pub fn new(config: &Config) -> Result<Self> {
        let resilience = ResilienceConfig::from_config(config);
        let transport = ReqwestTransport::new(&resilience, &config.user_agent)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a client over an arbitrary transport
    pub fn with_transport(config: &Config, transport: Arc<dyn Transport>) -> Self {
        let mut base_url = config.base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            base_url,
            api_key: config.api_key.clone(),
            transport,
            resilience: ResilienceConfig::from_config(config),
            max_stream_bytes: config.max_stream_bytes,
            metrics: Arc::new(ClientMetrics::new()),
        }
    }

    /// Request counters
    pub fn metrics(&self) -> &ClientMetrics {
        &self.metrics
    }

    fn query_string(&self, params: Params<'_>, api_key: &str) -> String {
        std::iter::once(("api_key", api_key))
            .chain(params.iter().copied())
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Full request URL
    fn url(&self, path: &str, params: Params<'_>) -> String {
        format!(
            "{}{}?{}",
            self.base_url,
            path,
            self.query_string(params, &self.api_key)
        )
    }

    /// Same URL with the key masked, for logs and errors
    fn redacted_url(&self, path: &str, params: Params<'_>) -> String {
        format!(
            "{}{}?{}",
            self.base_url,
            path,
            self.query_string(params, "REDACTED")
        )
    }

    /// Send a GET and check the status, retrying on 429
    async fn send(&self, path: &str, params: Params<'_>) -> Result<TransportResponse> {
        let url = self.url(path, params);
        let redacted = self.redacted_url(path, params);
        debug!(url = %redacted, "GET request");

        let (url, redacted) = (&url, &redacted);
        execute_with_backoff(&self.resilience, &self.metrics, path, move || async move {
            let response = self.transport.get(url).await?;
            if response.is_success() {
                return Ok(response);
            }
            match response.status {
                429 => Err(IterableError::RateLimited {
                    url: redacted.clone(),
                }),
                status => Err(IterableError::Http {
                    status,
                    url: redacted.clone(),
                }),
            }
        })
        .await
    }

    /// GET and decode the whole body as one JSON document
    pub async fn get_json(&self, path: &str, params: Params<'_>) -> Result<Value> {
        let response = self.send(path, params).await?;
        let mut body = response.body;
        let mut buf = Vec::new();
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        serde_json::from_slice(&buf).map_err(|e| IterableError::decode(path, e))
    }

    /// GET and decode the body lazily, one JSON item per line
    pub async fn get_lines(
        &self,
        path: &str,
        params: Params<'_>,
        policy: LinePolicy,
    ) -> Result<LineStream> {
        let response = self.send(path, params).await?;
        Ok(decode_lines(response.body, policy, path, self.max_stream_bytes))
    }

    /// Custom user fields (`users/getFields`), name to Iterable type
    pub async fn user_fields(&self) -> Result<BTreeMap<String, String>> {
        let body = self.get_json("users/getFields", &[]).await?;
        let fields = body
            .get("fields")
            .and_then(Value::as_object)
            .ok_or_else(|| IterableError::unexpected("users/getFields", "missing 'fields' object"))?;

        Ok(fields
            .iter()
            .map(|(name, kind)| {
                let kind = kind.as_str().unwrap_or("string").to_string();
                (name.clone(), kind)
            })
            .collect())
    }
}

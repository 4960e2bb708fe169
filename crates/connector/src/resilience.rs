//! Rate-limit backoff for Iterable requests
//!
//! Iterable signals throttling with HTTP 429. Those responses are retried
//! with exponential backoff (base delay, doubling each attempt) up to a fixed
//! number of attempts. Any other failure is returned immediately.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tap_iterable_config::Config;
use tracing::{info, warn};

use crate::error::{IterableError, Result};

/// Default request timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = tap_iterable_config::DEFAULT_TIMEOUT_SECS;

/// Default attempt cap (initial request included)
pub const DEFAULT_MAX_ATTEMPTS: u32 = tap_iterable_config::DEFAULT_MAX_RETRIES;

/// Backoff stops growing after this many doublings
const MAX_BACKOFF_SHIFT: u32 = 16;

/// Resilience configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum attempts for a rate-limited request
    pub max_attempts: u32,
    /// Base delay for exponential backoff (doubles each retry)
    pub retry_base_delay_ms: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay_ms: tap_iterable_config::DEFAULT_RETRY_BASE_DELAY_MS,
        }
    }
}

impl ResilienceConfig {
    /// Build from the tap configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout_secs: config.timeout_secs,
            max_attempts: config.max_retries.max(1),
            retry_base_delay_ms: config.retry_base_delay_ms,
        }
    }

    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Delay before retry number `retry` (0-based): base, 2x base, 4x base, ...
    pub fn retry_delay(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.min(MAX_BACKOFF_SHIFT);
        Duration::from_millis(self.retry_base_delay_ms.saturating_mul(factor))
    }
}

/// Request counters for one client
#[derive(Debug, Default)]
pub struct ClientMetrics {
    /// Requests sent, retries included
    pub requests: AtomicU64,
    /// Backoff sleeps taken after a 429
    pub retries: AtomicU64,
    /// Requests that ended in an error
    pub failures: AtomicU64,
}

impl ClientMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Execute a request, backing off on rate limits
///
/// `operation` is called at most `config.max_attempts` times. Only
/// [`IterableError::RateLimited`] triggers another attempt; once attempts are
/// exhausted it is converted into a fatal [`IterableError::Http`] with status 429.
pub async fn execute_with_backoff<F, Fut, T>(
    config: &ResilienceConfig,
    metrics: &ClientMetrics,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        metrics.record_request();

        match operation().await {
            Ok(value) => return Ok(value),
            Err(IterableError::RateLimited { .. }) if attempt < max_attempts => {
                let delay = config.retry_delay(attempt - 1);
                info!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "received 429, backing off"
                );
                metrics.record_retry();
                tokio::time::sleep(delay).await;
            }
            Err(IterableError::RateLimited { url }) => {
                warn!(
                    operation = operation_name,
                    attempts = attempt,
                    "still rate limited after final attempt"
                );
                metrics.record_failure();
                return Err(IterableError::Http { status: 429, url });
            }
            Err(e) => {
                metrics.record_failure();
                return Err(e);
            }
        }
    }
}

//! HTTP client with connect/read timeouts and retry/backoff.
//!
//! Every remote call (index pages, preview pages, archive downloads) goes
//! through [`HttpClient`] so a single unresponsive endpoint cannot stall a run.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};

use crate::config::HttpConfig;
use crate::error::{MirrorError, Result};

/// User-Agent string for all requests.
const USER_AGENT: &str = concat!("MeetingMirror/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// Upper bound honoured for a server-provided `Retry-After`.
const MAX_RETRY_AFTER_SECS: u64 = 30;

/// How often and how patiently a request is retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// Exponential delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
        let ms = self
            .initial_backoff_ms
            .saturating_mul(exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS)))
}

/// Shared HTTP client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    policy: RetryPolicy,
}

impl HttpClient {
    /// Build a client from the `[http]` config section.
    ///
    /// `timeout_secs` bounds connecting and each read, not the whole
    /// transfer, so a large archive that keeps arriving is never cut off.
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .connect_timeout(config.timeout())
            .read_timeout(config.timeout())
            .build()
            .map_err(|e| MirrorError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            policy: config.retry_policy(),
        })
    }

    /// GET a URL and read its body with `read`, retrying transient
    /// failures of either the request or the body transfer.
    async fn get_with<T, F, Fut>(&self, url: &str, read: F) -> Result<T>
    where
        F: Fn(Response) -> Fut,
        Fut: Future<Output = reqwest::Result<T>>,
    {
        let attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=attempts {
            let last = attempt == attempts;
            let response = match self.client.get(url).send().await {
                Ok(response) => response,
                Err(e) => {
                    let transient = e.is_timeout() || e.is_connect() || e.is_request();
                    if transient && !last {
                        let delay = self.policy.delay(attempt);
                        warn!(%url, error = %e, attempt, attempts, ?delay, "retrying request");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(MirrorError::Network(format!("{url}: {e}")));
                }
            };

            let status = response.status();
            if !status.is_success() {
                if is_retryable_status(status) && !last {
                    let delay = retry_after(&response).unwrap_or_else(|| self.policy.delay(attempt));
                    warn!(%url, %status, attempt, attempts, ?delay, "retrying request");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(MirrorError::Network(format!("{url}: HTTP {status}")));
            }

            match read(response).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    let transient = e.is_timeout() || e.is_body() || e.is_decode();
                    if transient && !last {
                        let delay = self.policy.delay(attempt);
                        warn!(%url, error = %e, attempt, attempts, ?delay, "body transfer failed, retrying");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(MirrorError::Network(format!("{url}: body read failed: {e}")));
                }
            }
        }

        Err(MirrorError::Network(format!(
            "{url}: gave up after {attempts} attempts"
        )))
    }

    /// GET a page body as text.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        debug!(%url, "fetching page");
        self.get_with(url, Response::text).await
    }

    /// GET a binary body.
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        debug!(%url, "fetching file");
        let body = self.get_with(url, Response::bytes).await?;
        Ok(body.to_vec())
    }
}

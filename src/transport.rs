use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;

use crate::error::FailureReason;

/// Raw HTTP-level result of a delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    /// Receiver-supplied backoff hint, if any.
    pub retry_after: Option<Duration>,
}

impl TransportResponse {
    pub fn new(status: u16) -> Self {
        Self { status, retry_after: None }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outbound delivery seam. Errors are limited to `Timeout` and `Network`;
/// status classification is the dispatcher's job.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(
        &self,
        url: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<TransportResponse, FailureReason>;

    /// Lightweight read-only reachability check.
    async fn probe(&self, url: &str, timeout: Duration) -> bool;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(
        &self,
        url: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<TransportResponse, FailureReason> {
        let response = self
            .client
            .post(url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(classify_error)?;

        let status = response.status();
        let mut retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);

        // Some receivers put the hint in the JSON body instead.
        if status == StatusCode::TOO_MANY_REQUESTS && retry_after.is_none() {
            if let Ok(body) = response.json::<serde_json::Value>().await {
                retry_after = body
                    .get("retry_after")
                    .and_then(|v| v.as_f64())
                    .and_then(seconds_to_duration);
            }
        }

        Ok(TransportResponse {
            status: status.as_u16(),
            retry_after,
        })
    }

    async fn probe(&self, url: &str, timeout: Duration) -> bool {
        match self.client.get(url).timeout(timeout).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

fn classify_error(err: reqwest::Error) -> FailureReason {
    if err.is_timeout() {
        FailureReason::Timeout
    } else {
        FailureReason::Network
    }
}

/// Parse a `Retry-After` value given in (possibly fractional) seconds.
pub fn parse_retry_after(raw: &str) -> Option<Duration> {
    raw.trim().parse::<f64>().ok().and_then(seconds_to_duration)
}

/// Negative, non-finite and out-of-range values yield `None`.
fn seconds_to_duration(seconds: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(seconds).ok()
}

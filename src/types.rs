use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Unique identifier for an endpoint.
///
/// This is a strongly-typed wrapper to avoid accidental mixing
/// of endpoint IDs with other string identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointId(pub String);

impl EndpointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether an endpoint takes part in normal selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointStatus {
    Active,
    Inactive,
}

/// One delivery target in the pool, together with its mutable health state.
///
/// The `url` is treated as a credential: it is never logged and only ever
/// leaves the pool in redacted form (see [`EndpointSnapshot`]).
#[derive(Clone)]
pub struct Endpoint {
    pub id: EndpointId,
    pub url: String,
    pub status: EndpointStatus,

    /// Transport failures since the last success.
    pub failure_count: u32,
    pub last_failure_at: Option<Instant>,

    /// Most recent attempted send, successful or not.
    pub last_used_at: Option<Instant>,

    /// Sends recorded in the current flood-detection window.
    pub message_count: u32,
    pub window_start_at: Option<Instant>,

    /// Set by the flood detector; excludes the endpoint regardless of `status`.
    pub flood_flag: bool,
}

impl Endpoint {
    /// Create a fresh, active endpoint with no history.
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: EndpointId(id.into()),
            url: url.into(),
            status: EndpointStatus::Active,
            failure_count: 0,
            last_failure_at: None,
            last_used_at: None,
            message_count: 0,
            window_start_at: None,
            flood_flag: false,
        }
    }

    /// Eligible for normal selection under the given failure ceiling.
    pub fn is_eligible(&self, max_failures: u32) -> bool {
        self.status == EndpointStatus::Active
            && self.failure_count < max_failures
            && !self.flood_flag
    }

    pub fn snapshot(&self, now: Instant) -> EndpointSnapshot {
        let ago = |at: Option<Instant>| at.map(|t| now.saturating_duration_since(t).as_millis() as u64);
        EndpointSnapshot {
            id: self.id.clone(),
            url: redact_url(&self.url),
            status: self.status,
            failure_count: self.failure_count,
            last_failure_ms_ago: ago(self.last_failure_at),
            last_used_ms_ago: ago(self.last_used_at),
            message_count: self.message_count,
            flood_flag: self.flood_flag,
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("url", &redact_url(&self.url))
            .field("status", &self.status)
            .field("failure_count", &self.failure_count)
            .field("message_count", &self.message_count)
            .field("flood_flag", &self.flood_flag)
            .finish()
    }
}

/// Read-only, serializable view of one endpoint's health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSnapshot {
    pub id: EndpointId,
    pub url: String,
    pub status: EndpointStatus,
    pub failure_count: u32,
    pub last_failure_ms_ago: Option<u64>,
    pub last_used_ms_ago: Option<u64>,
    pub message_count: u32,
    pub flood_flag: bool,
}

/// Aggregate pool health as exposed on the status surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatus {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub flooding: usize,
    pub endpoints: Vec<EndpointSnapshot>,
}

impl PoolStatus {
    pub fn from_snapshots(endpoints: Vec<EndpointSnapshot>) -> Self {
        let active = endpoints
            .iter()
            .filter(|e| e.status == EndpointStatus::Active)
            .count();
        let flooding = endpoints.iter().filter(|e| e.flood_flag).count();
        Self {
            total: endpoints.len(),
            active,
            inactive: endpoints.len() - active,
            flooding,
            endpoints,
        }
    }
}

/// Outcome of a successful `send`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub endpoint_id: EndpointId,
    pub delivered: bool,
}

/// Keep scheme and host, drop path and query (where webhook tokens live).
pub fn redact_url(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => format!("{}://{}/***", parsed.scheme(), host),
            None => "***".to_string(),
        },
        Err(_) => "***".to_string(),
    }
}

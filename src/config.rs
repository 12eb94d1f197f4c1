use std::time::Duration;

use tracing::warn;

/// Upper bound on `WEBHOOK_COUNT`.
pub const MAX_CONFIGURED_ENDPOINTS: usize = 64;

/// Used when configuration yields no endpoints, so the pool is never empty.
pub const BUILTIN_FALLBACK_URLS: &[&str] = &["http://127.0.0.1:8081/webhook"];

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Endpoint URLs in registration order.
    pub urls: Vec<String>,
    /// Used instead of [`BUILTIN_FALLBACK_URLS`] when `urls` is empty.
    pub fallback_urls: Vec<String>,

    /// Global minimum spacing between dispatch attempts.
    pub rate_limit_interval: Duration,

    pub flood_threshold: u32,
    pub flood_window: Duration,
    pub flood_sweep_interval: Duration,

    pub max_failures: u32,
    /// `None` means one attempt per registered endpoint.
    pub max_retries: Option<u32>,
    pub retry_delay: Duration,
    /// Used when a 429 carries no usable hint.
    pub default_retry_after: Duration,
    /// Ceiling on any receiver-supplied 429 hint.
    pub max_retry_after: Duration,

    pub request_timeout: Duration,
    pub probe_timeout: Duration,
    /// Endpoints unused for this long are probed before selection.
    pub probe_staleness: Duration,

    pub reactivation_delay: Duration,
    pub recovery_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            fallback_urls: Vec::new(),
            rate_limit_interval: Duration::from_millis(1_000),
            flood_threshold: 10,
            flood_window: Duration::from_millis(1_000),
            flood_sweep_interval: Duration::from_millis(5_000),
            max_failures: 3,
            max_retries: None,
            retry_delay: Duration::from_millis(5_000),
            default_retry_after: Duration::from_millis(1_000),
            max_retry_after: Duration::from_secs(60),
            request_timeout: Duration::from_millis(10_000),
            probe_timeout: Duration::from_millis(5_000),
            probe_staleness: Duration::from_secs(300),
            reactivation_delay: Duration::from_secs(300),
            recovery_interval: Duration::from_secs(300),
        }
    }
}

impl PoolConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    ///
    /// Malformed values are skipped with a warning and the default is kept.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        let count = parse_number::<usize>(&lookup, "WEBHOOK_COUNT").unwrap_or(0);
        if count > MAX_CONFIGURED_ENDPOINTS {
            warn!(count, max = MAX_CONFIGURED_ENDPOINTS, "WEBHOOK_COUNT exceeds limit, truncating");
        }

        for index in 1..=count.min(MAX_CONFIGURED_ENDPOINTS) {
            let key = format!("WEBHOOK_URL_{}", index);
            let Some(raw) = lookup(&key) else {
                warn!(key = %key, "endpoint variable missing, skipping");
                continue;
            };
            let raw = raw.trim();
            if is_valid_url(raw) {
                config.urls.push(raw.to_string());
            } else {
                warn!(key = %key, "endpoint variable is not an http(s) URL, skipping");
            }
        }

        let ms = |key: &str, current: Duration| {
            parse_number::<u64>(&lookup, key)
                .map(Duration::from_millis)
                .unwrap_or(current)
        };

        config.rate_limit_interval = ms("POOL_RATE_LIMIT_MS", config.rate_limit_interval);
        config.flood_window = ms("POOL_FLOOD_WINDOW_MS", config.flood_window);
        config.flood_sweep_interval = ms("POOL_FLOOD_SWEEP_MS", config.flood_sweep_interval);
        config.retry_delay = ms("POOL_RETRY_DELAY_MS", config.retry_delay);
        config.default_retry_after = ms("POOL_DEFAULT_RETRY_AFTER_MS", config.default_retry_after);
        config.max_retry_after = ms("POOL_MAX_RETRY_AFTER_MS", config.max_retry_after);
        config.request_timeout = ms("POOL_REQUEST_TIMEOUT_MS", config.request_timeout);
        config.probe_timeout = ms("POOL_PROBE_TIMEOUT_MS", config.probe_timeout);
        config.probe_staleness = ms("POOL_PROBE_STALENESS_MS", config.probe_staleness);
        config.reactivation_delay = ms("POOL_REACTIVATION_DELAY_MS", config.reactivation_delay);
        config.recovery_interval = ms("POOL_RECOVERY_INTERVAL_MS", config.recovery_interval);

        if let Some(threshold) = parse_number::<u32>(&lookup, "POOL_FLOOD_THRESHOLD") {
            config.flood_threshold = threshold.max(1);
        }
        if let Some(max_failures) = parse_number::<u32>(&lookup, "POOL_MAX_FAILURES") {
            config.max_failures = max_failures.max(1);
        }
        if let Some(max_retries) = parse_number::<u32>(&lookup, "POOL_MAX_RETRIES") {
            config.max_retries = Some(max_retries.max(1));
        }

        config
    }

    /// Endpoint URLs to register: configured, else fallback, else built-in.
    pub fn effective_urls(&self) -> Vec<String> {
        if !self.urls.is_empty() {
            return self.urls.clone();
        }
        if !self.fallback_urls.is_empty() {
            return self.fallback_urls.clone();
        }
        BUILTIN_FALLBACK_URLS.iter().map(|url| url.to_string()).collect()
    }
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring malformed numeric setting");
            None
        }
    }
}

pub(crate) fn is_valid_url(raw: &str) -> bool {
    matches!(
        reqwest::Url::parse(raw),
        Ok(url) if (url.scheme() == "http" || url.scheme() == "https") && url.host_str().is_some()
    )
}

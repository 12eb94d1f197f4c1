use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::registry::Registry;
use crate::telemetry::metric_inc;
use crate::transport::Transport;
use crate::types::{EndpointId, EndpointStatus};

/// Re-probes deactivated endpoints and returns the healthy ones to service.
pub struct RecoverySweeper {
    registry: Arc<Registry>,
    transport: Arc<dyn Transport>,
    probe_timeout: Duration,
    reactivation_delay: Duration,
}

impl RecoverySweeper {
    pub fn new(
        registry: Arc<Registry>,
        transport: Arc<dyn Transport>,
        probe_timeout: Duration,
        reactivation_delay: Duration,
    ) -> Self {
        Self {
            registry,
            transport,
            probe_timeout,
            reactivation_delay,
        }
    }

    /// One sweep over the registry. Returns the number of endpoints reactivated.
    pub async fn run_once(&self) -> usize {
        let now = Instant::now();
        let candidates: Vec<(EndpointId, String)> = {
            let state = self.registry.lock().await;
            state
                .endpoints
                .iter()
                .filter(|e| e.status == EndpointStatus::Inactive && !e.flood_flag)
                .filter(|e| match e.last_failure_at {
                    Some(at) => now.saturating_duration_since(at) > self.reactivation_delay,
                    None => false,
                })
                .map(|e| (e.id.clone(), e.url.clone()))
                .collect()
        };

        if candidates.is_empty() {
            return 0;
        }
        debug!(candidates = candidates.len(), "recovery sweep probing");

        let mut recovered = 0usize;
        for (id, url) in candidates {
            if !self.transport.probe(&url, self.probe_timeout).await {
                continue;
            }
            // The slot may have been replaced or flagged while probing.
            let reactivated = self
                .registry
                .update(&id, |e| {
                    if e.status != EndpointStatus::Inactive || e.flood_flag {
                        return false;
                    }
                    e.status = EndpointStatus::Active;
                    e.failure_count = 0;
                    e.last_failure_at = None;
                    true
                })
                .await
                .unwrap_or(false);

            if reactivated {
                recovered += 1;
                info!(endpoint = %id, "endpoint reactivated");
                metric_inc("webhook_pool.endpoint.reactivated");
            }
        }

        recovered
    }

    /// Explicitly reactivate one endpoint, ignoring the cool-down but still
    /// requiring a passing probe.
    pub async fn reactivate(&self, id: &EndpointId) -> bool {
        let Some(endpoint) = self.registry.get(id).await else {
            return false;
        };
        if !self.transport.probe(&endpoint.url, self.probe_timeout).await {
            debug!(endpoint = %id, "reactivation probe failed");
            return false;
        }
        let done = self.registry.reactivate(id).await;
        if done {
            info!(endpoint = %id, "endpoint reactivated on request");
        }
        done
    }
}

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::registry::Registry;
use crate::telemetry::metric_inc_endpoint;
use crate::types::EndpointId;

/// Per-endpoint fixed-window send counter.
///
/// Counts live on the registry's endpoint records; the detector only owns
/// the thresholds.
pub struct FloodDetector {
    registry: Arc<Registry>,
    threshold: u32,
    window: Duration,
}

impl FloodDetector {
    pub fn new(registry: Arc<Registry>, threshold: u32, window: Duration) -> Self {
        Self {
            registry,
            threshold: threshold.max(1),
            window,
        }
    }

    /// Record one attempted send on `id`. Returns `true` once the endpoint
    /// is flooding.
    pub async fn record(&self, id: &EndpointId) -> bool {
        let now = Instant::now();
        let threshold = self.threshold;
        let window = self.window;

        let flooding = self
            .registry
            .update(id, |endpoint| {
                let expired = match endpoint.window_start_at {
                    Some(start) => now.saturating_duration_since(start) > window,
                    None => true,
                };
                if expired {
                    endpoint.message_count = 0;
                    endpoint.window_start_at = Some(now);
                }

                endpoint.message_count = endpoint.message_count.saturating_add(1);
                if endpoint.message_count >= threshold {
                    endpoint.flood_flag = true;
                }
                endpoint.flood_flag
            })
            .await
            .unwrap_or(false);

        if flooding {
            warn!(endpoint = %id, threshold, window_ms = window.as_millis() as u64, "flood detected");
            metric_inc_endpoint("webhook_pool.flood.detected", id);
        }
        flooding
    }

    /// Clear flags and counts on endpoints whose window has been idle for
    /// more than twice the window size. Returns how many flags were cleared.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let stale_after = self.window * 2;
        let mut cleared = 0usize;

        let mut state = self.registry.lock().await;
        for endpoint in state.endpoints.iter_mut() {
            let Some(start) = endpoint.window_start_at else { continue };
            if now.saturating_duration_since(start) <= stale_after {
                continue;
            }
            if endpoint.flood_flag {
                cleared += 1;
                info!(endpoint = %endpoint.id, "flood flag cleared");
            }
            endpoint.flood_flag = false;
            endpoint.message_count = 0;
            endpoint.window_start_at = None;
        }

        cleared
    }
}

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::DispatchError;
use crate::recovery::RecoverySweeper;
use crate::registry::Registry;
use crate::transport::Transport;
use crate::types::Endpoint;

/// Round-robin selection with skip-on-unhealthy and lazy liveness probes.
pub struct Selector {
    registry: Arc<Registry>,
    transport: Arc<dyn Transport>,
    recovery: Arc<RecoverySweeper>,
    probe_timeout: Duration,
    probe_staleness: Duration,
}

impl Selector {
    pub fn new(
        registry: Arc<Registry>,
        transport: Arc<dyn Transport>,
        recovery: Arc<RecoverySweeper>,
        probe_timeout: Duration,
        probe_staleness: Duration,
    ) -> Self {
        Self {
            registry,
            transport,
            recovery,
            probe_timeout,
            probe_staleness,
        }
    }

    /// Pick the next usable endpoint.
    ///
    /// Scans at most one full lap from the cursor. If nothing qualifies, runs
    /// a recovery sweep and makes one linear pass before giving up.
    pub async fn next(&self) -> Result<Endpoint, DispatchError> {
        let size = self.registry.len();
        if size == 0 {
            return Err(DispatchError::NoAvailableEndpoint);
        }
        let max_failures = self.registry.max_failures();

        let mut steps = 0;
        while steps < size {
            let (index, candidate) = {
                let mut state = self.registry.lock().await;
                let index = state.cursor % size;
                let endpoint = &state.endpoints[index];
                if !endpoint.is_eligible(max_failures) {
                    state.cursor = (index + 1) % size;
                    steps += 1;
                    continue;
                }
                (index, endpoint.clone())
            };

            if self.is_stale(&candidate) && !self.transport.probe(&candidate.url, self.probe_timeout).await {
                self.registry.record_probe_failure(&candidate.id).await;
                self.registry.lock().await.cursor = (index + 1) % size;
                steps += 1;
                continue;
            }

            self.registry.lock().await.cursor = (index + 1) % size;
            debug!(endpoint = %candidate.id, "endpoint selected");
            return Ok(candidate);
        }

        warn!("no eligible endpoint, running recovery sweep");
        self.recovery.run_once().await;

        let mut state = self.registry.lock().await;
        let found = state
            .endpoints
            .iter()
            .position(|e| e.is_eligible(max_failures));
        match found {
            Some(index) => {
                state.cursor = (index + 1) % size;
                Ok(state.endpoints[index].clone())
            }
            None => Err(DispatchError::NoAvailableEndpoint),
        }
    }

    fn is_stale(&self, endpoint: &Endpoint) -> bool {
        match endpoint.last_used_at {
            Some(at) => Instant::now().saturating_duration_since(at) > self.probe_staleness,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use crate::types::{EndpointId, EndpointStatus};

    const STALENESS: Duration = Duration::from_secs(300);
    const REACTIVATION: Duration = Duration::from_secs(300);

    fn setup(n: usize) -> (Arc<Registry>, Arc<ScriptedTransport>, Selector) {
        let endpoints = (0..n)
            .map(|i| Endpoint::new(format!("e{}", i), format!("http://localhost/{}", i)))
            .collect();
        let registry = Arc::new(Registry::from_endpoints(endpoints, 3));
        let transport = Arc::new(ScriptedTransport::new());
        let recovery = Arc::new(RecoverySweeper::new(
            registry.clone(),
            transport.clone(),
            Duration::from_secs(5),
            REACTIVATION,
        ));
        let selector = Selector::new(
            registry.clone(),
            transport.clone(),
            recovery,
            Duration::from_secs(5),
            STALENESS,
        );
        (registry, transport, selector)
    }

    #[tokio::test(start_paused = true)]
    async fn round_robin_visits_each_once_in_order() {
        let (registry, _transport, selector) = setup(3);

        let mut order = Vec::new();
        for _ in 0..3 {
            order.push(selector.next().await.unwrap().id);
        }
        assert_eq!(
            order,
            vec![EndpointId::new("e0"), EndpointId::new("e1"), EndpointId::new("e2")]
        );
        assert_eq!(registry.cursor().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_endpoints_are_skipped() {
        let (registry, _transport, selector) = setup(3);
        let e1 = EndpointId::new("e1");
        registry.update(&e1, |e| e.failure_count = 3).await;

        for _ in 0..4 {
            assert_ne!(selector.next().await.unwrap().id, e1);
        }

        registry.record_success(&e1).await;
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(selector.next().await.unwrap().id);
        }
        assert!(seen.contains(&e1));
    }

    #[tokio::test(start_paused = true)]
    async fn flooded_and_inactive_are_skipped() {
        let (registry, _transport, selector) = setup(3);
        registry.update(&EndpointId::new("e0"), |e| e.flood_flag = true).await;
        registry.mark_inactive(&EndpointId::new("e1")).await;

        for _ in 0..3 {
            assert_eq!(selector.next().await.unwrap().id, EndpointId::new("e2"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stale_endpoint_failing_probe_is_deactivated() {
        let (registry, transport, selector) = setup(2);
        transport.probe_result("http://localhost/0", false);

        assert_eq!(selector.next().await.unwrap().id, EndpointId::new("e1"));

        let e0 = registry.get(&EndpointId::new("e0")).await.unwrap();
        assert_eq!(e0.status, EndpointStatus::Inactive);
        assert_eq!(e0.failure_count, 1);
        assert!(e0.last_failure_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn recently_used_endpoint_is_not_probed() {
        let (registry, transport, selector) = setup(1);
        registry.mark_used(&EndpointId::new("e0")).await;

        selector.next().await.unwrap();
        assert!(transport.probes().is_empty());

        tokio::time::advance(STALENESS + Duration::from_secs(1)).await;
        selector.next().await.unwrap();
        assert_eq!(transport.probes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_pool_recovers_through_sweep() {
        let (registry, transport, selector) = setup(3);
        for i in 0..3 {
            registry.mark_gone(&EndpointId::new(format!("e{}", i))).await;
        }
        transport.probe_result("http://localhost/0", false);
        transport.probe_result("http://localhost/1", true);
        transport.probe_result("http://localhost/2", false);
        tokio::time::advance(REACTIVATION + Duration::from_secs(1)).await;

        let endpoint = selector.next().await.unwrap();
        assert_eq!(endpoint.id, EndpointId::new("e1"));
        assert_eq!(endpoint.status, EndpointStatus::Active);
        assert_eq!(registry.cursor().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_pool_without_recovery_fails() {
        let (registry, _transport, selector) = setup(2);
        registry.mark_gone(&EndpointId::new("e0")).await;
        registry.mark_gone(&EndpointId::new("e1")).await;

        assert_eq!(selector.next().await.unwrap_err(), DispatchError::NoAvailableEndpoint);
    }
}

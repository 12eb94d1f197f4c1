use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::error::{DispatchError, FailureReason};
use crate::flood::FloodDetector;
use crate::provisioner::{regenerate, EndpointProvisioner, NoopProvisioner};
use crate::rate_limiter::RateLimiter;
use crate::recovery::RecoverySweeper;
use crate::registry::Registry;
use crate::selector::Selector;
use crate::telemetry::{metric_inc, metric_inc_endpoint};
use crate::transport::Transport;
use crate::types::{DeliveryResult, Endpoint, EndpointId, PoolStatus};

/// Orchestrates one logical send across the pool.
///
/// Holds no per-send state besides the retry loop; everything else lives in
/// the shared registry.
pub struct Dispatcher {
    registry: Arc<Registry>,
    rate_limiter: RateLimiter,
    flood: Arc<FloodDetector>,
    selector: Selector,
    recovery: Arc<RecoverySweeper>,
    transport: Arc<dyn Transport>,
    provisioner: Arc<dyn EndpointProvisioner>,
    config: PoolConfig,
}

impl Dispatcher {
    pub fn new(config: PoolConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_provisioner(config, transport, Arc::new(NoopProvisioner))
    }

    pub fn with_provisioner(
        config: PoolConfig,
        transport: Arc<dyn Transport>,
        provisioner: Arc<dyn EndpointProvisioner>,
    ) -> Self {
        let registry = Arc::new(Registry::load(&config));
        Self::with_registry(config, registry, transport, provisioner)
    }

    pub fn with_registry(
        config: PoolConfig,
        registry: Arc<Registry>,
        transport: Arc<dyn Transport>,
        provisioner: Arc<dyn EndpointProvisioner>,
    ) -> Self {
        let flood = Arc::new(FloodDetector::new(
            registry.clone(),
            config.flood_threshold,
            config.flood_window,
        ));
        let recovery = Arc::new(RecoverySweeper::new(
            registry.clone(),
            transport.clone(),
            config.probe_timeout,
            config.reactivation_delay,
        ));
        let selector = Selector::new(
            registry.clone(),
            transport.clone(),
            recovery.clone(),
            config.probe_timeout,
            config.probe_staleness,
        );

        Self {
            rate_limiter: RateLimiter::new(config.rate_limit_interval),
            registry,
            flood,
            selector,
            recovery,
            transport,
            provisioner,
            config,
        }
    }

    /// Upper bound on delivery attempts per `send`.
    pub fn max_attempts(&self) -> u32 {
        self.config
            .max_retries
            .unwrap_or(self.registry.len() as u32)
            .max(1)
    }

    /// Deliver `payload` to one endpoint of the pool.
    ///
    /// Returns after the first 2xx. Fails with `NoAvailableEndpoint` when
    /// selection is exhausted, or `DeliveryExhausted` once every attempt has
    /// been used.
    pub async fn send(&self, payload: &serde_json::Value) -> Result<DeliveryResult, DispatchError> {
        let attempts = self.max_attempts();
        let mut last_error: Option<FailureReason> = None;

        for attempt in 1..=attempts {
            self.rate_limiter.await_turn().await;

            let endpoint = match self.selector.next().await {
                Ok(endpoint) => endpoint,
                Err(err) => {
                    warn!(attempt, "no endpoint available");
                    metric_inc("webhook_pool.send.no_endpoint");
                    return Err(err);
                }
            };

            if self.flood.record(&endpoint.id).await {
                last_error = Some(FailureReason::FloodSuppressed);
                self.try_regenerate(&endpoint.id).await;
                continue;
            }

            self.registry.mark_used(&endpoint.id).await;
            debug!(endpoint = %endpoint.id, attempt, "delivery attempt");

            let reason = match self.attempt(&endpoint, payload).await {
                Ok(()) => {
                    self.registry.record_success(&endpoint.id).await;
                    metric_inc_endpoint("webhook_pool.delivery.success", &endpoint.id);
                    return Ok(DeliveryResult {
                        endpoint_id: endpoint.id,
                        delivered: true,
                    });
                }
                Err(reason) => reason,
            };

            metric_inc_endpoint("webhook_pool.delivery.failure", &endpoint.id);
            let more = attempt < attempts;

            match &reason {
                FailureReason::EndpointGone => {
                    self.registry.mark_gone(&endpoint.id).await;
                    self.try_regenerate(&endpoint.id).await;
                }
                FailureReason::RateLimited { retry_after } => {
                    info!(endpoint = %endpoint.id, retry_after_ms = retry_after.as_millis() as u64, "rate limited by receiver");
                    if more {
                        sleep(*retry_after).await;
                    }
                }
                failure if failure.is_transport_failure() => {
                    warn!(endpoint = %endpoint.id, attempt, error = %reason, "delivery attempt failed");
                    self.registry.record_failure(&endpoint.id).await;
                    if more {
                        sleep(self.config.retry_delay).await;
                    }
                }
                _ => {}
            }

            last_error = Some(reason);
        }

        warn!(attempts, error = ?last_error, "delivery exhausted");
        metric_inc("webhook_pool.send.exhausted");
        Err(DispatchError::DeliveryExhausted { attempts, last_error })
    }

    /// One transport call, classified.
    async fn attempt(&self, endpoint: &Endpoint, payload: &serde_json::Value) -> Result<(), FailureReason> {
        let response = self
            .transport
            .post(&endpoint.url, payload, self.config.request_timeout)
            .await?;

        match response.status {
            200..=299 => Ok(()),
            404 => Err(FailureReason::EndpointGone),
            429 => Err(FailureReason::RateLimited {
                retry_after: response
                    .retry_after
                    .unwrap_or(self.config.default_retry_after)
                    .min(self.config.max_retry_after),
            }),
            status => Err(FailureReason::RemoteError { status }),
        }
    }

    async fn try_regenerate(&self, id: &EndpointId) {
        if !self.provisioner.is_enabled() {
            return;
        }
        // Failures are logged inside and leave the endpoint inactive.
        let _ = regenerate(&self.registry, self.provisioner.as_ref(), id).await;
    }

    pub async fn status(&self) -> PoolStatus {
        self.registry.status().await
    }

    /// Explicitly return an endpoint to service after a passing probe.
    pub async fn reactivate(&self, id: &EndpointId) -> bool {
        self.recovery.reactivate(id).await
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn flood_detector(&self) -> &Arc<FloodDetector> {
        &self.flood
    }

    pub fn recovery(&self) -> &Arc<RecoverySweeper> {
        &self.recovery
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

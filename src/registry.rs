use std::collections::HashSet;

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::PoolConfig;
use crate::error::RegistryError;
use crate::types::{Endpoint, EndpointId, EndpointSnapshot, EndpointStatus, PoolStatus};

/// Endpoint table plus the round-robin cursor, guarded together so that
/// selection never races a mutation of the slot it is looking at.
pub(crate) struct RegistryState {
    pub(crate) endpoints: Vec<Endpoint>,
    pub(crate) cursor: usize,
}

/// Fixed-size table of delivery endpoints and their health.
///
/// Slots are created once at startup and only ever replaced in place.
pub struct Registry {
    state: Mutex<RegistryState>,
    len: usize,
    max_failures: u32,
}

impl Registry {
    /// Build the registry from configuration. Never returns an empty pool.
    pub fn load(config: &PoolConfig) -> Self {
        let endpoints = config
            .effective_urls()
            .into_iter()
            .enumerate()
            .map(|(index, url)| Endpoint::new(format!("webhook_{}", index + 1), url))
            .collect();
        Self::from_endpoints(endpoints, config.max_failures)
    }

    /// Build from pre-made endpoints. Later entries reusing an id are dropped.
    pub fn from_endpoints(endpoints: Vec<Endpoint>, max_failures: u32) -> Self {
        let mut seen = HashSet::new();
        let endpoints: Vec<Endpoint> = endpoints
            .into_iter()
            .filter(|endpoint| {
                let fresh = seen.insert(endpoint.id.clone());
                if !fresh {
                    warn!(endpoint = %endpoint.id, "duplicate endpoint id, skipping");
                }
                fresh
            })
            .collect();

        info!(count = endpoints.len(), "endpoint registry loaded");

        Self {
            len: endpoints.len(),
            state: Mutex::new(RegistryState { endpoints, cursor: 0 }),
            max_failures,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    pub async fn get(&self, id: &EndpointId) -> Option<Endpoint> {
        let state = self.state.lock().await;
        state.endpoints.iter().find(|e| &e.id == id).cloned()
    }

    /// Swap the endpoint in the slot holding `id` for `replacement`.
    pub async fn replace(&self, id: &EndpointId, replacement: Endpoint) -> Result<(), RegistryError> {
        let mut state = self.state.lock().await;

        let Some(slot) = state.endpoints.iter().position(|e| &e.id == id) else {
            return Err(RegistryError::UnknownEndpoint { endpoint_id: id.clone() });
        };

        let clashes = state
            .endpoints
            .iter()
            .enumerate()
            .any(|(index, e)| index != slot && e.id == replacement.id);
        if clashes {
            return Err(RegistryError::DuplicateId { endpoint_id: replacement.id });
        }

        info!(old = %id, new = %replacement.id, "endpoint replaced");
        state.endpoints[slot] = replacement;
        Ok(())
    }

    /// Current round-robin position.
    pub async fn cursor(&self) -> usize {
        self.state.lock().await.cursor
    }

    pub async fn snapshot(&self) -> Vec<EndpointSnapshot> {
        let now = Instant::now();
        let state = self.state.lock().await;
        state.endpoints.iter().map(|e| e.snapshot(now)).collect()
    }

    pub async fn status(&self) -> PoolStatus {
        PoolStatus::from_snapshots(self.snapshot().await)
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().await
    }

    /// Apply `f` to the endpoint with `id`, if it is still present.
    pub(crate) async fn update<R>(&self, id: &EndpointId, f: impl FnOnce(&mut Endpoint) -> R) -> Option<R> {
        let mut state = self.state.lock().await;
        state.endpoints.iter_mut().find(|e| &e.id == id).map(f)
    }

    pub(crate) async fn mark_used(&self, id: &EndpointId) {
        self.update(id, |e| e.last_used_at = Some(Instant::now())).await;
    }

    pub(crate) async fn record_success(&self, id: &EndpointId) {
        self.update(id, |e| {
            e.failure_count = 0;
            e.last_used_at = Some(Instant::now());
        })
        .await;
    }

    /// Count a transport failure. Reaching the ceiling also deactivates.
    pub(crate) async fn record_failure(&self, id: &EndpointId) {
        let max_failures = self.max_failures;
        let deactivated = self
            .update(id, |e| {
                e.failure_count = e.failure_count.saturating_add(1);
                e.last_failure_at = Some(Instant::now());
                if e.failure_count >= max_failures && e.status == EndpointStatus::Active {
                    e.status = EndpointStatus::Inactive;
                    return true;
                }
                false
            })
            .await
            .unwrap_or(false);

        if deactivated {
            warn!(endpoint = %id, "endpoint reached failure limit, deactivated");
        }
    }

    /// A liveness probe failed: deactivate and count it.
    pub(crate) async fn record_probe_failure(&self, id: &EndpointId) {
        self.update(id, |e| {
            e.status = EndpointStatus::Inactive;
            e.failure_count = e.failure_count.saturating_add(1);
            e.last_failure_at = Some(Instant::now());
        })
        .await;
        warn!(endpoint = %id, "liveness probe failed, endpoint deactivated");
    }

    /// 404: excluded even if later reactivated without a passing probe.
    pub(crate) async fn mark_gone(&self, id: &EndpointId) {
        let ceiling = self.max_failures.saturating_add(1);
        self.update(id, |e| {
            e.status = EndpointStatus::Inactive;
            e.failure_count = ceiling;
            e.last_failure_at = Some(Instant::now());
        })
        .await;
        warn!(endpoint = %id, "endpoint gone, deactivated");
    }

    pub(crate) async fn mark_inactive(&self, id: &EndpointId) {
        self.update(id, |e| e.status = EndpointStatus::Inactive).await;
    }

    /// Taken out of service pending replacement. The failure timestamp lets
    /// the recovery sweep pick it up again if the replacement never lands.
    pub(crate) async fn mark_retiring(&self, id: &EndpointId) {
        self.update(id, |e| {
            e.status = EndpointStatus::Inactive;
            e.last_failure_at = Some(Instant::now());
        })
        .await;
    }

    pub(crate) async fn reactivate(&self, id: &EndpointId) -> bool {
        self.update(id, |e| {
            e.status = EndpointStatus::Active;
            e.failure_count = 0;
            e.last_failure_at = None;
        })
        .await
        .is_some()
    }
}

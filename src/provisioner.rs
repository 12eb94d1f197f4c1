use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::ProvisionError;
use crate::registry::Registry;
use crate::telemetry::metric_inc;
use crate::types::{Endpoint, EndpointId};

/// External collaborator able to retire an endpoint address and mint a
/// replacement. Injected into the dispatcher; the pool never talks to a
/// management API directly.
#[async_trait]
pub trait EndpointProvisioner: Send + Sync {
    /// Whether regeneration should be attempted at all.
    fn is_enabled(&self) -> bool {
        true
    }

    async fn retire(&self, endpoint: &Endpoint) -> Result<(), ProvisionError>;

    async fn create(&self) -> Result<Endpoint, ProvisionError>;
}

/// Default provisioner: regeneration disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProvisioner;

#[async_trait]
impl EndpointProvisioner for NoopProvisioner {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn retire(&self, _endpoint: &Endpoint) -> Result<(), ProvisionError> {
        Err(ProvisionError::Disabled)
    }

    async fn create(&self) -> Result<Endpoint, ProvisionError> {
        Err(ProvisionError::Disabled)
    }
}

/// Replace the endpoint in `id`'s slot with a freshly provisioned one.
///
/// Fails open: the old endpoint is deactivated first and stays that way if
/// retiring or creating fails. The registry is only touched on full success.
pub async fn regenerate(
    registry: &Registry,
    provisioner: &dyn EndpointProvisioner,
    id: &EndpointId,
) -> Result<EndpointId, ProvisionError> {
    if !provisioner.is_enabled() {
        return Err(ProvisionError::Disabled);
    }
    let Some(old) = registry.get(id).await else {
        return Err(ProvisionError::Transport(format!("unknown endpoint {}", id)));
    };

    registry.mark_retiring(id).await;

    if let Err(err) = provisioner.retire(&old).await {
        warn!(endpoint = %id, error = %err, "failed to retire endpoint, leaving inactive");
        return Err(err);
    }

    let replacement = match provisioner.create().await {
        Ok(endpoint) => endpoint,
        Err(err) => {
            warn!(endpoint = %id, error = %err, "failed to create replacement, leaving inactive");
            return Err(err);
        }
    };

    let new_id = replacement.id.clone();
    if let Err(err) = registry.replace(id, replacement).await {
        warn!(endpoint = %id, error = %err, "replacement rejected by registry");
        return Err(ProvisionError::Transport(err.to_string()));
    }

    info!(old = %id, new = %new_id, "endpoint regenerated");
    metric_inc("webhook_pool.endpoint.regenerated");
    Ok(new_id)
}

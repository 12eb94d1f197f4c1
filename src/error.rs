use std::fmt;
use std::time::Duration;

use crate::types::EndpointId;

/// Errors surfaced to the caller of `Dispatcher::send`.
///
/// Every other failure is absorbed by the retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// No endpoint qualified, even after a recovery sweep.
    NoAvailableEndpoint,

    /// Every retry failed. Carries the last observed failure.
    DeliveryExhausted {
        attempts: u32,
        last_error: Option<FailureReason>,
    },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::NoAvailableEndpoint =>
                write!(f, "no available endpoint in pool"),
            DispatchError::DeliveryExhausted { attempts, last_error: Some(reason) } =>
                write!(f, "delivery failed after {} attempts: {}", attempts, reason),
            DispatchError::DeliveryExhausted { attempts, last_error: None } =>
                write!(f, "delivery failed after {} attempts", attempts),
        }
    }
}

impl std::error::Error for DispatchError {}

/// Why a single delivery attempt did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Timeout,
    Network,

    /// 404: the endpoint no longer exists.
    EndpointGone,

    /// 429: throttled by the receiver. Not a health signal.
    RateLimited {
        retry_after: Duration,
    },

    /// Any other non-2xx response.
    RemoteError {
        status: u16,
    },

    /// Skipped locally because the endpoint is flooding.
    FloodSuppressed,
}

impl FailureReason {
    /// Whether this outcome counts against the endpoint's health.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            FailureReason::Timeout | FailureReason::Network | FailureReason::RemoteError { .. }
        )
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout =>
                write!(f, "request timed out"),
            FailureReason::Network =>
                write!(f, "network error"),
            FailureReason::EndpointGone =>
                write!(f, "endpoint gone (404)"),
            FailureReason::RateLimited { retry_after } =>
                write!(f, "rate limited, retry after {:?}", retry_after),
            FailureReason::RemoteError { status } =>
                write!(f, "remote endpoint returned {}", status),
            FailureReason::FloodSuppressed =>
                write!(f, "suppressed by flood detector"),
        }
    }
}

/// Errors from registry mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    UnknownEndpoint {
        endpoint_id: EndpointId,
    },

    /// The replacement id is already live in another slot.
    DuplicateId {
        endpoint_id: EndpointId,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::UnknownEndpoint { endpoint_id } =>
                write!(f, "endpoint not registered: {}", endpoint_id),
            RegistryError::DuplicateId { endpoint_id } =>
                write!(f, "endpoint id already in use: {}", endpoint_id),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Errors from an endpoint provisioner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    Disabled,
    Rejected {
        status: u16,
    },
    Transport(String),
}

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionError::Disabled =>
                write!(f, "provisioning is not configured"),
            ProvisionError::Rejected { status } =>
                write!(f, "management API rejected request with {}", status),
            ProvisionError::Transport(message) =>
                write!(f, "management API unreachable: {}", message),
        }
    }
}

impl std::error::Error for ProvisionError {}

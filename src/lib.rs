//! A single-process webhook delivery pool.
//!
//! A fixed set of interchangeable endpoints is used round-robin. Each
//! `send` goes through a global rate limiter, picks the next healthy
//! endpoint, checks it for self-induced flooding, makes one HTTP call and
//! feeds the outcome back into the endpoint's health record, retrying on
//! another endpoint up to a bound.
//!
//! ## Guarantees
//! - The pool is never empty
//! - Bounded attempts per send
//! - Flooded and failed endpoints heal without outside intervention
//! - Endpoint URLs never appear in logs or status output
//!
//! ## Non-Guarantees
//! - Durability across restarts
//! - Exactly-once delivery
//! - Strict consistency of health counters under concurrent sends

mod config;
mod dispatcher;
mod error;
mod flood;
mod provisioner;
mod rate_limiter;
mod recovery;
mod registry;
mod selector;
mod server;
mod telemetry;
mod transport;
mod types;
mod worker;

#[cfg(test)]
mod testing;

pub use config::{PoolConfig, BUILTIN_FALLBACK_URLS, MAX_CONFIGURED_ENDPOINTS};
pub use dispatcher::Dispatcher;
pub use error::{DispatchError, FailureReason, ProvisionError, RegistryError};
pub use flood::FloodDetector;
pub use provisioner::{regenerate, EndpointProvisioner, NoopProvisioner};
pub use rate_limiter::RateLimiter;
pub use recovery::RecoverySweeper;
pub use registry::Registry;
pub use selector::Selector;
pub use server::{create_routes, AppState, HealthReport, SendResponse};
pub use transport::{parse_retry_after, HttpTransport, Transport, TransportResponse};
pub use types::{
    redact_url, DeliveryResult, Endpoint, EndpointId, EndpointSnapshot, EndpointStatus, PoolStatus,
};
pub use worker::Pool;

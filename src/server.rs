use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dispatcher::Dispatcher;
use crate::types::{EndpointId, PoolStatus};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

/// Pool health as reported by `/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// `"healthy"`, or `"degraded"` once more than half the pool is inactive.
    pub status: String,
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub flooding: usize,
    pub flood_threshold: u32,
    pub flood_window_ms: u64,
}

impl HealthReport {
    fn new(status: &PoolStatus, flood_threshold: u32, flood_window: Duration) -> Self {
        let label = if status.inactive * 2 > status.total {
            "degraded"
        } else {
            "healthy"
        };
        Self {
            status: label.to_string(),
            total: status.total,
            active: status.active,
            inactive: status.inactive,
            flooding: status.flooding,
            flood_threshold,
            flood_window_ms: u64::try_from(flood_window.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Body returned by the mutating routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResponse {
    pub success: bool,
}

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/webhook/send", post(send_payload))
        .route("/api/webhook/status", get(pool_status))
        .route("/api/webhook/reactivate/{id}", post(reactivate_endpoint))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<HealthReport> {
    let status = state.dispatcher.status().await;
    let config = state.dispatcher.config();
    Json(HealthReport::new(&status, config.flood_threshold, config.flood_window))
}

/// Forward the JSON body through the pool.
///
/// Always answers 200; delivery failures are reported only via `success`.
async fn send_payload(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> Json<SendResponse> {
    let success = match state.dispatcher.send(&payload).await {
        Ok(result) => result.delivered,
        Err(err) => {
            warn!(error = %err, "inbound send failed");
            false
        }
    };
    Json(SendResponse { success })
}

async fn pool_status(State(state): State<AppState>) -> Json<PoolStatus> {
    Json(state.dispatcher.status().await)
}

async fn reactivate_endpoint(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<SendResponse> {
    let success = state.dispatcher.reactivate(&EndpointId(id)).await;
    Json(SendResponse { success })
}

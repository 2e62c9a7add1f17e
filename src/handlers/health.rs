//! Healthcheck endpoint.
//!
//! `GET /v1/healthcheck` requires no permission and always answers 200; a
//! store that does not respond is reported as `"degraded"` in the body.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use tracing::instrument;

use crate::models::{HealthResponse, SystemInfo};
use crate::state::AppState;

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "available",
///   "system_info": { "environment": "development", "version": "0.1.0" },
///   "store": "postgres",
///   "store_reachable": true,
///   "uptime_seconds": 42,
///   "timestamp": "2024-01-15T10:30:00Z"
/// }
/// ```
#[instrument(skip(state))]
pub async fn healthcheck(State(state): State<AppState>) -> Json<HealthResponse> {
    let store_reachable = state.watches.is_reachable().await;

    Json(HealthResponse {
        status: if store_reachable {
            "available"
        } else {
            "degraded"
        }
        .to_string(),
        system_info: SystemInfo {
            environment: state.config.environment.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        store: state.watches.backend().to_string(),
        store_reachable,
        uptime_seconds: state.uptime().as_secs(),
        timestamp: Utc::now(),
    })
}

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Watch;
use crate::filters::Metadata;

/// Single-record envelope: `{"watch": {...}}`.
#[derive(Debug, Serialize)]
pub struct WatchEnvelope {
    pub watch: Watch,
}

/// Listing envelope with pagination metadata.
#[derive(Debug, Serialize)]
pub struct WatchListResponse {
    /// Records on the requested page
    pub watches: Vec<Watch>,
    /// Pagination summary for the full result set
    pub metadata: Metadata,
}

/// Plain confirmation message.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Build and environment details reported by the healthcheck.
#[derive(Debug, Serialize)]
pub struct SystemInfo {
    /// Deployment environment label
    pub environment: String,
    /// Service version
    pub version: String,
}

/// Healthcheck response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "available" when the store answers, "degraded" otherwise
    pub status: String,
    pub system_info: SystemInfo,
    /// Store backend in use ("postgres" or "memory")
    pub store: String,
    /// Whether the store answered a ping
    pub store_reachable: bool,
    /// Uptime in seconds
    pub uptime_seconds: u64,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
}

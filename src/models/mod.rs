mod api;
mod watch;

pub use api::{HealthResponse, MessageResponse, SystemInfo, WatchEnvelope, WatchListResponse};
pub use watch::{UpdateWatchRequest, Watch, WatchAttributes};

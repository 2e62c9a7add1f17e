//! # Watch Catalog
//!
//! A JSON-over-HTTP catalog of wristwatches built on Axum, featuring:
//!
//! - **Optimistic Concurrency**: every record carries a version; stale
//!   writes are rejected with 409 instead of silently overwriting
//! - **Pagination**: safelisted sorting and page metadata on every listing
//! - **Throttling**: one token bucket per client, with idle-client eviction
//! - **Security**: bearer-token authentication and per-route permissions
//! - **Observability**: request IDs, structured logging, Prometheus metrics
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Panic → Request ID → Trace → CORS →            │
//! │              Rate Limit → Authenticate → Permission)        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (healthcheck, watches)                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  WatchService (validation, store timeouts, metrics)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  WatchStore: PgWatchStore | MemoryWatchStore                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use watch_catalog::auth::StaticTokenValidator;
//! use watch_catalog::store::MemoryWatchStore;
//! use watch_catalog::{AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), watch_catalog::AppError> {
//!     let config = Config::from_env()?;
//!     let tokens = Arc::new(StaticTokenValidator::new(&config.static_tokens));
//!     let state = AppState::new(Arc::new(MemoryWatchStore::new()), tokens, config)?;
//!     let app = build_router(state);
//!
//!     // Start the server...
//!     Ok(())
//! }
//! ```
//!
//! ## Storage
//!
//! With `DATABASE_URL` set the binary uses PostgreSQL and bearer tokens from
//! the `tokens` table; otherwise it runs on the in-memory store and tokens
//! from `STATIC_AUTH_TOKENS`:
//! ```bash
//! STATIC_AUTH_TOKENS="dev-token=watches:read|watches:write" cargo run
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod filters;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use routes::build_router;
pub use state::AppState;

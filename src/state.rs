//! Shared application state for Axum handlers.
//!
//! Holds the watch service, the token validator, the rate-limiter registry
//! and configuration. Everything is behind `Arc`, so cloning per request is
//! cheap.
//!
//! # Structured Concurrency
//!
//! The registry sweep runs as a background task tracked by a
//! `tokio_util::task::TaskTracker` and stopped through a `CancellationToken`.
//! Call `shutdown()` before exit so the task ends cleanly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace};

use crate::auth::TokenValidator;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::middleware::ClientRegistry;
use crate::services::WatchService;
use crate::store::WatchStore;

/// Shared application state for Axum handlers.
///
/// # Lifecycle
///
/// ```rust,ignore
/// let state = AppState::new(store, tokens, config)?;
/// // ... serve ...
/// state.shutdown().await;  // stops the registry sweep
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Watch operations with validation and timeouts
    pub watches: WatchService,
    /// Bearer-token validator used by the authentication layer
    pub tokens: Arc<dyn TokenValidator>,
    /// Per-client buckets; `None` when rate limiting is disabled
    pub rate_limiter: Option<Arc<ClientRegistry>>,
    /// Application configuration
    pub config: Arc<Config>,
    /// Timestamp when the application started
    pub started_at: Instant,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Build the state and start the registry sweep when rate limiting is on.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` when the rate limit settings are unusable.
    pub fn new(
        store: Arc<dyn WatchStore>,
        tokens: Arc<dyn TokenValidator>,
        config: Config,
    ) -> AppResult<Self> {
        let rate_limiter = if config.rate_limit_enabled {
            let registry = ClientRegistry::new(
                config.rate_limit_rps,
                config.rate_limit_burst,
                config.rate_limit_stale_after,
            )
            .map_err(|e| AppError::ConfigError(e.to_string()))?;
            Some(Arc::new(registry))
        } else {
            None
        };

        let state = Self {
            watches: WatchService::new(store, config.store_timeout),
            tokens,
            rate_limiter,
            config: Arc::new(config),
            started_at: Instant::now(),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        if let Some(registry) = &state.rate_limiter {
            state.spawn_sweep_task(registry.clone(), state.config.rate_limit_sweep_interval);
        }

        Ok(state)
    }

    /// Periodically evict idle clients from the registry.
    fn spawn_sweep_task(&self, registry: Arc<ClientRegistry>, every: Duration) {
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(every);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Rate limiter sweep received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = registry.sweep();
                        let remaining = registry.len();
                        metrics::record_rate_limit_sweep(evicted, remaining);
                        trace!(evicted, remaining, "Rate limiter sweep complete");
                    }
                }
            }

            debug!("Rate limiter sweep task shutting down");
        });
    }

    /// Stop background tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

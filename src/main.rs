use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use watch_catalog::auth::{PgTokenValidator, StaticTokenValidator, TokenValidator};
use watch_catalog::store::{MemoryWatchStore, PgWatchStore, WatchStore, connect_with_retry};
use watch_catalog::{AppState, Config, build_router, metrics, utils};

#[tokio::main]
async fn main() -> ExitCode {
    // Configuration is read first so the log format can follow it
    let config = Config::from_env();
    init_tracing(config.as_ref().ok());

    info!(
        "Starting Watch Catalog API v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {e}");
            return ExitCode::from(exitcode::CONFIG as u8);
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

fn init_tracing(config: Option<&Config>) {
    let level = config.map_or("info", |c| c.log_level.as_str());
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.is_some_and(|c| c.log_json) {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    }
}

/// Pick the backing store and matching token validator.
///
/// PostgreSQL when `DATABASE_URL` is set, the in-memory store otherwise.
async fn open_store(
    config: &Config,
) -> Result<(Arc<dyn WatchStore>, Arc<dyn TokenValidator>), exitcode::ExitCode> {
    let Some(url) = config.database_url.as_deref() else {
        let tokens = StaticTokenValidator::new(&config.static_tokens);
        if tokens.is_empty() {
            warn!("No STATIC_AUTH_TOKENS configured; every guarded route will answer 401");
        }
        info!("DATABASE_URL not set, using the in-memory store");
        return Ok((Arc::new(MemoryWatchStore::new()), Arc::new(tokens)));
    };

    info!("Connecting to PostgreSQL...");
    let pool = connect_with_retry(config, url).await.map_err(|e| {
        error!("Failed to connect to PostgreSQL: {e}");
        exitcode::UNAVAILABLE
    })?;

    let store = PgWatchStore::new(pool.clone());
    if config.run_migrations {
        store.migrate().await.map_err(|e| {
            error!("Failed to run migrations: {e}");
            exitcode::SOFTWARE
        })?;
    }

    Ok((Arc::new(store), Arc::new(PgTokenValidator::new(pool))))
}

/// Run the application, returning an exit code on error.
async fn run(config: Config) -> Result<(), exitcode::ExitCode> {
    info!(
        host = %config.host,
        port = %config.port,
        environment = %config.environment,
        rate_limit_enabled = config.rate_limit_enabled,
        "Configuration loaded"
    );

    if let Some(addr) = config.metrics_addr() {
        metrics::try_init_metrics(addr);
        info!("Prometheus metrics on http://{addr}/metrics");
    }

    let (store, tokens) = open_store(&config).await?;
    info!(backend = store.backend(), "Store ready");

    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;

    // Build application state and router
    let state = AppState::new(store, tokens, config).map_err(|e| {
        error!("Failed to build application state: {e}");
        exitcode::CONFIG
    })?;
    let app = build_router(state.clone());

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("API endpoints:");
    info!("  GET    /v1/healthcheck    - Health check");
    info!("  GET    /v1/watches        - List watches");
    info!("  POST   /v1/watches        - Create watch");
    info!("  GET    /v1/watches/{{id}}   - Show watch");
    info!("  PATCH  /v1/watches/{{id}}   - Update watch");
    info!("  DELETE /v1/watches/{{id}}   - Delete watch");

    // Peer addresses feed the rate limiter's client key
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(utils::shutdown_signal())
    .await
    .map_err(|e| {
        error!("Server error: {e}");
        exitcode::SOFTWARE
    })?;

    info!("HTTP server stopped, shutting down background tasks...");
    state.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}

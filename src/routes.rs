//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │  Panic Recovery  │ ← 500 instead of a dropped connection
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Request ID     │ ← Sets/propagates X-Request-Id
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response logging
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← Cross-origin headers
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Rate Limiting   │ ← 429 if the client's bucket is empty (when enabled)
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Authentication  │ ← 401 for a bad token, Identity otherwise
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Permission     │ ← per route: 401 anonymous / 403 insufficient
//! └────────┬─────────┘
//!          ▼
//!      Handler
//! ```
//!
//! # Routes
//!
//! - `GET /v1/healthcheck` - no permission required
//! - `GET /v1/watches`, `GET /v1/watches/{id}` - `watches:read`
//! - `POST /v1/watches`, `PATCH|DELETE /v1/watches/{id}` - `watches:write`

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, patch, post};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::{PERMISSION_WATCHES_READ, PERMISSION_WATCHES_WRITE};
use crate::handlers;
use crate::middleware::{
    AuthenticateLayer, RateLimitLayer, RequirePermissionLayer, TrustedProxies, panic_response,
};
use crate::state::AppState;

/// Build the application router with all routes and middleware configured.
///
/// Rate limiting is installed only when the state carries a registry
/// (`RATE_LIMIT_ENABLED=true`).
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;
    let read = RequirePermissionLayer::new(PERMISSION_WATCHES_READ);
    let write = RequirePermissionLayer::new(PERMISSION_WATCHES_WRITE);

    let mut router = Router::new()
        .route("/v1/healthcheck", get(handlers::healthcheck))
        .route(
            "/v1/watches",
            get(handlers::list_watches).route_layer(read),
        )
        .route(
            "/v1/watches",
            post(handlers::create_watch).route_layer(write),
        )
        .route(
            "/v1/watches/{id}",
            get(handlers::show_watch).route_layer(read),
        )
        .route(
            "/v1/watches/{id}",
            patch(handlers::update_watch).route_layer(write),
        )
        .route(
            "/v1/watches/{id}",
            delete(handlers::delete_watch).route_layer(write),
        )
        .fallback(handlers::not_found);

    // =========================================================================
    // Apply Middleware Stack (order matters - applied bottom to top)
    // =========================================================================

    // 1. Request body size limit
    router = router.layer(DefaultBodyLimit::max(config.max_request_body_size));

    // 2. Authentication (identity only; permissions are checked per route)
    router = router.layer(AuthenticateLayer::new(
        state.tokens.clone(),
        config.auth_timeout,
    ));

    // 3. Rate limiting, outside authentication so rejected clients cost no lookup
    match &state.rate_limiter {
        Some(registry) => {
            let proxies = TrustedProxies::new(&config.trusted_proxies);
            info!(
                rps = config.rate_limit_rps,
                burst = config.rate_limit_burst,
                forwarding_headers = proxies.is_enabled(),
                "Rate limiting enabled"
            );
            router = router.layer(RateLimitLayer::new(registry.clone(), proxies));
        }
        None => info!("Rate limiting disabled (RATE_LIMIT_ENABLED=false)"),
    }

    // 4. CORS
    router = router.layer(build_cors_layer(&config.cors_allowed_origins));

    // 5. Tracing
    router = router.layer(TraceLayer::new_for_http());

    // 6. Request ID: generated when absent, echoed on the response
    router = router
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    // 7. Panic recovery, outermost
    router = router.layer(CatchPanicLayer::custom(panic_response));

    router.with_state(state)
}

/// Build CORS layer from configuration.
///
/// `"*"` allows any origin; otherwise only the listed origins that parse as
/// header values are allowed.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_any = allowed_origins.iter().any(|o| o == "*");

    let cors = if allow_any {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(origins)
    };

    cors.allow_methods(Any).allow_headers(Any)
}

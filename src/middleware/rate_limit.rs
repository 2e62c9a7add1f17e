//! Rate limiting middleware.
//!
//! Each request is charged against its client's bucket in the
//! [`ClientRegistry`]. When the bucket is empty the request is answered with
//! 429 and never reaches the inner service.
//!
//! # Response Headers
//!
//! On rate limit exceeded (429):
//! - `Retry-After`: Seconds until the next request will be accepted
//! - `X-RateLimit-Limit`: Configured RPS limit
//! - `X-RateLimit-Remaining`: Always `0`
//!
//! When the limiter is disabled in configuration the layer is simply not
//! installed.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Request, Response};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::warn;

use super::client_key::{TrustedProxies, client_key};
use super::client_registry::ClientRegistry;
use crate::error::AppError;
use crate::metrics;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Rate limiting layer for Tower middleware stack.
///
/// # Example
///
/// ```rust,ignore
/// let registry = Arc::new(ClientRegistry::new(2, 4, Duration::from_secs(180))?);
/// let app = Router::new()
///     .route("/v1/watches", get(handler))
///     .layer(RateLimitLayer::new(registry, TrustedProxies::default()));
/// ```
#[derive(Clone)]
pub struct RateLimitLayer {
    registry: Arc<ClientRegistry>,
    trusted_proxies: Arc<TrustedProxies>,
}

impl RateLimitLayer {
    pub fn new(registry: Arc<ClientRegistry>, trusted_proxies: TrustedProxies) -> Self {
        Self {
            registry,
            trusted_proxies: Arc::new(trusted_proxies),
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            registry: self.registry.clone(),
            trusted_proxies: self.trusted_proxies.clone(),
        }
    }
}

/// Rate limiting service wrapper.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    registry: Arc<ClientRegistry>,
    trusted_proxies: Arc<TrustedProxies>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let client = client_key(&req, &self.trusted_proxies);
        let decision = self.registry.check(&client);
        metrics::record_rate_limit_decision(decision.is_ok());

        match decision {
            Ok(()) => {
                let mut inner = self.inner.clone();
                Box::pin(async move { inner.call(req).await })
            }
            Err(wait) => {
                let retry_after_secs = wait.as_secs_f64().ceil().max(1.0) as u64;

                warn!(
                    client = %client,
                    path = %req.uri().path(),
                    retry_after_secs,
                    "Rate limit exceeded"
                );

                let mut response = AppError::RateLimited { retry_after_secs }.into_response();
                let headers = response.headers_mut();
                headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.registry.limit()));
                headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from_static("0"));

                Box::pin(async move { Ok(response) })
            }
        }
    }
}

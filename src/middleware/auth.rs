//! Bearer-token authentication middleware.
//!
//! Resolves the `Authorization` header into an [`Identity`] and stores it in
//! the request extensions for the permission layer and handlers:
//!
//! - no header: [`Identity::Anonymous`]
//! - `Bearer <token>` that validates: [`Identity::User`]
//! - anything else: 401 with `WWW-Authenticate: Bearer`
//!
//! A lookup that errors or exceeds `AUTH_TIMEOUT_MS` is a server fault (500),
//! not a bad credential. Every response carries `Vary: Authorization`.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, VARY};
use axum::http::{HeaderValue, Request, Response};
use axum::response::IntoResponse;
use tokio::time::timeout;
use tower::{Layer, Service};
use tracing::debug;

use crate::auth::{Identity, TokenError, TokenValidator};
use crate::error::AppError;
use crate::metrics;

/// What the `Authorization` header says.
#[derive(Debug, PartialEq, Eq)]
enum Credential<'a> {
    Absent,
    Bearer(&'a str),
    Malformed,
}

fn credential<B>(req: &Request<B>) -> Credential<'_> {
    let Some(value) = req.headers().get(AUTHORIZATION) else {
        return Credential::Absent;
    };

    match value.to_str().ok().and_then(|v| v.split_once(' ')) {
        Some(("Bearer", token)) if !token.is_empty() => Credential::Bearer(token),
        _ => Credential::Malformed,
    }
}

/// Authentication layer.
#[derive(Clone)]
pub struct AuthenticateLayer {
    validator: Arc<dyn TokenValidator>,
    timeout: Duration,
}

impl AuthenticateLayer {
    pub fn new(validator: Arc<dyn TokenValidator>, timeout: Duration) -> Self {
        Self { validator, timeout }
    }
}

impl<S> Layer<S> for AuthenticateLayer {
    type Service = AuthenticateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthenticateService {
            inner,
            validator: self.validator.clone(),
            timeout: self.timeout,
        }
    }
}

/// Authentication service wrapper.
#[derive(Clone)]
pub struct AuthenticateService<S> {
    inner: S,
    validator: Arc<dyn TokenValidator>,
    timeout: Duration,
}

async fn identify(
    validator: &dyn TokenValidator,
    limit: Duration,
    token: Option<String>,
) -> Result<Identity, AppError> {
    let Some(token) = token else {
        return Ok(Identity::Anonymous);
    };

    let user = timeout(limit, validator.validate(&token))
        .await
        .map_err(|_| TokenError::Timeout(limit))??;

    user.map(Identity::User).ok_or(AppError::InvalidToken)
}

impl<S> Service<Request<Body>> for AuthenticateService<S>
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

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let validator = self.validator.clone();
        let limit = self.timeout;
        let mut inner = self.inner.clone();

        let token = match credential(&req) {
            Credential::Absent => Ok(None),
            Credential::Bearer(token) => Ok(Some(token.to_string())),
            Credential::Malformed => Err(AppError::InvalidToken),
        };

        Box::pin(async move {
            let identity = match token {
                Ok(token) => identify(validator.as_ref(), limit, token).await,
                Err(e) => Err(e),
            };

            let mut response = match identity {
                Ok(identity) => {
                    req.extensions_mut().insert(identity);
                    inner.call(req).await?
                }
                Err(e) => {
                    let reason = match &e {
                        AppError::InvalidToken => "invalid_token",
                        _ => "lookup_failed",
                    };
                    metrics::record_auth_failure(reason);
                    debug!(path = %req.uri().path(), reason, "Authentication failed");
                    e.into_response()
                }
            };

            response
                .headers_mut()
                .append(VARY, HeaderValue::from_static("Authorization"));
            Ok(response)
        })
    }
}

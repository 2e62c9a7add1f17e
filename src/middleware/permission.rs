//! Per-route permission checks.
//!
//! Installed with `route_layer` on each guarded route. Runs after
//! [`AuthenticateLayer`](super::AuthenticateLayer) and reads the
//! [`Identity`] it left in the request extensions.

use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::debug;

use crate::auth::Identity;
use crate::error::{AppError, AppResult};
use crate::metrics;

/// Decide whether `identity` may use a route requiring `permission`.
///
/// - anonymous: `Unauthenticated` (401)
/// - not activated: `Forbidden` (403)
/// - permission missing: `Forbidden` (403)
pub fn authorize(identity: &Identity, permission: &str) -> AppResult<()> {
    let user = match identity {
        Identity::Anonymous => return Err(AppError::Unauthenticated),
        Identity::User(user) => user,
    };

    if !user.activated {
        return Err(AppError::Forbidden(
            "Your user account must be activated to access this resource.".to_string(),
        ));
    }

    if !user.permissions.include(permission) {
        return Err(AppError::Forbidden(
            "Your user account doesn't have the necessary permissions to access this resource."
                .to_string(),
        ));
    }

    Ok(())
}

/// Rejects requests whose identity lacks `permission`.
#[derive(Debug, Clone, Copy)]
pub struct RequirePermissionLayer {
    permission: &'static str,
}

impl RequirePermissionLayer {
    pub fn new(permission: &'static str) -> Self {
        Self { permission }
    }
}

impl<S> Layer<S> for RequirePermissionLayer {
    type Service = RequirePermissionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequirePermissionService {
            inner,
            permission: self.permission,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequirePermissionService<S> {
    inner: S,
    permission: &'static str,
}

impl<S> Service<Request<Body>> for RequirePermissionService<S>
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
        let decision = match req.extensions().get::<Identity>() {
            Some(identity) => authorize(identity, self.permission),
            None => authorize(&Identity::Anonymous, self.permission),
        };

        match decision {
            Ok(()) => {
                let mut inner = self.inner.clone();
                Box::pin(async move { inner.call(req).await })
            }
            Err(e) => {
                let reason = match &e {
                    AppError::Unauthenticated => "unauthenticated",
                    _ => "forbidden",
                };
                metrics::record_auth_failure(reason);
                debug!(
                    path = %req.uri().path(),
                    permission = self.permission,
                    reason,
                    "Permission check failed"
                );
                let response = e.into_response();
                Box::pin(async move { Ok(response) })
            }
        }
    }
}

//! Panic recovery for the outermost layer.
//!
//! Used with `tower_http::catch_panic::CatchPanicLayer::custom`. The panic
//! payload is logged; the client only sees the generic 500 body.

use std::any::Any;

use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::error::AppError;
use crate::metrics;

pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };

    error!(panic = %detail, "Request handler panicked");
    metrics::record_panic_recovered();

    AppError::Internal(detail).into_response()
}

use axum::extract::rejection::JsonRejection;
use axum::http::header::{RETRY_AFTER, WWW_AUTHENTICATE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::auth::TokenError;
use crate::store::StoreError;
use crate::validation::ValidationErrors;

/// Application-wide error types with appropriate HTTP status codes.
///
/// Each variant is one kind of failure a client can observe:
///
/// - `FailedValidation` - one or more field rules violated (422)
/// - `NotFound` / `EditConflict` - store outcomes (404 / 409)
/// - `RateLimited` - the client's bucket is empty (429)
/// - `Unauthenticated` / `InvalidToken` / `Forbidden` - gate outcomes (401 / 403)
/// - `Store` / `Upstream` / `Internal` - server faults (500, details never exposed)
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed for {} field(s)", .0.len())]
    FailedValidation(ValidationErrors),

    #[error("Resource not found")]
    NotFound,

    #[error("Edit conflict")]
    EditConflict,

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Invalid or missing authentication token")]
    InvalidToken,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Store operation failed: {0}")]
    Store(String),

    #[error("Upstream dependency failed: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Error response body for API endpoints.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<ValidationErrors>,
}

impl AppError {
    /// Status code this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::FailedValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::EditConflict => StatusCode::CONFLICT,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Unauthenticated | AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Store(_)
            | AppError::Upstream(_)
            | AppError::Internal(_)
            | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Log the full error details server-side for debugging
        // but only expose sanitized messages to clients
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let retry_after = match &self {
            AppError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };
        let challenge = matches!(self, AppError::InvalidToken);

        let (error_type, message, fields) = match self {
            AppError::FailedValidation(fields) => (
                "failed_validation",
                "The request contains invalid fields.".to_string(),
                Some(fields),
            ),
            AppError::NotFound => (
                "not_found",
                "The requested resource could not be found.".to_string(),
                None,
            ),
            AppError::EditConflict => (
                "edit_conflict",
                "Unable to update the record due to an edit conflict, please try again."
                    .to_string(),
                None,
            ),
            AppError::RateLimited { .. } => (
                "rate_limit_exceeded",
                "Rate limit exceeded. Please retry later.".to_string(),
                None,
            ),
            AppError::Unauthenticated => (
                "authentication_required",
                "You must be authenticated to access this resource.".to_string(),
                None,
            ),
            AppError::InvalidToken => (
                "invalid_token",
                "Invalid or missing authentication token.".to_string(),
                None,
            ),

            // Client errors - safe to show the message as it's user-facing
            AppError::Forbidden(message) => ("forbidden", message, None),
            AppError::BadRequest(message) => ("bad_request", message, None),

            // Internal errors - never expose internal details to clients
            AppError::Store(_) | AppError::Upstream(_) | AppError::Internal(_) => (
                "internal_error",
                "The server encountered a problem and could not process your request."
                    .to_string(),
                None,
            ),
            AppError::ConfigError(_) => (
                "config_error",
                "Service configuration error. Please contact support.".to_string(),
                None,
            ),
        };

        let body = ErrorResponse {
            error: error_type,
            message,
            fields,
        };

        let mut response = (status, axum::Json(body)).into_response();
        let headers = response.headers_mut();
        if let Some(secs) = retry_after {
            headers.insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        if challenge {
            headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound,
            StoreError::EditConflict => AppError::EditConflict,
            other => AppError::Store(other.to_string()),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::Upstream(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match &rejection {
            JsonRejection::JsonDataError(e) => sanitize_serde_error(&e.body_text()),
            JsonRejection::JsonSyntaxError(_) => "Malformed JSON in request body".to_string(),
            JsonRejection::MissingJsonContentType(_) => {
                "Expected request with `Content-Type: application/json`".to_string()
            }
            _ => "Unable to read request body".to_string(),
        };
        AppError::BadRequest(message)
    }
}

/// Sanitize serde error messages to avoid leaking internal type information.
///
/// Serde errors can contain internal struct/field names which shouldn't be
/// exposed to external clients. This function extracts the useful parts.
fn sanitize_serde_error(msg: &str) -> String {
    if let Some(field) = backticked_after(msg, "missing field") {
        return format!("Missing required field: {field}");
    }

    if let Some(field) = backticked_after(msg, "unknown field") {
        return format!("Unknown field: {field}");
    }

    if msg.contains("invalid type") || msg.contains("invalid value") {
        return "Invalid data type in request body".to_string();
    }

    if msg.contains("EOF while parsing") || msg.contains("expected") {
        return "Malformed JSON in request body".to_string();
    }

    "Invalid request format".to_string()
}

/// First backtick-quoted token following `marker` in a serde message.
fn backticked_after<'a>(msg: &'a str, marker: &str) -> Option<&'a str> {
    let rest = msg.get(msg.find(marker)? + marker.len()..)?;
    let start = rest.find('`')? + 1;
    let len = rest.get(start..)?.find('`')?;
    rest.get(start..start + len)
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::FailedValidation(BTreeMap::new()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(AppError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::EditConflict.status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::RateLimited {
                retry_after_secs: 1
            }
            .status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(AppError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::InvalidToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Forbidden("nope".to_string()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Store("boom".to_string()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Upstream("boom".to_string()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_error_conversion() {
        assert!(matches!(
            AppError::from(StoreError::NotFound),
            AppError::NotFound
        ));
        assert!(matches!(
            AppError::from(StoreError::EditConflict),
            AppError::EditConflict
        ));
        assert!(matches!(
            AppError::from(StoreError::Timeout(std::time::Duration::from_secs(3))),
            AppError::Store(_)
        ));
    }

    #[tokio::test]
    async fn test_store_error_body_does_not_leak_details() {
        let response =
            AppError::Store("relation \"watches\" does not exist".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(!text.contains("relation"));
        assert!(text.contains("internal_error"));
    }

    #[tokio::test]
    async fn test_validation_body_lists_fields() {
        let mut fields = BTreeMap::new();
        fields.insert("brand".to_string(), "must be provided".to_string());
        fields.insert("price".to_string(), "must be greater than zero".to_string());

        let response = AppError::FailedValidation(fields).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["fields"]["brand"], "must be provided");
        assert_eq!(body["fields"]["price"], "must be greater than zero");
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = AppError::RateLimited {
            retry_after_secs: 2,
        }
        .into_response();
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "2");
    }

    #[test]
    fn test_invalid_token_sets_challenge() {
        let response = AppError::InvalidToken.into_response();
        assert_eq!(response.headers().get(WWW_AUTHENTICATE).unwrap(), "Bearer");

        let response = AppError::Unauthenticated.into_response();
        assert!(response.headers().get(WWW_AUTHENTICATE).is_none());
    }

    #[test]
    fn test_sanitize_missing_field() {
        let msg = "Failed to deserialize the JSON body into the target type: missing field `brand` at line 1 column 2";
        assert_eq!(sanitize_serde_error(msg), "Missing required field: brand");
    }

    #[test]
    fn test_sanitize_unknown_field() {
        let msg = "Failed to deserialize the JSON body into the target type: unknown field `colour`, expected one of `brand`, `model`";
        assert_eq!(sanitize_serde_error(msg), "Unknown field: colour");
    }

    #[test]
    fn test_sanitize_invalid_type() {
        let msg = "Failed to deserialize the JSON body into the target type: price: invalid type: string \"x\", expected f64";
        assert_eq!(
            sanitize_serde_error(msg),
            "Invalid data type in request body"
        );
    }

    #[test]
    fn test_sanitize_fallback() {
        assert_eq!(sanitize_serde_error("weird"), "Invalid request format");
    }
}

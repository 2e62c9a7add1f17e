//! Request identities and bearer-token validation.
//!
//! Authentication resolves a bearer token into an [`Identity`]; authorization
//! (see `middleware::permission`) then checks that identity against the
//! permission a route requires.
//!
//! Two [`TokenValidator`] backends exist:
//!
//! - [`StaticTokenValidator`] - tokens from configuration, compared in constant time
//! - [`PgTokenValidator`] - SHA-256 hashed tokens in PostgreSQL with expiry

mod postgres;
mod static_tokens;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use postgres::{AUTHENTICATION_SCOPE, PgTokenValidator, hash_token};
pub use static_tokens::StaticTokenValidator;

pub const PERMISSION_WATCHES_READ: &str = "watches:read";
pub const PERMISSION_WATCHES_WRITE: &str = "watches:write";

/// Permission codes granted to a user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(Vec<String>);

impl Permissions {
    pub fn include(&self, code: &str) -> bool {
        self.0.iter().any(|p| p == code)
    }
}

impl From<Vec<String>> for Permissions {
    fn from(codes: Vec<String>) -> Self {
        Self(codes)
    }
}

/// A user resolved from a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub activated: bool,
    pub permissions: Permissions,
}

/// Who is making the request. Inserted into request extensions by the
/// authentication middleware.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Identity {
    /// No credentials were presented.
    #[default]
    Anonymous,
    User(AuthenticatedUser),
}

/// The token lookup itself failed; says nothing about the token's validity.
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("token lookup failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("token lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// Resolves a bearer token to a user.
///
/// `Ok(None)` means the token is unknown, expired or malformed.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, token: &str) -> Result<Option<AuthenticatedUser>, TokenError>;
}

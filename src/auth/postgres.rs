use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use super::{AuthenticatedUser, Permissions, TokenError, TokenValidator};

/// Scope of tokens that authenticate API requests.
pub const AUTHENTICATION_SCOPE: &str = "authentication";

/// Plaintext tokens are 16 random bytes in unpadded base32.
const TOKEN_PLAINTEXT_LEN: usize = 26;

/// SHA-256 digest under which a token is stored.
pub fn hash_token(plaintext: &str) -> Vec<u8> {
    Sha256::digest(plaintext.as_bytes()).to_vec()
}

#[derive(sqlx::FromRow)]
struct TokenUserRow {
    id: i64,
    activated: bool,
    permissions: Vec<String>,
}

/// Validator backed by the `tokens`, `users` and `permissions` tables.
#[derive(Debug, Clone)]
pub struct PgTokenValidator {
    pool: PgPool,
}

impl PgTokenValidator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenValidator for PgTokenValidator {
    async fn validate(&self, token: &str) -> Result<Option<AuthenticatedUser>, TokenError> {
        if token.len() != TOKEN_PLAINTEXT_LEN {
            return Ok(None);
        }

        let row = sqlx::query_as::<_, TokenUserRow>(
            r#"
            SELECT users.id, users.activated,
                   COALESCE(array_agg(permissions.code) FILTER (WHERE permissions.code IS NOT NULL),
                            '{}') AS permissions
            FROM users
            INNER JOIN tokens ON tokens.user_id = users.id
            LEFT JOIN users_permissions ON users_permissions.user_id = users.id
            LEFT JOIN permissions ON permissions.id = users_permissions.permission_id
            WHERE tokens.hash = $1 AND tokens.scope = $2 AND tokens.expiry > $3
            GROUP BY users.id
            "#,
        )
        .bind(hash_token(token))
        .bind(AUTHENTICATION_SCOPE)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| AuthenticatedUser {
            id: r.id,
            activated: r.activated,
            permissions: Permissions::from(r.permissions),
        }))
    }
}

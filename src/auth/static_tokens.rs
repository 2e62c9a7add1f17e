use async_trait::async_trait;
use subtle::ConstantTimeEq;

use super::{AuthenticatedUser, Permissions, TokenError, TokenValidator};
use crate::config::StaticToken;

/// Validator over a fixed token list.
///
/// Every configured token is compared on each lookup so the time taken does
/// not depend on which entry matched. Users are numbered by their position in
/// the list and are always activated.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenValidator {
    entries: Vec<(String, AuthenticatedUser)>,
}

impl StaticTokenValidator {
    pub fn new(tokens: &[StaticToken]) -> Self {
        let entries = tokens
            .iter()
            .zip(1..)
            .map(|(t, id)| {
                (
                    t.token.clone(),
                    AuthenticatedUser {
                        id,
                        activated: true,
                        permissions: Permissions::from(t.permissions.clone()),
                    },
                )
            })
            .collect();
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl TokenValidator for StaticTokenValidator {
    async fn validate(&self, token: &str) -> Result<Option<AuthenticatedUser>, TokenError> {
        let mut found = None;
        for (candidate, user) in &self.entries {
            if bool::from(candidate.as_bytes().ct_eq(token.as_bytes())) {
                found = Some(user.clone());
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::{PERMISSION_WATCHES_READ, PERMISSION_WATCHES_WRITE};

    fn validator() -> StaticTokenValidator {
        StaticTokenValidator::new(&[
            StaticToken {
                token: "reader-token".to_string(),
                permissions: vec![PERMISSION_WATCHES_READ.to_string()],
            },
            StaticToken {
                token: "writer-token".to_string(),
                permissions: vec![
                    PERMISSION_WATCHES_READ.to_string(),
                    PERMISSION_WATCHES_WRITE.to_string(),
                ],
            },
        ])
    }

    #[tokio::test]
    async fn test_known_token_resolves_user() {
        let user = validator().validate("writer-token").await.unwrap().unwrap();
        assert_eq!(user.id, 2);
        assert!(user.activated);
        assert!(user.permissions.include(PERMISSION_WATCHES_WRITE));
    }

    #[tokio::test]
    async fn test_unknown_token_is_none() {
        let v = validator();
        assert!(v.validate("reader-tokeN").await.unwrap().is_none());
        assert!(v.validate("reader").await.unwrap().is_none());
        assert!(v.validate("").await.unwrap().is_none());
    }

    #[test]
    fn test_empty_validator() {
        assert!(StaticTokenValidator::new(&[]).is_empty());
        assert!(!validator().is_empty());
    }
}

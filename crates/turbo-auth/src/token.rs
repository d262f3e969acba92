//! Bearer tokens and the in-memory token directory.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use turbo_commerce::ids::UserId;

use crate::{AuthError, IdentityResolver, Principal, Role};

/// Default token lifetime.
const DEFAULT_TOKEN_TTL_SECS: i64 = 30 * 24 * 60 * 60; // 30 days

/// An issued bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    /// The token value.
    pub token: String,
    /// Who the token authenticates.
    pub principal: Principal,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthToken {
    /// Generate a new token with the default lifetime.
    pub fn generate(principal: Principal) -> Self {
        Self::generate_with_expiry(principal, Duration::seconds(DEFAULT_TOKEN_TTL_SECS))
    }

    /// Generate token with custom lifetime.
    pub fn generate_with_expiry(principal: Principal, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            token: generate_token_string(),
            principal,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Check if token is expired.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Validate the token.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.is_expired() {
            return Err(AuthError::TokenExpired);
        }
        Ok(())
    }
}

/// In-memory token → principal lookup.
///
/// Stands in for the external identity provider in single-process
/// deployments and tests.
#[derive(Debug, Default)]
pub struct TokenDirectory {
    tokens: RwLock<HashMap<String, AuthToken>>,
}

impl TokenDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh token for a user.
    pub async fn issue(&self, user_id: UserId, roles: Vec<Role>) -> AuthToken {
        let token = AuthToken::generate(Principal { user_id, roles });
        self.insert(token.clone()).await;
        token
    }

    /// Register an existing token.
    pub async fn insert(&self, token: AuthToken) {
        self.tokens.write().await.insert(token.token.clone(), token);
    }

    /// Revoke a token. Returns whether it existed.
    pub async fn revoke(&self, token: &str) -> bool {
        self.tokens.write().await.remove(token).is_some()
    }
}

#[async_trait]
impl IdentityResolver for TokenDirectory {
    async fn resolve_token(&self, token: &str) -> Result<Principal, AuthError> {
        let tokens = self.tokens.read().await;
        let entry = tokens.get(token).ok_or(AuthError::InvalidToken)?;
        entry.validate()?;
        Ok(entry.principal.clone())
    }
}

/// Generate a random URL-safe token string.
fn generate_token_string() -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use rand::Rng;

    let bytes: [u8; 24] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_generation() {
        let a = AuthToken::generate(Principal::customer(UserId::new("u1")));
        let b = AuthToken::generate(Principal::customer(UserId::new("u1")));
        assert_ne!(a.token, b.token);
        assert_eq!(a.token.len(), 32);
        assert!(a.validate().is_ok());
    }

    #[tokio::test]
    async fn test_directory_resolves_issued_token() {
        let directory = TokenDirectory::new();
        let token = directory
            .issue(UserId::new("u1"), vec![Role::Customer])
            .await;

        let principal = directory.resolve_token(&token.token).await.unwrap();
        assert_eq!(principal.user_id, UserId::new("u1"));

        assert!(directory.revoke(&token.token).await);
        assert_eq!(
            directory.resolve_token(&token.token).await,
            Err(AuthError::InvalidToken)
        );
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let directory = TokenDirectory::new();
        let token = AuthToken::generate_with_expiry(
            Principal::customer(UserId::new("u1")),
            Duration::seconds(-1),
        );
        directory.insert(token.clone()).await;
        assert_eq!(
            directory.resolve_token(&token.token).await,
            Err(AuthError::TokenExpired)
        );
    }
}

//! Roles, principals and caller identity.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use turbo_commerce::cart::CartOwner;
use turbo_commerce::ids::{SessionId, UserId};

use crate::AuthError;

/// User role for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular customer.
    #[default]
    Customer,
    /// Store staff with limited admin access.
    Staff,
    /// Store administrator.
    Admin,
    /// Super admin with full access.
    SuperAdmin,
}

impl Role {
    /// Get role as string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Staff => "staff",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    /// Check if this role has at least the given permission level.
    pub fn has_permission(&self, required: Role) -> bool {
        self.level() >= required.level()
    }

    /// Get permission level (higher = more permissions).
    pub fn level(&self) -> u8 {
        match self {
            Role::Customer => 0,
            Role::Staff => 1,
            Role::Admin => 2,
            Role::SuperAdmin => 3,
        }
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "staff" => Ok(Role::Staff),
            "admin" => Ok(Role::Admin),
            "super_admin" => Ok(Role::SuperAdmin),
            _ => Err(()),
        }
    }
}

/// An authenticated user as seen by the cart service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl Principal {
    /// Create a principal with the customer role.
    pub fn customer(user_id: UserId) -> Self {
        Self {
            user_id,
            roles: vec![Role::Customer],
        }
    }

    /// Check if any role reaches the given permission level.
    pub fn has_permission(&self, required: Role) -> bool {
        self.roles.iter().any(|r| r.has_permission(required))
    }
}

/// Resolved caller identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Bearer token resolved to a user.
    User(Principal),
    /// Anonymous caller tracked by a session id.
    Guest(SessionId),
    /// Neither token nor session; only the client address is known.
    Anonymous,
}

impl Identity {
    /// Owner of the cart this identity works with.
    pub fn cart_owner(&self) -> Option<CartOwner> {
        match self {
            Identity::User(principal) => Some(CartOwner::User(principal.user_id.clone())),
            Identity::Guest(session_id) => Some(CartOwner::Session(session_id.clone())),
            Identity::Anonymous => None,
        }
    }

    /// User ID if authenticated.
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Identity::User(principal) => Some(&principal.user_id),
            _ => None,
        }
    }
}

/// Raw credentials lifted off an inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Bearer token from the authorization header.
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// Caller-supplied session identifier.
    #[serde(default)]
    pub session_id: Option<SessionId>,
    /// Client address, used only as a rate limit fallback.
    #[serde(default)]
    pub client_ip: Option<String>,
}

impl Credentials {
    /// Credentials carrying a bearer token.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            bearer_token: Some(token.into()),
            ..Self::default()
        }
    }

    /// Credentials carrying a guest session.
    pub fn session(session_id: impl Into<SessionId>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    /// Set the client address.
    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }
}

/// Maps bearer tokens to principals.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve a bearer token, failing for unknown or expired tokens.
    async fn resolve_token(&self, token: &str) -> Result<Principal, AuthError>;
}

/// Resolve the caller: token first, then session, else anonymous.
///
/// A token that fails to resolve is an error; it never falls back to the
/// session.
pub async fn resolve_identity(
    resolver: &dyn IdentityResolver,
    credentials: &Credentials,
) -> Result<Identity, AuthError> {
    if let Some(token) = credentials
        .bearer_token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return resolver.resolve_token(token).await.map(Identity::User);
    }

    match &credentials.session_id {
        Some(session_id) if !session_id.is_blank() => Ok(Identity::Guest(session_id.clone())),
        _ => Ok(Identity::Anonymous),
    }
}

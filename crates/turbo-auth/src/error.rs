//! Authentication errors.

use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Token invalid or unknown.
    #[error("token invalid or expired")]
    InvalidToken,

    /// Token expired.
    #[error("token expired")]
    TokenExpired,

    /// The caller supplied neither a token nor a session.
    #[error("no caller identity supplied")]
    MissingIdentity,

    /// The action needs an authenticated user.
    #[error("authentication required")]
    AuthenticationRequired,

    /// Insufficient permissions.
    #[error("insufficient permissions")]
    InsufficientPermissions,

    /// Identity backend failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Check if this is a permission error.
    pub fn is_permission_error(&self) -> bool {
        matches!(self, AuthError::InsufficientPermissions)
    }
}

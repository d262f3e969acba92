//! Capability policy.

use serde::{Deserialize, Serialize};

use crate::{AuthError, Identity, Role};

/// Something a caller may ask the cart service to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Read the caller's own cart.
    ViewCart,
    /// Change the caller's own cart.
    MutateCart,
    /// Fold a guest session cart into the caller's cart.
    MergeGuestCart,
    /// Record that checkout completed for a cart.
    ConvertCart,
    /// Read service-wide cart statistics.
    ViewStatistics,
    /// Run the expired cart sweep.
    CleanupExpired,
}

impl Action {
    /// Minimum role for actions reserved to authenticated users.
    fn required_role(&self) -> Option<Role> {
        match self {
            Action::ViewCart | Action::MutateCart => None,
            Action::MergeGuestCart => Some(Role::Customer),
            Action::ConvertCart | Action::ViewStatistics => Some(Role::Staff),
            Action::CleanupExpired => Some(Role::Admin),
        }
    }
}

/// Decide whether `identity` may perform `action`.
pub fn authorize(identity: &Identity, action: Action) -> Result<(), AuthError> {
    match (identity, action.required_role()) {
        (Identity::Anonymous, _) => Err(AuthError::MissingIdentity),
        (Identity::Guest(_), None) => Ok(()),
        (Identity::Guest(_), Some(_)) => Err(AuthError::AuthenticationRequired),
        (Identity::User(_), None) => Ok(()),
        (Identity::User(principal), Some(role)) if principal.has_permission(role) => Ok(()),
        (Identity::User(_), Some(_)) => Err(AuthError::InsufficientPermissions),
    }
}

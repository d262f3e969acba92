//! Caller identity and authorization for TurboCommerce.
//!
//! The request boundary turns raw [`Credentials`] into an [`Identity`]
//! through an [`IdentityResolver`], then asks [`authorize`] whether that
//! identity may perform an [`Action`]. Handlers never compare role
//! strings themselves.

mod error;
mod identity;
mod policy;
mod token;

pub use error::AuthError;
pub use identity::{resolve_identity, Credentials, Identity, IdentityResolver, Principal, Role};
pub use policy::{authorize, Action};
pub use token::{AuthToken, TokenDirectory};

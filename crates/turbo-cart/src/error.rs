//! Cart engine errors.

use thiserror::Error;
use turbo_commerce::cart::CartStatus;
use turbo_commerce::ids::{CartId, CartItemId, ProductId};
use turbo_commerce::CommerceError;

use crate::gateway::{DependencyTag, GatewayError};
use crate::store::StoreError;

/// Broad class of a failure, used by the boundary to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request itself is wrong.
    BadRequest,
    NotFound,
    /// The request conflicts with current state.
    Conflict,
    /// The caller does not own the resource.
    Forbidden,
    /// An external collaborator failed or timed out.
    Unavailable,
    Internal,
}

/// Errors returned by the cart engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    #[error("Cart not found: {0}")]
    CartNotFound(CartId),

    #[error("Cart item not found: {0}")]
    CartItemNotFound(CartItemId),

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityLimitExceeded { requested: i64, max: i64 },

    #[error("Insufficient stock for {product_id}: {available} available, {requested} requested")]
    InsufficientStock {
        product_id: ProductId,
        available: i64,
        requested: i64,
    },

    #[error("Coupon {code} rejected: {reason}")]
    CouponValidationFailed { code: String, reason: String },

    /// The cart or line belongs to someone else.
    #[error("Not authorized to access {0}")]
    Unauthorized(String),

    #[error("Cart {cart_id} is {status}")]
    CartNotActive { cart_id: CartId, status: CartStatus },

    #[error("Dependency {dependency} unavailable: {reason}")]
    DependencyUnavailable {
        dependency: DependencyTag,
        reason: String,
    },

    #[error("Storage error: {0}")]
    Storage(StoreError),

    #[error(transparent)]
    Domain(CommerceError),
}

impl CartError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CartError::CartNotFound(_)
            | CartError::CartItemNotFound(_)
            | CartError::ProductNotFound(_) => ErrorKind::NotFound,
            CartError::InvalidQuantity(_)
            | CartError::QuantityLimitExceeded { .. }
            | CartError::CouponValidationFailed { .. } => ErrorKind::BadRequest,
            CartError::InsufficientStock { .. } | CartError::CartNotActive { .. } => {
                ErrorKind::Conflict
            }
            CartError::Unauthorized(_) => ErrorKind::Forbidden,
            CartError::DependencyUnavailable { .. } => ErrorKind::Unavailable,
            CartError::Storage(StoreError::DuplicateOwner(_))
            | CartError::Storage(StoreError::DuplicateLine(_)) => ErrorKind::Conflict,
            CartError::Storage(_) => ErrorKind::Internal,
            CartError::Domain(CommerceError::InvalidQuantity(_))
            | CartError::Domain(CommerceError::QuantityExceedsLimit { .. })
            | CartError::Domain(CommerceError::InvalidCouponCode(_)) => ErrorKind::BadRequest,
            CartError::Domain(CommerceError::CurrencyMismatch { .. }) => ErrorKind::Conflict,
            CartError::Domain(_) => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for CartError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CartNotFound(id) => CartError::CartNotFound(id),
            StoreError::ItemNotFound(id) => CartError::CartItemNotFound(id),
            StoreError::CartNotActive { cart_id, status } => {
                CartError::CartNotActive { cart_id, status }
            }
            StoreError::Domain(e) => CartError::from(e),
            other => CartError::Storage(other),
        }
    }
}

impl From<CommerceError> for CartError {
    fn from(err: CommerceError) -> Self {
        match err {
            CommerceError::InvalidQuantity(q) => CartError::InvalidQuantity(q),
            CommerceError::QuantityExceedsLimit { requested, max } => {
                CartError::QuantityLimitExceeded { requested, max }
            }
            other => CartError::Domain(other),
        }
    }
}

impl From<GatewayError> for CartError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::ProductNotFound(id) => CartError::ProductNotFound(id),
            GatewayError::Rejected(reason) => CartError::CouponValidationFailed {
                code: String::new(),
                reason,
            },
            GatewayError::Timeout { dependency, after } => CartError::DependencyUnavailable {
                dependency,
                reason: format!("timed out after {}ms", after.as_millis()),
            },
            GatewayError::Unavailable { dependency, reason } => {
                CartError::DependencyUnavailable { dependency, reason }
            }
        }
    }
}

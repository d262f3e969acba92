//! Commerce error types.

use crate::cart::CartStatus;
use thiserror::Error;

/// Errors raised by the pure cart domain model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommerceError {
    /// Quantity is not a positive integer.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    /// Quantity exceeds the line's maximum.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityExceedsLimit { requested: i64, max: i64 },

    /// Currency mismatch.
    #[error("Currency mismatch: expected {expected}, got {got}")]
    CurrencyMismatch { expected: String, got: String },

    /// Arithmetic overflow.
    #[error("Arithmetic overflow in money calculation")]
    Overflow,

    /// Cart status cannot move from `from` to `to`.
    #[error("Invalid cart status transition from {from} to {to}")]
    InvalidStatusTransition { from: CartStatus, to: CartStatus },

    /// Coupon code is empty or malformed.
    #[error("Invalid coupon code: {0:?}")]
    InvalidCouponCode(String),
}

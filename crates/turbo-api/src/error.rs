//! Boundary errors and their wire codes.

use std::time::Duration;

use http::StatusCode;
use thiserror::Error;
use turbo_auth::AuthError;
use turbo_cart::{CartError, ErrorKind};

/// Message returned in place of internal error details.
pub const INTERNAL_MESSAGE: &str = "An internal error occurred";

/// Errors surfaced by the request boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request could not be parsed or has blank fields.
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// The caller could not be identified.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// The caller is known but may not perform the action.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Rate limit exceeded, retry in {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Stable error code for the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MalformedRequest(_) => "MALFORMED_REQUEST",
            ApiError::Unauthenticated(_) => "UNAUTHENTICATED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::RateLimited { .. } => "RATE_LIMITED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
            ApiError::Cart(err) => match err {
                CartError::CartNotFound(_) => "CART_NOT_FOUND",
                CartError::CartItemNotFound(_) => "CART_ITEM_NOT_FOUND",
                CartError::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
                CartError::InvalidQuantity(_) => "INVALID_QUANTITY",
                CartError::QuantityLimitExceeded { .. } => "QUANTITY_LIMIT_EXCEEDED",
                CartError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
                CartError::CouponValidationFailed { .. } => "COUPON_VALIDATION_FAILED",
                CartError::Unauthorized(_) => "UNAUTHORIZED",
                CartError::CartNotActive { .. } => "CART_NOT_ACTIVE",
                CartError::DependencyUnavailable { .. } => "DEPENDENCY_UNAVAILABLE",
                other => match other.kind() {
                    ErrorKind::BadRequest => "VALIDATION_ERROR",
                    ErrorKind::Conflict => "CONFLICT",
                    _ => "INTERNAL_ERROR",
                },
            },
        }
    }

    /// HTTP status for the error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Cart(err) => match err.kind() {
                ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Forbidden => StatusCode::FORBIDDEN,
                ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Check if this is a server-side failure whose details stay private.
    pub fn is_internal(&self) -> bool {
        self.status() == StatusCode::INTERNAL_SERVER_ERROR
    }

    /// Message safe to return to the caller.
    pub fn public_message(&self) -> String {
        if self.is_internal() {
            INTERNAL_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Internal(detail) => ApiError::Internal(detail),
            e if e.is_permission_error() => ApiError::Forbidden(e.to_string()),
            e => ApiError::Unauthenticated(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::MalformedRequest(err.to_string())
    }
}

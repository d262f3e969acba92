//! Contracts for the external collaborators the engine consults.
//!
//! - [`AvailabilityGateway`]: current price, stock and active flag of a product
//! - [`CouponValidator`]: coupon eligibility and discount value
//!
//! Every call goes through [`call_with_timeout`]; an expired call is a
//! dependency failure, never a hang.

mod memory;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use turbo_commerce::cart::{Cart, CouponCode, DiscountValue, ItemKey};
use turbo_commerce::ids::ProductId;
use turbo_commerce::money::Money;

pub use memory::{CouponRule, InMemoryCatalog, InMemoryCoupons};

/// External dependency categories, each with its own default timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyTag {
    /// Price/stock/availability lookups.
    Inventory,
    /// Coupon eligibility.
    Coupons,
}

impl DependencyTag {
    /// Get the default timeout for this dependency type.
    pub fn default_timeout(&self) -> Duration {
        match self {
            Self::Inventory => Duration::from_millis(150),
            Self::Coupons => Duration::from_millis(200),
        }
    }

    /// Get the name of this dependency.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Inventory => "inventory",
            Self::Coupons => "coupons",
        }
    }
}

impl std::fmt::Display for DependencyTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Point-in-time availability of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAvailability {
    /// Current unit price.
    pub price: Money,
    /// Units available.
    pub stock: i64,
    /// Whether the product is still sold.
    pub is_active: bool,
    /// Per-line bound, if the catalog sets one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_quantity: Option<i64>,
}

impl ProductAvailability {
    /// Units that can actually be sold now.
    pub fn sellable(&self) -> i64 {
        if self.is_active {
            self.stock.max(0)
        } else {
            0
        }
    }
}

/// Discount granted by the coupon collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponGrant {
    pub description: String,
    pub value: DiscountValue,
}

/// Errors from external collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The catalog does not know the product.
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    /// The coupon service declined the code.
    #[error("coupon rejected: {0}")]
    Rejected(String),

    /// The call did not complete in time.
    #[error("{dependency} timed out after {after:?}")]
    Timeout {
        dependency: DependencyTag,
        after: Duration,
    },

    /// The collaborator failed.
    #[error("{dependency} unavailable: {reason}")]
    Unavailable {
        dependency: DependencyTag,
        reason: String,
    },
}

/// Product availability lookup.
#[async_trait]
pub trait AvailabilityGateway: Send + Sync {
    /// Look up a product, or one of its variants.
    async fn lookup(&self, key: &ItemKey) -> Result<ProductAvailability, GatewayError>;
}

/// Coupon eligibility check.
#[async_trait]
pub trait CouponValidator: Send + Sync {
    /// Decide whether `code` applies to `cart`.
    async fn validate(&self, code: &CouponCode, cart: &Cart) -> Result<CouponGrant, GatewayError>;
}

/// Await a collaborator call, failing with [`GatewayError::Timeout`] after `timeout`.
pub async fn call_with_timeout<T, F>(
    dependency: DependencyTag,
    timeout: Duration,
    call: F,
) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout {
            dependency,
            after: timeout,
        }),
    }
}

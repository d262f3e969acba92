//! Shopping cart domain types for TurboCommerce.
//!
//! This crate holds the synchronous, I/O-free part of the cart engine:
//!
//! - **Ids**: newtype identifiers for carts, lines, products, users, sessions
//! - **Money**: fixed-point amounts in minor units
//! - **Cart**: carts, lines, owners, lifecycle status
//! - **Pricing**: totals derivation from lines, coupons and pricing rules
//!
//! # Example
//!
//! ```rust,ignore
//! use turbo_commerce::prelude::*;
//!
//! let totals = calculate_totals(&cart.items, &cart.applied_coupons, cart.currency, &rules)?;
//! assert!(totals.is_consistent());
//! println!("Total: {}", totals.total_amount);
//! ```

pub mod cart;
pub mod error;
pub mod ids;
pub mod money;

pub use error::CommerceError;
pub use ids::*;
pub use money::{Currency, Money};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::CommerceError;
    pub use crate::ids::*;
    pub use crate::money::{Currency, Money};

    pub use crate::cart::{
        calculate_totals, AppliedCoupon, Cart, CartItem, CartOwner, CartStatus, CartTotals,
        CheckoutValidation, CouponCode, DiscountValue, ItemKey, ItemSnapshot, PricingRules,
    };
}

//! Shopping cart module.
//!
//! Contains types for carts, line items, coupons, totals and checkout
//! validation.

mod cart;
mod discount;
mod pricing;
mod validation;

pub use cart::{
    combine_quantities, Cart, CartItem, CartOwner, CartStatus, Dimensions, ItemKey, ItemSnapshot,
    MAX_QUANTITY_PER_ITEM,
};
pub use discount::{AppliedCoupon, CouponCode, DiscountValue};
pub use pricing::{calculate_totals, CartTotals, PricingRules};
pub use validation::{CheckoutValidation, EMPTY_CART_MESSAGE};

//! Cart totals derivation.
//!
//! Totals are a pure function of the active lines, the applied coupons and
//! the pricing rules. Nothing else may set them.

use crate::cart::{AppliedCoupon, CartItem};
use crate::error::CommerceError;
use crate::money::{Currency, Money};
use serde::{Deserialize, Serialize};

/// Tax and shipping rules applied on top of the subtotal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRules {
    /// Tax rate in basis points, applied to the discounted subtotal.
    #[serde(default)]
    pub tax_rate_bps: u32,
    /// Flat shipping fee in minor units.
    #[serde(default)]
    pub flat_shipping_cents: i64,
    /// Discounted subtotal at or above which shipping is free.
    #[serde(default)]
    pub free_shipping_threshold_cents: Option<i64>,
}

/// Complete totals breakdown for a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    /// Sum of line totals.
    pub subtotal: Money,
    /// Coupon discounts, capped at the subtotal.
    pub discount_amount: Money,
    /// Tax on the discounted subtotal.
    pub tax_amount: Money,
    /// Shipping fee.
    pub shipping_amount: Money,
    /// subtotal - discount + tax + shipping.
    pub total_amount: Money,
    /// Sum of quantities.
    pub total_items: i64,
    /// Number of distinct lines.
    pub item_count: usize,
}

impl CartTotals {
    /// All-zero totals for an empty cart.
    pub fn zero(currency: Currency) -> Self {
        Self {
            subtotal: Money::zero(currency),
            discount_amount: Money::zero(currency),
            tax_amount: Money::zero(currency),
            shipping_amount: Money::zero(currency),
            total_amount: Money::zero(currency),
            total_items: 0,
            item_count: 0,
        }
    }

    /// Check the total identity holds.
    pub fn is_consistent(&self) -> bool {
        let expected = self.subtotal.amount_cents - self.discount_amount.amount_cents
            + self.tax_amount.amount_cents
            + self.shipping_amount.amount_cents;
        self.total_amount.amount_cents == expected
    }
}

/// Derive cart totals from its lines and coupons.
pub fn calculate_totals(
    items: &[CartItem],
    coupons: &[AppliedCoupon],
    currency: Currency,
    rules: &PricingRules,
) -> Result<CartTotals, CommerceError> {
    if items.is_empty() {
        return Ok(CartTotals::zero(currency));
    }

    let line_totals = items
        .iter()
        .map(CartItem::line_total)
        .collect::<Result<Vec<_>, _>>()?;
    let subtotal = Money::try_sum(line_totals.iter(), currency)?;

    let mut discount_amount = Money::zero(currency);
    for coupon in coupons {
        let amount = coupon.value.calculate(&subtotal)?;
        discount_amount = discount_amount.try_add(&amount)?;
    }
    let discount_amount = discount_amount.try_min(&subtotal)?;
    let discounted = subtotal.try_subtract(&discount_amount)?;

    let tax_amount = discounted.basis_points(rules.tax_rate_bps)?;

    let waived = coupons.iter().any(|c| c.value.waives_shipping());
    let over_threshold = rules
        .free_shipping_threshold_cents
        .is_some_and(|threshold| discounted.amount_cents >= threshold);
    let shipping_amount = if waived || over_threshold {
        Money::zero(currency)
    } else {
        Money::new(rules.flat_shipping_cents, currency)
    };

    let total_amount = discounted
        .try_add(&tax_amount)?
        .try_add(&shipping_amount)?;

    let total_items = items
        .iter()
        .try_fold(0_i64, |acc, i| acc.checked_add(i.quantity))
        .ok_or(CommerceError::Overflow)?;

    Ok(CartTotals {
        subtotal,
        discount_amount,
        tax_amount,
        shipping_amount,
        total_amount,
        total_items,
        item_count: items.len(),
    })
}

//! Coupon codes and discount values.

use crate::error::CommerceError;
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A normalised coupon code.
///
/// Codes are trimmed and upper-cased, so "save10" and " SAVE10 " are the
/// same membership key in a cart's coupon set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CouponCode(String);

impl CouponCode {
    /// Normalise and validate a raw code.
    pub fn parse(raw: &str) -> Result<Self, CommerceError> {
        let code = raw.trim().to_uppercase();
        if code.is_empty() || code.len() > 64 || code.chars().any(char::is_whitespace) {
            return Err(CommerceError::InvalidCouponCode(raw.to_string()));
        }
        Ok(Self(code))
    }

    /// Get the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CouponCode {
    type Error = CommerceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CouponCode::parse(&value)
    }
}

impl From<CouponCode> for String {
    fn from(code: CouponCode) -> Self {
        code.0
    }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Value of a discount granted by the coupon service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscountValue {
    /// Percentage off the subtotal, in basis points (1000 = 10%).
    Percentage { basis_points: u32 },
    /// Fixed amount off.
    Fixed { amount: Money },
    /// Shipping is waived.
    FreeShipping,
}

impl DiscountValue {
    /// Calculate the discount amount for a given subtotal.
    ///
    /// Never exceeds the subtotal.
    pub fn calculate(&self, subtotal: &Money) -> Result<Money, CommerceError> {
        match self {
            DiscountValue::Percentage { basis_points } => {
                let amount = subtotal.basis_points(*basis_points)?;
                subtotal.try_min(&amount)
            }
            DiscountValue::Fixed { amount } => subtotal.try_min(amount),
            DiscountValue::FreeShipping => Ok(Money::zero(subtotal.currency)),
        }
    }

    /// Check if this discount waives shipping.
    pub fn waives_shipping(&self) -> bool {
        matches!(self, DiscountValue::FreeShipping)
    }
}

/// A coupon that has been applied to a cart.
///
/// Only the discount rule is stored; the amount is re-derived from the
/// current subtotal whenever totals are recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedCoupon {
    /// The normalised code.
    pub code: CouponCode,
    /// Description for display.
    pub description: String,
    /// Discount rule.
    pub value: DiscountValue,
    pub applied_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;

    #[test]
    fn test_coupon_code_normalised() {
        let a = CouponCode::parse(" save10 ").unwrap();
        let b = CouponCode::parse("SAVE10").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "SAVE10");
    }

    #[test]
    fn test_coupon_code_rejects_blank() {
        assert!(CouponCode::parse("   ").is_err());
        assert!(CouponCode::parse("TWO WORDS").is_err());
    }

    #[test]
    fn test_percentage_discount() {
        let value = DiscountValue::Percentage { basis_points: 1000 };
        let subtotal = Money::new(10000, Currency::USD);
        assert_eq!(value.calculate(&subtotal).unwrap().amount_cents, 1000);
    }

    #[test]
    fn test_fixed_discount_capped() {
        let value = DiscountValue::Fixed {
            amount: Money::new(10000, Currency::USD),
        };
        let subtotal = Money::new(5000, Currency::USD);
        assert_eq!(value.calculate(&subtotal).unwrap().amount_cents, 5000);
    }

    #[test]
    fn test_free_shipping_has_no_amount() {
        let subtotal = Money::new(5000, Currency::USD);
        let value = DiscountValue::FreeShipping;
        assert!(value.calculate(&subtotal).unwrap().is_zero());
        assert!(value.waives_shipping());
    }
}

//! Checkout readiness result.

use serde::{Deserialize, Serialize};

/// Reason reported for a cart with no active lines.
pub const EMPTY_CART_MESSAGE: &str = "Cart is empty";

/// Outcome of checking a cart before checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutValidation {
    pub is_valid: bool,
    /// Human-readable problems, one per offending line.
    pub errors: Vec<String>,
}

impl CheckoutValidation {
    /// Build a result from the collected errors.
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// Result for an empty cart.
    pub fn empty_cart() -> Self {
        Self::from_errors(vec![EMPTY_CART_MESSAGE.to_string()])
    }

    /// Message for a line whose product is no longer sold.
    pub fn out_of_stock(name: &str) -> String {
        format!("{name} is out of stock")
    }

    /// Message for a line that asks for more than is available.
    pub fn insufficient_stock(name: &str, available: i64, requested: i64) -> String {
        format!("{name}: only {available} available, {requested} requested")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_cart_is_invalid() {
        let v = CheckoutValidation::empty_cart();
        assert!(!v.is_valid);
        assert_eq!(v.errors, vec![EMPTY_CART_MESSAGE.to_string()]);
    }

    #[test]
    fn test_no_errors_is_valid() {
        assert!(CheckoutValidation::from_errors(Vec::new()).is_valid);
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            CheckoutValidation::insufficient_stock("Mug", 3, 5),
            "Mug: only 3 available, 5 requested"
        );
        assert_eq!(CheckoutValidation::out_of_stock("Mug"), "Mug is out of stock");
    }
}

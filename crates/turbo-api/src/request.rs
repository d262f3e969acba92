//! Typed cart requests.

use serde::{Deserialize, Serialize};
use turbo_auth::Action;
use turbo_commerce::cart::ItemSnapshot;
use turbo_commerce::ids::{CartId, CartItemId, ProductId, SessionId, VariantId};

use crate::ApiError;

/// One operation against the cart service.
///
/// Serialized with an `op` tag, e.g.
/// `{"op": "add_item", "product_id": "sku-1", "quantity": 2}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CartRequest {
    /// The caller's cart, created on first use.
    GetCart,
    AddItem {
        product_id: ProductId,
        #[serde(default)]
        variant_id: Option<VariantId>,
        quantity: i64,
        #[serde(default)]
        snapshot: ItemSnapshot,
    },
    /// Set a quantity; zero removes the line.
    UpdateItemQuantity {
        cart_id: CartId,
        item_id: CartItemId,
        quantity: i64,
    },
    RemoveItem {
        cart_id: CartId,
        item_id: CartItemId,
    },
    SaveForLater {
        cart_id: CartId,
        item_id: CartItemId,
    },
    MoveToCart {
        cart_id: CartId,
        saved_item_id: CartItemId,
        #[serde(default)]
        quantity: Option<i64>,
    },
    ClearCart {
        cart_id: CartId,
    },
    ApplyCoupon {
        cart_id: CartId,
        coupon_code: String,
    },
    RemoveCoupon {
        cart_id: CartId,
        coupon_code: String,
    },
    ValidateCheckout,
    CalculateTotals,
    /// Fold the given guest session's cart into the caller's cart.
    MergeGuestCart {
        session_id: SessionId,
    },
    MarkConverted {
        cart_id: CartId,
    },
    Statistics,
    CleanupExpired,
}

impl CartRequest {
    /// Parse a request from JSON.
    pub fn from_json(body: &str) -> Result<Self, ApiError> {
        let request: CartRequest = serde_json::from_str(body)?;
        request.validate()?;
        Ok(request)
    }

    /// Operation name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            CartRequest::GetCart => "get_cart",
            CartRequest::AddItem { .. } => "add_item",
            CartRequest::UpdateItemQuantity { .. } => "update_item_quantity",
            CartRequest::RemoveItem { .. } => "remove_item",
            CartRequest::SaveForLater { .. } => "save_for_later",
            CartRequest::MoveToCart { .. } => "move_to_cart",
            CartRequest::ClearCart { .. } => "clear_cart",
            CartRequest::ApplyCoupon { .. } => "apply_coupon",
            CartRequest::RemoveCoupon { .. } => "remove_coupon",
            CartRequest::ValidateCheckout => "validate_checkout",
            CartRequest::CalculateTotals => "calculate_totals",
            CartRequest::MergeGuestCart { .. } => "merge_guest_cart",
            CartRequest::MarkConverted { .. } => "mark_converted",
            CartRequest::Statistics => "statistics",
            CartRequest::CleanupExpired => "cleanup_expired",
        }
    }

    /// Capability the caller needs.
    pub fn action(&self) -> Action {
        match self {
            CartRequest::GetCart
            | CartRequest::ValidateCheckout
            | CartRequest::CalculateTotals => Action::ViewCart,
            CartRequest::MergeGuestCart { .. } => Action::MergeGuestCart,
            CartRequest::MarkConverted { .. } => Action::ConvertCart,
            CartRequest::Statistics => Action::ViewStatistics,
            CartRequest::CleanupExpired => Action::CleanupExpired,
            _ => Action::MutateCart,
        }
    }

    /// Reject requests with blank identifiers or codes.
    ///
    /// Quantity rules belong to the engine.
    pub fn validate(&self) -> Result<(), ApiError> {
        match self {
            CartRequest::AddItem { product_id, variant_id, .. } => {
                require("product_id", product_id.is_blank())?;
                require("variant_id", variant_id.as_ref().is_some_and(|v| v.is_blank()))
            }
            CartRequest::UpdateItemQuantity { cart_id, item_id, .. }
            | CartRequest::RemoveItem { cart_id, item_id }
            | CartRequest::SaveForLater { cart_id, item_id } => {
                require("cart_id", cart_id.is_blank())?;
                require("item_id", item_id.is_blank())
            }
            CartRequest::MoveToCart { cart_id, saved_item_id, .. } => {
                require("cart_id", cart_id.is_blank())?;
                require("saved_item_id", saved_item_id.is_blank())
            }
            CartRequest::ApplyCoupon { cart_id, coupon_code }
            | CartRequest::RemoveCoupon { cart_id, coupon_code } => {
                require("cart_id", cart_id.is_blank())?;
                require("coupon_code", coupon_code.trim().is_empty())
            }
            CartRequest::ClearCart { cart_id } | CartRequest::MarkConverted { cart_id } => {
                require("cart_id", cart_id.is_blank())
            }
            CartRequest::MergeGuestCart { session_id } => {
                require("session_id", session_id.is_blank())
            }
            CartRequest::GetCart
            | CartRequest::ValidateCheckout
            | CartRequest::CalculateTotals
            | CartRequest::Statistics
            | CartRequest::CleanupExpired => Ok(()),
        }
    }
}

fn require(field: &str, blank: bool) -> Result<(), ApiError> {
    if blank {
        return Err(ApiError::MalformedRequest(format!("{field} must not be blank")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add_item() {
        let request =
            CartRequest::from_json(r#"{"op": "add_item", "product_id": "sku-1", "quantity": 2}"#)
                .unwrap();
        assert_eq!(
            request,
            CartRequest::AddItem {
                product_id: ProductId::new("sku-1"),
                variant_id: None,
                quantity: 2,
                snapshot: ItemSnapshot::default(),
            }
        );
        assert_eq!(request.action(), Action::MutateCart);
        assert_eq!(request.name(), "add_item");
    }

    #[test]
    fn test_blank_ids_are_malformed() {
        let err = CartRequest::from_json(
            r#"{"op": "remove_item", "cart_id": "c1", "item_id": "  "}"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ApiError::MalformedRequest("item_id must not be blank".into())
        );

        let err = CartRequest::from_json(
            r#"{"op": "apply_coupon", "cart_id": "c1", "coupon_code": ""}"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), "MALFORMED_REQUEST");
    }

    #[test]
    fn test_bad_json_is_malformed() {
        assert_eq!(CartRequest::from_json("{").unwrap_err().code(), "MALFORMED_REQUEST");
        assert_eq!(
            CartRequest::from_json(r#"{"op": "teleport"}"#).unwrap_err().code(),
            "MALFORMED_REQUEST"
        );
        // Quantities must be integers.
        assert!(CartRequest::from_json(
            r#"{"op": "add_item", "product_id": "p1", "quantity": 1.5}"#
        )
        .is_err());
    }

    #[test]
    fn test_admin_actions() {
        assert_eq!(CartRequest::Statistics.action(), Action::ViewStatistics);
        assert_eq!(CartRequest::CleanupExpired.action(), Action::CleanupExpired);
        assert_eq!(
            CartRequest::MergeGuestCart {
                session_id: SessionId::new("s1")
            }
            .action(),
            Action::MergeGuestCart
        );
    }
}

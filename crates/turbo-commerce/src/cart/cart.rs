//! Cart and line item types.

use crate::cart::{AppliedCoupon, CartTotals, CouponCode};
use crate::error::CommerceError;
use crate::ids::{CartId, CartItemId, ProductId, SessionId, UserId, VariantId};
use crate::money::{Currency, Money};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum quantity allowed per line item when the catalog gives no bound.
pub const MAX_QUANTITY_PER_ITEM: i64 = 9999;

/// Lifecycle status of a cart.
///
/// `Active` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CartStatus {
    /// Open for mutation.
    Active,
    /// Source of a guest-to-user merge.
    Merged,
    /// Checked out.
    Converted,
    /// Reclaimed after inactivity.
    Expired,
}

impl CartStatus {
    /// Get status as string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CartStatus::Active => "ACTIVE",
            CartStatus::Merged => "MERGED",
            CartStatus::Converted => "CONVERTED",
            CartStatus::Expired => "EXPIRED",
        }
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CartStatus::Active)
    }

    /// Validate a transition, returning the new status.
    pub fn transition(self, next: CartStatus) -> Result<CartStatus, CommerceError> {
        match (self, next) {
            (CartStatus::Active, CartStatus::Merged)
            | (CartStatus::Active, CartStatus::Converted)
            | (CartStatus::Active, CartStatus::Expired) => Ok(next),
            _ => Err(CommerceError::InvalidStatusTransition {
                from: self,
                to: next,
            }),
        }
    }
}

impl fmt::Display for CartStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single identity a cart belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CartOwner {
    /// Authenticated user.
    User(UserId),
    /// Anonymous session.
    Session(SessionId),
}

impl CartOwner {
    /// User ID if the owner is authenticated.
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            CartOwner::User(id) => Some(id),
            CartOwner::Session(_) => None,
        }
    }

    /// Session ID if the owner is a guest.
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            CartOwner::Session(id) => Some(id),
            CartOwner::User(_) => None,
        }
    }

    /// Check if the owner is an anonymous session.
    pub fn is_guest(&self) -> bool {
        matches!(self, CartOwner::Session(_))
    }
}

impl fmt::Display for CartOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CartOwner::User(id) => write!(f, "user:{id}"),
            CartOwner::Session(id) => write!(f, "session:{id}"),
        }
    }
}

/// Identity of a line within a cart: product plus optional variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
}

impl ItemKey {
    pub fn new(product_id: ProductId, variant_id: Option<VariantId>) -> Self {
        Self {
            product_id,
            variant_id,
        }
    }
}

/// Package dimensions in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length_mm: u32,
    pub width_mm: u32,
    pub height_mm: u32,
}

/// Display fields copied from the catalog when a line is created.
///
/// These are never refreshed from the live catalog, so a later catalog
/// edit does not silently change an existing cart line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    /// Product name.
    pub name: String,
    /// Stock keeping unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    /// Strike-through price shown next to the unit price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_price: Option<Money>,
    /// Shipping weight in grams.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_grams: Option<u32>,
    /// Package dimensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    /// Product image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// A line in the cart or in the saved-for-later list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    /// Unique line identifier.
    pub id: CartItemId,
    /// Product being purchased.
    pub product_id: ProductId,
    /// Variant, if the product has variants.
    pub variant_id: Option<VariantId>,
    /// Snapshot display fields.
    #[serde(flatten)]
    pub snapshot: ItemSnapshot,
    /// Unit price at the time the line was created or re-activated.
    pub unit_price: Money,
    /// Always positive.
    pub quantity: i64,
    /// Upper bound from the catalog at snapshot time.
    pub max_quantity: i64,
    /// Last known availability.
    pub is_available: bool,
    /// Human readable availability note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_message: Option<String>,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartItem {
    /// The product/variant key used to match lines.
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.product_id.clone(), self.variant_id.clone())
    }

    /// Check if this line is for the given product/variant.
    pub fn matches(&self, key: &ItemKey) -> bool {
        self.product_id == key.product_id && self.variant_id == key.variant_id
    }

    /// Unit price times quantity.
    pub fn line_total(&self) -> Result<Money, CommerceError> {
        self.unit_price.try_multiply(self.quantity)
    }
}

/// A shopping cart with its lines and derived totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    /// Unique cart identifier.
    pub id: CartId,
    /// Owning identity.
    pub owner: CartOwner,
    /// Lifecycle status.
    pub status: CartStatus,
    /// Cart currency.
    pub currency: Currency,
    /// Applied coupons, at most one per code.
    pub applied_coupons: Vec<AppliedCoupon>,
    /// Lines counted in totals, in insertion order.
    pub items: Vec<CartItem>,
    /// Lines parked for later, excluded from totals.
    pub saved_for_later: Vec<CartItem>,
    /// Derived totals.
    pub totals: CartTotals,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Inactivity deadline after which the cart may be reclaimed.
    pub expires_at: DateTime<Utc>,
}

impl Cart {
    /// Check if cart has no active lines.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Check if the cart accepts mutations.
    pub fn is_active(&self) -> bool {
        self.status == CartStatus::Active
    }

    /// Get an active line by ID.
    pub fn get_item(&self, item_id: &CartItemId) -> Option<&CartItem> {
        self.items.iter().find(|i| &i.id == item_id)
    }

    /// Get a saved line by ID.
    pub fn get_saved_item(&self, item_id: &CartItemId) -> Option<&CartItem> {
        self.saved_for_later.iter().find(|i| &i.id == item_id)
    }

    /// Get an active line by product/variant.
    pub fn get_item_by_key(&self, key: &ItemKey) -> Option<&CartItem> {
        self.items.iter().find(|i| i.matches(key))
    }

    /// Get a saved line by product/variant.
    pub fn get_saved_item_by_key(&self, key: &ItemKey) -> Option<&CartItem> {
        self.saved_for_later.iter().find(|i| i.matches(key))
    }

    /// Check if a coupon code is applied.
    pub fn has_coupon(&self, code: &CouponCode) -> bool {
        self.applied_coupons.iter().any(|c| &c.code == code)
    }
}

/// Combine two quantities for the same line, capped at `cap`.
///
/// Saturates instead of overflowing; the cap always wins.
pub fn combine_quantities(existing: i64, incoming: i64, cap: i64) -> i64 {
    existing.saturating_add(incoming).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        assert_eq!(
            CartStatus::Active.transition(CartStatus::Merged),
            Ok(CartStatus::Merged)
        );
        assert_eq!(
            CartStatus::Active.transition(CartStatus::Converted),
            Ok(CartStatus::Converted)
        );
        assert!(CartStatus::Merged.transition(CartStatus::Active).is_err());
        assert!(CartStatus::Expired.transition(CartStatus::Converted).is_err());
        assert!(CartStatus::Active.transition(CartStatus::Active).is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!CartStatus::Active.is_terminal());
        assert!(CartStatus::Merged.is_terminal());
        assert!(CartStatus::Converted.is_terminal());
        assert!(CartStatus::Expired.is_terminal());
    }

    #[test]
    fn test_owner_display() {
        let owner = CartOwner::User(UserId::new("u1"));
        assert_eq!(owner.to_string(), "user:u1");
        assert!(!owner.is_guest());

        let owner = CartOwner::Session(SessionId::new("s1"));
        assert_eq!(owner.to_string(), "session:s1");
        assert!(owner.is_guest());
    }

    #[test]
    fn test_combine_quantities_caps() {
        assert_eq!(combine_quantities(2, 1, 2), 2);
        assert_eq!(combine_quantities(1, 1, 5), 2);
        assert_eq!(combine_quantities(i64::MAX, 1, 10), 10);
    }

    #[test]
    fn test_key_matching_respects_variant() {
        let key = ItemKey::new(ProductId::new("p1"), Some(VariantId::new("red")));
        let other = ItemKey::new(ProductId::new("p1"), None);
        assert_ne!(key, other);
    }
}

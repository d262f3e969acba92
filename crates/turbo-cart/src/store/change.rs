//! Row-level changes applied to an assembled cart.

use chrono::{DateTime, Utc};
use turbo_commerce::cart::{AppliedCoupon, Cart, CartItem, CouponCode};
use turbo_commerce::ids::CartItemId;

use super::{ItemList, StoreError};

/// One step of a cart transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum CartChange {
    /// Add a new line to a list.
    InsertItem { list: ItemList, item: CartItem },
    /// Overwrite a line, found by id in either list.
    ReplaceItem(CartItem),
    /// Set the quantity of a line.
    SetQuantity { item_id: CartItemId, quantity: i64 },
    /// Remove a line from either list.
    RemoveItem(CartItemId),
    /// Remove every active line.
    ClearItems,
    /// Add a coupon unless the code is already applied.
    AddCoupon(AppliedCoupon),
    /// Remove a coupon if present.
    RemoveCoupon(CouponCode),
    ClearCoupons,
}

impl CartChange {
    /// Apply to an in-memory cart. On error the cart may be partly changed;
    /// callers work on a copy and discard it.
    pub(crate) fn apply(self, cart: &mut Cart, now: DateTime<Utc>) -> Result<(), StoreError> {
        match self {
            CartChange::InsertItem { list, item } => {
                check_quantity(item.quantity)?;
                if find(cart, &item.id).is_some() {
                    return Err(StoreError::DuplicateItem(item.id));
                }
                let lines = match list {
                    ItemList::Active => &mut cart.items,
                    ItemList::Saved => &mut cart.saved_for_later,
                };
                if lines.iter().any(|line| line.matches(&item.key())) {
                    return Err(StoreError::DuplicateLine(item.product_id));
                }
                lines.push(item);
            }
            CartChange::ReplaceItem(item) => {
                check_quantity(item.quantity)?;
                let slot = find_mut(cart, &item.id)
                    .ok_or_else(|| StoreError::ItemNotFound(item.id.clone()))?;
                *slot = item;
            }
            CartChange::SetQuantity { item_id, quantity } => {
                check_quantity(quantity)?;
                let slot = find_mut(cart, &item_id).ok_or(StoreError::ItemNotFound(item_id))?;
                slot.quantity = quantity;
                slot.updated_at = now;
            }
            CartChange::RemoveItem(item_id) => {
                let before = cart.items.len() + cart.saved_for_later.len();
                cart.items.retain(|line| line.id != item_id);
                cart.saved_for_later.retain(|line| line.id != item_id);
                if cart.items.len() + cart.saved_for_later.len() == before {
                    return Err(StoreError::ItemNotFound(item_id));
                }
            }
            CartChange::ClearItems => cart.items.clear(),
            CartChange::AddCoupon(coupon) => {
                if !cart.has_coupon(&coupon.code) {
                    cart.applied_coupons.push(coupon);
                }
            }
            CartChange::RemoveCoupon(code) => cart.applied_coupons.retain(|c| c.code != code),
            CartChange::ClearCoupons => cart.applied_coupons.clear(),
        }
        Ok(())
    }
}

fn check_quantity(quantity: i64) -> Result<(), StoreError> {
    if quantity <= 0 {
        return Err(StoreError::InvalidRow(format!(
            "quantity must be positive, got {quantity}"
        )));
    }
    Ok(())
}

fn find<'a>(cart: &'a Cart, item_id: &CartItemId) -> Option<&'a CartItem> {
    cart.get_item(item_id).or_else(|| cart.get_saved_item(item_id))
}

fn find_mut<'a>(cart: &'a mut Cart, item_id: &CartItemId) -> Option<&'a mut CartItem> {
    cart.items
        .iter_mut()
        .chain(cart.saved_for_later.iter_mut())
        .find(|line| &line.id == item_id)
}

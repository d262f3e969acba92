//! Line operations: add, update, remove, clear, save for later, move back.

use tracing::{debug, info};
use turbo_commerce::cart::{combine_quantities, Cart, CartItem, CartOwner};
use turbo_commerce::ids::{CartId, CartItemId};

use super::{ensure_currency, refresh_availability, AddItemRequest, CartEngine};
use crate::gateway::ProductAvailability;
use crate::store::{CartChange, ItemList};
use crate::CartError;

impl CartEngine {
    /// Add a product to the owner's cart, creating the cart if needed.
    ///
    /// An existing line for the same product and variant is incremented,
    /// capped at available stock and the line's maximum.
    pub async fn add_item(
        &self,
        owner: &CartOwner,
        request: AddItemRequest,
    ) -> Result<Cart, CartError> {
        if request.quantity <= 0 {
            return Err(CartError::InvalidQuantity(request.quantity));
        }

        let (_guard, cart) = self.lock_current(owner).await?;
        let key = request.key();
        let availability = self.lookup(&key).await?;
        let available = availability.sellable();
        if request.quantity > available {
            return Err(CartError::InsufficientStock {
                product_id: request.product_id,
                available,
                requested: request.quantity,
            });
        }
        ensure_currency(&cart, &availability.price)?;

        let ctx = self.write_context();
        let max = self.max_quantity(&availability);
        let cap = available.min(max);
        let change = match cart.get_item_by_key(&key) {
            Some(existing) => {
                let mut line = existing.clone();
                line.quantity = combine_quantities(existing.quantity, request.quantity, cap);
                line.max_quantity = max;
                refresh_availability(&mut line, ctx.now);
                CartChange::ReplaceItem(line)
            }
            None => {
                let mut snapshot = request.snapshot;
                if snapshot.name.is_empty() {
                    snapshot.name = key.product_id.to_string();
                }
                let line = CartItem {
                    id: CartItemId::generate(),
                    product_id: key.product_id,
                    variant_id: key.variant_id,
                    snapshot,
                    unit_price: availability.price,
                    quantity: request.quantity.min(cap),
                    max_quantity: max,
                    is_available: true,
                    availability_message: None,
                    added_at: ctx.now,
                    updated_at: ctx.now,
                };
                CartChange::InsertItem {
                    list: ItemList::Active,
                    item: line,
                }
            }
        };

        let cart = self.store.apply_changes(&cart.id, vec![change], &ctx).await?;
        debug!(cart_id = %cart.id, product_id = %request.product_id, quantity = request.quantity, "item added");
        Ok(cart)
    }

    /// Set a line's quantity. Zero removes the line.
    pub async fn update_item_quantity(
        &self,
        owner: &CartOwner,
        cart_id: &CartId,
        item_id: &CartItemId,
        quantity: i64,
    ) -> Result<Cart, CartError> {
        if quantity < 0 {
            return Err(CartError::InvalidQuantity(quantity));
        }

        let (_guard, cart) = self.lock_owned(owner, cart_id).await?;
        let ctx = self.write_context();

        let Some(line) = cart.get_item(item_id) else {
            if cart.get_saved_item(item_id).is_some() {
                return if quantity == 0 {
                    Ok(self.store.remove_item(cart_id, item_id, &ctx).await?)
                } else {
                    Err(CartError::CartItemNotFound(item_id.clone()))
                };
            }
            return match self.missing_item(cart_id, item_id).await {
                CartError::CartItemNotFound(_) if quantity == 0 => Ok(cart),
                err => Err(err),
            };
        };

        if quantity == 0 {
            let cart = self.store.remove_item(cart_id, item_id, &ctx).await?;
            debug!(cart_id = %cart_id, item_id = %item_id, "item removed by zero quantity");
            return Ok(cart);
        }
        if quantity > line.max_quantity {
            return Err(CartError::QuantityLimitExceeded {
                requested: quantity,
                max: line.max_quantity,
            });
        }

        let availability = self.lookup(&line.key()).await?;
        let available = availability.sellable();
        if quantity > available {
            return Err(CartError::InsufficientStock {
                product_id: line.product_id.clone(),
                available,
                requested: quantity,
            });
        }

        let mut updated = line.clone();
        updated.quantity = quantity;
        refresh_availability(&mut updated, ctx.now);
        let cart = self
            .store
            .apply_changes(cart_id, vec![CartChange::ReplaceItem(updated)], &ctx)
            .await?;
        debug!(cart_id = %cart_id, item_id = %item_id, quantity, "item quantity updated");
        Ok(cart)
    }

    /// Remove a line from the cart or the saved list.
    pub async fn remove_item(
        &self,
        owner: &CartOwner,
        cart_id: &CartId,
        item_id: &CartItemId,
    ) -> Result<Cart, CartError> {
        let (_guard, cart) = self.lock_owned(owner, cart_id).await?;
        if cart.get_item(item_id).is_none() && cart.get_saved_item(item_id).is_none() {
            return Err(self.missing_item(cart_id, item_id).await);
        }

        let ctx = self.write_context();
        let cart = self.store.remove_item(cart_id, item_id, &ctx).await?;
        debug!(cart_id = %cart_id, item_id = %item_id, "item removed");
        Ok(cart)
    }

    /// Drop every active line and coupon. Saved lines stay.
    pub async fn clear_cart(&self, owner: &CartOwner, cart_id: &CartId) -> Result<Cart, CartError> {
        let (_guard, cart) = self.lock_owned(owner, cart_id).await?;
        if cart.items.is_empty() && cart.applied_coupons.is_empty() {
            return Ok(cart);
        }

        let ctx = self.write_context();
        let cart = self
            .store
            .apply_changes(
                cart_id,
                vec![CartChange::ClearItems, CartChange::ClearCoupons],
                &ctx,
            )
            .await?;
        info!(cart_id = %cart_id, "cart cleared");
        Ok(cart)
    }

    /// Move an active line to the saved list.
    pub async fn save_for_later(
        &self,
        owner: &CartOwner,
        cart_id: &CartId,
        item_id: &CartItemId,
    ) -> Result<Cart, CartError> {
        let (_guard, cart) = self.lock_owned(owner, cart_id).await?;
        if cart.get_saved_item(item_id).is_some() {
            return Ok(cart);
        }
        let Some(line) = cart.get_item(item_id) else {
            return Err(self.missing_item(cart_id, item_id).await);
        };

        let ctx = self.write_context();
        let mut changes = vec![CartChange::RemoveItem(line.id.clone())];
        match cart.get_saved_item_by_key(&line.key()) {
            Some(saved) => {
                let mut merged = saved.clone();
                let cap = saved.max_quantity.max(line.max_quantity);
                merged.quantity = combine_quantities(saved.quantity, line.quantity, cap);
                merged.updated_at = ctx.now;
                changes.push(CartChange::ReplaceItem(merged));
            }
            None => {
                let mut parked = line.clone();
                parked.updated_at = ctx.now;
                changes.push(CartChange::InsertItem {
                    list: ItemList::Saved,
                    item: parked,
                });
            }
        }

        let cart = self.store.apply_changes(cart_id, changes, &ctx).await?;
        debug!(cart_id = %cart_id, item_id = %item_id, "item saved for later");
        Ok(cart)
    }

    /// Move a saved line back into the cart.
    ///
    /// Price and maximum are taken from the catalog again. `quantity`
    /// defaults to the saved quantity.
    pub async fn move_to_cart(
        &self,
        owner: &CartOwner,
        cart_id: &CartId,
        item_id: &CartItemId,
        quantity: Option<i64>,
    ) -> Result<Cart, CartError> {
        if let Some(q) = quantity.filter(|q| *q <= 0) {
            return Err(CartError::InvalidQuantity(q));
        }

        let (_guard, cart) = self.lock_owned(owner, cart_id).await?;
        let Some(saved) = cart.get_saved_item(item_id) else {
            if cart.get_item(item_id).is_some() {
                return Err(CartError::CartItemNotFound(item_id.clone()));
            }
            return Err(self.missing_item(cart_id, item_id).await);
        };

        let requested = quantity.unwrap_or(saved.quantity);
        let key = saved.key();
        let availability = self.lookup(&key).await?;
        let available = availability.sellable();
        if requested > available {
            return Err(CartError::InsufficientStock {
                product_id: saved.product_id.clone(),
                available,
                requested,
            });
        }
        ensure_currency(&cart, &availability.price)?;

        let ctx = self.write_context();
        let max = self.max_quantity(&availability);
        let cap = available.min(max);
        let mut changes = vec![CartChange::RemoveItem(saved.id.clone())];
        changes.push(match cart.get_item_by_key(&key) {
            Some(active) => {
                let mut line = active.clone();
                line.quantity = combine_quantities(active.quantity, requested, cap);
                resnapshot(&mut line, &availability, max);
                refresh_availability(&mut line, ctx.now);
                CartChange::ReplaceItem(line)
            }
            None => {
                let mut line = saved.clone();
                line.quantity = requested.min(cap);
                resnapshot(&mut line, &availability, max);
                refresh_availability(&mut line, ctx.now);
                CartChange::InsertItem {
                    list: ItemList::Active,
                    item: line,
                }
            }
        });

        let cart = self.store.apply_changes(cart_id, changes, &ctx).await?;
        debug!(cart_id = %cart_id, item_id = %item_id, quantity = requested, "saved item moved to cart");
        Ok(cart)
    }
}

fn resnapshot(line: &mut CartItem, availability: &ProductAvailability, max: i64) {
    line.unit_price = availability.price;
    line.max_quantity = max;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{guest, harness, product, user};
    use crate::CartConfig;
    use turbo_commerce::cart::ItemKey;
    use turbo_commerce::ids::ProductId;
    use turbo_commerce::money::{Currency, Money};

    #[tokio::test]
    async fn test_add_item_creates_cart_and_line() {
        let h = harness(CartConfig::default());
        h.catalog.set_product("p1".into(), product(1_000, 10)).await;

        let cart = h
            .engine
            .add_item(&guest("s1"), AddItemRequest::new("p1", 2))
            .await
            .unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 2);
        assert_eq!(cart.items[0].unit_price, Money::new(1_000, Currency::USD));
        assert_eq!(cart.items[0].snapshot.name, "p1");
        assert_eq!(cart.totals.subtotal.amount_cents, 2_000);
    }

    #[tokio::test]
    async fn test_add_same_product_increments_line() {
        let h = harness(CartConfig::default());
        h.catalog.set_product("p1".into(), product(500, 10)).await;
        let owner = user("u1");

        h.engine.add_item(&owner, AddItemRequest::new("p1", 2)).await.unwrap();
        let cart = h.engine.add_item(&owner, AddItemRequest::new("p1", 3)).await.unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 5);
    }

    #[tokio::test]
    async fn test_increment_is_capped_by_stock() {
        let h = harness(CartConfig::default());
        h.catalog.set_product("p1".into(), product(500, 4)).await;
        let owner = user("u1");

        h.engine.add_item(&owner, AddItemRequest::new("p1", 3)).await.unwrap();
        let cart = h.engine.add_item(&owner, AddItemRequest::new("p1", 3)).await.unwrap();

        assert_eq!(cart.items[0].quantity, 4);
    }

    #[tokio::test]
    async fn test_variants_are_separate_lines() {
        let h = harness(CartConfig::default());
        h.catalog.set_product("p1".into(), product(500, 10)).await;
        let owner = user("u1");

        h.engine.add_item(&owner, AddItemRequest::new("p1", 1)).await.unwrap();
        let cart = h
            .engine
            .add_item(&owner, AddItemRequest::new("p1", 1).with_variant("red"))
            .await
            .unwrap();

        assert_eq!(cart.items.len(), 2);
    }

    #[tokio::test]
    async fn test_add_rejects_bad_quantity_and_unknown_product() {
        let h = harness(CartConfig::default());
        let owner = guest("s1");

        let err = h.engine.add_item(&owner, AddItemRequest::new("p1", 0)).await.unwrap_err();
        assert_eq!(err, CartError::InvalidQuantity(0));

        let err = h.engine.add_item(&owner, AddItemRequest::new("nope", 1)).await.unwrap_err();
        assert_eq!(err, CartError::ProductNotFound(ProductId::new("nope")));
    }

    #[tokio::test]
    async fn test_add_inactive_product_has_no_stock() {
        let h = harness(CartConfig::default());
        h.catalog.set_product("p1".into(), product(500, 10)).await;
        h.catalog.set_active(&ProductId::new("p1"), false).await;

        let err = h
            .engine
            .add_item(&guest("s1"), AddItemRequest::new("p1", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, CartError::InsufficientStock { available: 0, .. }));
    }

    #[tokio::test]
    async fn test_update_quantity_and_zero_removes() {
        let h = harness(CartConfig::default());
        h.catalog.set_product("p1".into(), product(500, 10)).await;
        let owner = user("u1");
        let cart = h.engine.add_item(&owner, AddItemRequest::new("p1", 1)).await.unwrap();
        let item_id = cart.items[0].id.clone();

        let cart = h
            .engine
            .update_item_quantity(&owner, &cart.id, &item_id, 7)
            .await
            .unwrap();
        assert_eq!(cart.items[0].quantity, 7);
        assert_eq!(cart.totals.subtotal.amount_cents, 3_500);

        let cart = h
            .engine
            .update_item_quantity(&owner, &cart.id, &item_id, 0)
            .await
            .unwrap();
        assert!(cart.items.is_empty());

        // Already gone.
        let again = h
            .engine
            .update_item_quantity(&owner, &cart.id, &item_id, 0)
            .await
            .unwrap();
        assert!(again.items.is_empty());
        let err = h
            .engine
            .update_item_quantity(&owner, &cart.id, &item_id, 2)
            .await
            .unwrap_err();
        assert_eq!(err, CartError::CartItemNotFound(item_id));
    }

    #[tokio::test]
    async fn test_update_checks_limits_and_stock() {
        let h = harness(CartConfig::default());
        let mut limited = product(500, 5);
        limited.max_quantity = Some(10);
        h.catalog.set_product("p1".into(), limited).await;
        let owner = user("u1");
        let cart = h.engine.add_item(&owner, AddItemRequest::new("p1", 1)).await.unwrap();
        let item_id = cart.items[0].id.clone();

        let err = h
            .engine
            .update_item_quantity(&owner, &cart.id, &item_id, 11)
            .await
            .unwrap_err();
        assert_eq!(err, CartError::QuantityLimitExceeded { requested: 11, max: 10 });

        let err = h
            .engine
            .update_item_quantity(&owner, &cart.id, &item_id, 6)
            .await
            .unwrap_err();
        assert!(matches!(err, CartError::InsufficientStock { available: 5, requested: 6, .. }));

        let err = h
            .engine
            .update_item_quantity(&owner, &cart.id, &item_id, -1)
            .await
            .unwrap_err();
        assert_eq!(err, CartError::InvalidQuantity(-1));
    }

    #[tokio::test]
    async fn test_foreign_cart_and_item_are_unauthorized() {
        let h = harness(CartConfig::default());
        h.catalog.set_product("p1".into(), product(500, 10)).await;
        let alice = user("alice");
        let bob = user("bob");
        let alice_cart = h.engine.add_item(&alice, AddItemRequest::new("p1", 1)).await.unwrap();
        let bob_cart = h.engine.add_item(&bob, AddItemRequest::new("p1", 1)).await.unwrap();
        let alice_item = alice_cart.items[0].id.clone();

        let err = h
            .engine
            .remove_item(&bob, &alice_cart.id, &alice_item)
            .await
            .unwrap_err();
        assert!(matches!(err, CartError::Unauthorized(_)));

        let err = h
            .engine
            .update_item_quantity(&bob, &bob_cart.id, &alice_item, 3)
            .await
            .unwrap_err();
        assert!(matches!(err, CartError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_unknown_cart_leaves_no_lock_behind() {
        let h = harness(CartConfig::default());
        let owner = user("u1");

        for n in 0..5 {
            let err = h
                .engine
                .update_item_quantity(&owner, &CartId::new(format!("ghost-{n}")), &"i1".into(), 1)
                .await
                .unwrap_err();
            assert!(matches!(err, CartError::CartNotFound(_)));
        }
        assert!(h.engine.locks().is_empty());
    }

    #[tokio::test]
    async fn test_remove_missing_item() {
        let h = harness(CartConfig::default());
        let owner = guest("s1");
        let cart = h.engine.get_or_create_cart(&owner).await.unwrap();

        let err = h
            .engine
            .remove_item(&owner, &cart.id, &CartItemId::new("ghost"))
            .await
            .unwrap_err();
        assert_eq!(err, CartError::CartItemNotFound(CartItemId::new("ghost")));
    }

    #[tokio::test]
    async fn test_clear_cart_keeps_saved_lines() {
        let h = harness(CartConfig::default());
        h.catalog.set_product("p1".into(), product(500, 10)).await;
        h.catalog.set_product("p2".into(), product(700, 10)).await;
        let owner = user("u1");
        h.engine.add_item(&owner, AddItemRequest::new("p1", 1)).await.unwrap();
        let cart = h.engine.add_item(&owner, AddItemRequest::new("p2", 1)).await.unwrap();
        let p2 = cart.get_item_by_key(&ItemKey::new("p2".into(), None)).unwrap().id.clone();
        h.engine.save_for_later(&owner, &cart.id, &p2).await.unwrap();

        let cart = h.engine.clear_cart(&owner, &cart.id).await.unwrap();
        assert!(cart.items.is_empty());
        assert_eq!(cart.saved_for_later.len(), 1);
        assert!(cart.totals.total_amount.is_zero());

        let again = h.engine.clear_cart(&owner, &cart.id).await.unwrap();
        assert_eq!(again.updated_at, cart.updated_at);
    }

    #[tokio::test]
    async fn test_save_for_later_and_move_back() {
        let h = harness(CartConfig::default());
        h.catalog.set_product("p1".into(), product(500, 10)).await;
        let owner = user("u1");
        let cart = h.engine.add_item(&owner, AddItemRequest::new("p1", 2)).await.unwrap();
        let item_id = cart.items[0].id.clone();

        let cart = h.engine.save_for_later(&owner, &cart.id, &item_id).await.unwrap();
        assert!(cart.items.is_empty());
        assert_eq!(cart.saved_for_later[0].quantity, 2);
        assert!(cart.totals.subtotal.is_zero());

        // Saving twice is a no-op.
        let cart = h.engine.save_for_later(&owner, &cart.id, &item_id).await.unwrap();
        assert_eq!(cart.saved_for_later.len(), 1);

        // The price moved while the line was parked.
        h.catalog.set_product("p1".into(), product(450, 10)).await;
        let cart = h
            .engine
            .move_to_cart(&owner, &cart.id, &item_id, None)
            .await
            .unwrap();
        assert!(cart.saved_for_later.is_empty());
        assert_eq!(cart.items[0].quantity, 2);
        assert_eq!(cart.items[0].unit_price.amount_cents, 450);
        assert_eq!(cart.totals.subtotal.amount_cents, 900);
    }

    #[tokio::test]
    async fn test_move_to_cart_combines_with_active_line() {
        let h = harness(CartConfig::default());
        h.catalog.set_product("p1".into(), product(500, 6)).await;
        let owner = user("u1");
        let cart = h.engine.add_item(&owner, AddItemRequest::new("p1", 4)).await.unwrap();
        let parked = cart.items[0].id.clone();
        let cart = h.engine.save_for_later(&owner, &cart.id, &parked).await.unwrap();
        assert!(cart.items.is_empty());
        assert_eq!(cart.saved_for_later.len(), 1);
        let cart = h.engine.add_item(&owner, AddItemRequest::new("p1", 3)).await.unwrap();

        let cart = h
            .engine
            .move_to_cart(&owner, &cart.id, &parked, None)
            .await
            .unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 6);
        assert!(cart.saved_for_later.is_empty());
    }

    #[tokio::test]
    async fn test_move_to_cart_checks_stock() {
        let h = harness(CartConfig::default());
        h.catalog.set_product("p1".into(), product(500, 10)).await;
        let owner = user("u1");
        let cart = h.engine.add_item(&owner, AddItemRequest::new("p1", 3)).await.unwrap();
        let item_id = cart.items[0].id.clone();
        let cart = h.engine.save_for_later(&owner, &cart.id, &item_id).await.unwrap();
        h.catalog.set_stock(&ProductId::new("p1"), 1).await;

        let err = h
            .engine
            .move_to_cart(&owner, &cart.id, &item_id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CartError::InsufficientStock { available: 1, requested: 3, .. }));

        let cart = h
            .engine
            .move_to_cart(&owner, &cart.id, &item_id, Some(1))
            .await
            .unwrap();
        assert_eq!(cart.items[0].quantity, 1);
    }

    #[tokio::test]
    async fn test_failed_lookup_leaves_cart_untouched() {
        let h = harness(CartConfig::default());
        h.catalog.set_product("p1".into(), product(500, 10)).await;
        let owner = user("u1");
        let before = h.engine.add_item(&owner, AddItemRequest::new("p1", 1)).await.unwrap();

        h.catalog.set_fail_on_lookup(true).await;
        let err = h
            .engine
            .update_item_quantity(&owner, &before.id, &before.items[0].id, 4)
            .await
            .unwrap_err();
        assert!(matches!(err, CartError::DependencyUnavailable { .. }));

        let after = h.engine.get_or_create_cart(&owner).await.unwrap();
        assert_eq!(after, before);
    }
}

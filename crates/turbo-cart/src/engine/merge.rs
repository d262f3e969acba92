//! Folding a guest cart into a user's cart at sign-in.

use tracing::{debug, info};
use turbo_commerce::cart::{combine_quantities, Cart, CartOwner};
use turbo_commerce::ids::{CartId, CartItemId, ProductId, SessionId, UserId};

use super::{refresh_availability, CartEngine, MergeOutcome, MergeStrategy};
use crate::store::{CartChange, ItemList, StoreError};
use crate::CartError;

impl CartEngine {
    /// Merge the session's guest cart into the user's cart.
    ///
    /// If the user has no cart, the guest cart is handed over as is.
    /// Otherwise matching lines are summed (capped at stock and the line
    /// maximum), unsellable products are left behind, and the guest cart is
    /// retired in the same store transaction. Guest coupons are not carried
    /// over. Running the merge again finds no guest cart and changes nothing.
    pub async fn merge_guest_cart(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
    ) -> Result<MergeOutcome, CartError> {
        let guest_owner = CartOwner::Session(session_id.clone());
        let user_owner = CartOwner::User(user_id.clone());

        let Some(guest) = self.store.find_by_owner(&guest_owner).await? else {
            debug!(session_id = %session_id, user_id = %user_id, "no guest cart to merge");
            let cart = self.get_or_create_cart(&user_owner).await?;
            return Ok(MergeOutcome::nothing(cart));
        };

        if self.store.find_by_owner(&user_owner).await?.is_none() {
            if let Some(outcome) = self.reassign(&guest.id, &guest_owner, user_id).await? {
                return Ok(outcome);
            }
        }

        let target = self.get_or_create_cart(&user_owner).await?;
        if target.id == guest.id {
            // Reassigned to this user by a concurrent merge.
            return Ok(MergeOutcome::nothing(target));
        }
        self.merge_lines(&guest.id, &target.id, &guest_owner, &user_owner)
            .await
    }

    /// Hand the guest cart to the user. `None` means the user gained a cart
    /// in the meantime and the lines must be merged instead.
    async fn reassign(
        &self,
        guest_id: &CartId,
        guest_owner: &CartOwner,
        user_id: &UserId,
    ) -> Result<Option<MergeOutcome>, CartError> {
        let _guard = self.locks.lock(guest_id).await;
        let guest = self.store.find_with_items(guest_id).await?;
        if !guest.is_active() || &guest.owner != guest_owner {
            let cart = self
                .get_or_create_cart(&CartOwner::User(user_id.clone()))
                .await?;
            return Ok(Some(MergeOutcome::nothing(cart)));
        }

        let ctx = self.write_context();
        match self.store.reassign_owner(guest_id, user_id, &ctx).await {
            Ok(cart) => {
                info!(cart_id = %cart.id, user_id = %user_id, "guest cart reassigned to user");
                Ok(Some(MergeOutcome {
                    merged_lines: cart.items.len(),
                    cart,
                    strategy: MergeStrategy::Reassigned,
                    skipped_products: Vec::new(),
                }))
            }
            Err(StoreError::DuplicateOwner(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn merge_lines(
        &self,
        guest_id: &CartId,
        target_id: &CartId,
        guest_owner: &CartOwner,
        user_owner: &CartOwner,
    ) -> Result<MergeOutcome, CartError> {
        let _guards = self.locks.lock_pair(guest_id, target_id).await;

        let guest = self.store.find_with_items(guest_id).await?;
        let target = self.store.find_with_items(target_id).await?;
        if !target.is_active() || &target.owner != user_owner {
            return Err(CartError::CartNotActive {
                cart_id: target.id,
                status: target.status,
            });
        }
        if !guest.is_active() || &guest.owner != guest_owner {
            // Another merge got here first.
            return Ok(MergeOutcome::nothing(target));
        }

        let ctx = self.write_context();
        let (changes, merged_lines, skipped_products) =
            self.plan_merge(&guest, &target, ctx.now).await?;

        let cart = self
            .store
            .merge_items(target_id, changes, Some(guest_id), &ctx)
            .await?;
        info!(
            cart_id = %cart.id,
            guest_cart_id = %guest_id,
            merged_lines,
            skipped = skipped_products.len(),
            "guest cart merged"
        );
        Ok(MergeOutcome {
            cart,
            strategy: MergeStrategy::Merged,
            merged_lines,
            skipped_products,
        })
    }

    /// Work out the changes to `target` that carry over the guest's lines.
    async fn plan_merge(
        &self,
        guest: &Cart,
        target: &Cart,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(Vec<CartChange>, usize, Vec<ProductId>), CartError> {
        let mut changes = Vec::new();
        let mut merged_lines = 0;
        let mut skipped = Vec::new();

        for line in &guest.items {
            let key = line.key();
            let available = match self.lookup(&key).await {
                Ok(availability) => availability.sellable(),
                Err(CartError::ProductNotFound(_)) => 0,
                Err(e) => return Err(e),
            };
            if available == 0 {
                skipped.push(line.product_id.clone());
                continue;
            }

            match target.get_item_by_key(&key) {
                Some(existing) => {
                    let mut merged = existing.clone();
                    let cap = available.min(existing.max_quantity);
                    merged.quantity = combine_quantities(existing.quantity, line.quantity, cap);
                    refresh_availability(&mut merged, now);
                    changes.push(CartChange::ReplaceItem(merged));
                }
                None if line.unit_price.currency != target.currency => {
                    skipped.push(line.product_id.clone());
                    continue;
                }
                None => {
                    let mut copy = line.clone();
                    copy.id = CartItemId::generate();
                    copy.quantity = line.quantity.min(available.min(line.max_quantity));
                    refresh_availability(&mut copy, now);
                    changes.push(CartChange::InsertItem {
                        list: ItemList::Active,
                        item: copy,
                    });
                }
            }
            merged_lines += 1;
        }

        for saved in &guest.saved_for_later {
            if target.get_saved_item_by_key(&saved.key()).is_some()
                || saved.unit_price.currency != target.currency
            {
                continue;
            }
            let mut copy = saved.clone();
            copy.id = CartItemId::generate();
            changes.push(CartChange::InsertItem {
                list: ItemList::Saved,
                item: copy,
            });
        }

        Ok((changes, merged_lines, skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{guest, harness, product, user};
    use crate::engine::AddItemRequest;
    use crate::gateway::CouponRule;
    use crate::store::CartStore;
    use crate::CartConfig;
    use turbo_commerce::cart::{CartStatus, CouponCode, DiscountValue, ItemKey};

    fn key(product: &str) -> ItemKey {
        ItemKey::new(product.into(), None)
    }

    #[tokio::test]
    async fn test_nothing_to_merge() {
        let h = harness(CartConfig::default());

        let outcome = h
            .engine
            .merge_guest_cart(&"s1".into(), &"u1".into())
            .await
            .unwrap();

        assert_eq!(outcome.strategy, MergeStrategy::NothingToMerge);
        assert_eq!(outcome.cart.owner, user("u1"));
    }

    #[tokio::test]
    async fn test_reassigns_when_user_has_no_cart() {
        let h = harness(CartConfig::default());
        h.catalog.set_product("p1".into(), product(100, 10)).await;
        let guest_cart = h
            .engine
            .add_item(&guest("s1"), AddItemRequest::new("p1", 2))
            .await
            .unwrap();

        let outcome = h
            .engine
            .merge_guest_cart(&"s1".into(), &"u1".into())
            .await
            .unwrap();

        assert_eq!(outcome.strategy, MergeStrategy::Reassigned);
        assert_eq!(outcome.cart.id, guest_cart.id);
        assert_eq!(outcome.cart.owner, user("u1"));
        assert_eq!(outcome.cart.expires_at, outcome.cart.updated_at + h.engine.config().user_ttl());
        assert!(h.engine.find_cart(&guest("s1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_merge_caps_summed_lines_at_stock() {
        let h = harness(CartConfig::default());
        h.catalog.set_product("x".into(), product(100, 5)).await;
        h.engine.add_item(&user("u1"), AddItemRequest::new("x", 2)).await.unwrap();
        h.engine.add_item(&guest("s1"), AddItemRequest::new("x", 1)).await.unwrap();
        h.catalog.set_stock(&ProductId::new("x"), 2).await;

        let outcome = h
            .engine
            .merge_guest_cart(&"s1".into(), &"u1".into())
            .await
            .unwrap();

        assert_eq!(outcome.strategy, MergeStrategy::Merged);
        assert_eq!(outcome.cart.items.len(), 1);
        assert_eq!(outcome.cart.get_item_by_key(&key("x")).unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn test_merge_skips_unsellable_and_retires_guest() {
        let h = harness(CartConfig::default());
        h.catalog.set_product("a".into(), product(100, 10)).await;
        h.catalog.set_product("b".into(), product(200, 10)).await;
        h.catalog.set_product("gone".into(), product(300, 10)).await;
        h.engine.add_item(&user("u1"), AddItemRequest::new("a", 1)).await.unwrap();
        let guest_cart = h.engine.add_item(&guest("s1"), AddItemRequest::new("b", 3)).await.unwrap();
        h.engine.add_item(&guest("s1"), AddItemRequest::new("gone", 1)).await.unwrap();
        h.catalog.set_active(&ProductId::new("gone"), false).await;

        let outcome = h
            .engine
            .merge_guest_cart(&"s1".into(), &"u1".into())
            .await
            .unwrap();

        assert_eq!(outcome.merged_lines, 1);
        assert_eq!(outcome.skipped_products, vec![ProductId::new("gone")]);
        assert_eq!(outcome.cart.items.len(), 2);
        assert_eq!(outcome.cart.totals.subtotal.amount_cents, 700);

        let retired = h.store.find_with_items(&guest_cart.id).await.unwrap();
        assert_eq!(retired.status, CartStatus::Merged);
        assert!(retired.items.is_empty());
    }

    #[tokio::test]
    async fn test_merge_carries_saved_lines_but_not_coupons() {
        let h = harness(CartConfig::default());
        h.catalog.set_product("a".into(), product(1_000, 10)).await;
        h.catalog.set_product("b".into(), product(2_000, 10)).await;
        h.coupons
            .insert(
                CouponCode::parse("WELCOME").unwrap(),
                CouponRule {
                    description: "welcome".into(),
                    value: DiscountValue::FreeShipping,
                    min_subtotal_cents: None,
                    active: true,
                },
            )
            .await;
        h.engine.add_item(&user("u1"), AddItemRequest::new("a", 1)).await.unwrap();
        let g = h.engine.add_item(&guest("s1"), AddItemRequest::new("b", 1)).await.unwrap();
        let parked = g.items[0].id.clone();
        h.engine.save_for_later(&guest("s1"), &g.id, &parked).await.unwrap();
        h.engine.apply_coupon(&guest("s1"), &g.id, "WELCOME").await.unwrap();

        let outcome = h
            .engine
            .merge_guest_cart(&"s1".into(), &"u1".into())
            .await
            .unwrap();

        assert_eq!(outcome.cart.saved_for_later.len(), 1);
        assert_ne!(outcome.cart.saved_for_later[0].id, parked);
        assert!(outcome.cart.applied_coupons.is_empty());
    }

    #[tokio::test]
    async fn test_merge_is_idempotent() {
        let h = harness(CartConfig::default());
        h.catalog.set_product("x".into(), product(100, 10)).await;
        h.engine.add_item(&user("u1"), AddItemRequest::new("x", 2)).await.unwrap();
        h.engine.add_item(&guest("s1"), AddItemRequest::new("x", 3)).await.unwrap();

        let first = h
            .engine
            .merge_guest_cart(&"s1".into(), &"u1".into())
            .await
            .unwrap();
        let second = h
            .engine
            .merge_guest_cart(&"s1".into(), &"u1".into())
            .await
            .unwrap();

        assert_eq!(first.cart.items[0].quantity, 5);
        assert_eq!(second.strategy, MergeStrategy::NothingToMerge);
        assert_eq!(second.cart, first.cart);
    }
}

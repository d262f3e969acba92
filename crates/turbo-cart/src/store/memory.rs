//! Process-local arena store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use turbo_commerce::cart::{
    calculate_totals, AppliedCoupon, Cart, CartItem, CartOwner, CartStatus, CartTotals,
    PricingRules,
};
use turbo_commerce::ids::{CartId, CartItemId, UserId};
use turbo_commerce::money::{Currency, Money};

use super::{
    CartChange, CartStatistics, CartStore, ItemList, ItemLocation, StoreError, WriteContext,
};

#[derive(Debug, Clone)]
struct CartRow {
    id: CartId,
    owner: CartOwner,
    status: CartStatus,
    currency: Currency,
    applied_coupons: Vec<AppliedCoupon>,
    totals: CartTotals,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    /// Active line ids in display order.
    lines: Vec<CartItemId>,
    /// Saved line ids in display order.
    saved: Vec<CartItemId>,
}

#[derive(Debug, Clone)]
struct ItemRow {
    cart_id: CartId,
    list: ItemList,
    item: CartItem,
}

#[derive(Debug, Default)]
struct Arena {
    carts: HashMap<CartId, CartRow>,
    items: HashMap<CartItemId, ItemRow>,
    active_by_owner: HashMap<CartOwner, CartId>,
    expired_purged: u64,
}

impl Arena {
    fn assemble(&self, cart_id: &CartId) -> Result<Cart, StoreError> {
        let row = self
            .carts
            .get(cart_id)
            .ok_or_else(|| StoreError::CartNotFound(cart_id.clone()))?;
        let collect = |ids: &[CartItemId]| -> Vec<CartItem> {
            ids.iter()
                .filter_map(|id| self.items.get(id))
                .map(|r| r.item.clone())
                .collect()
        };
        Ok(Cart {
            id: row.id.clone(),
            owner: row.owner.clone(),
            status: row.status,
            currency: row.currency,
            applied_coupons: row.applied_coupons.clone(),
            items: collect(&row.lines),
            saved_for_later: collect(&row.saved),
            totals: row.totals.clone(),
            created_at: row.created_at,
            updated_at: row.updated_at,
            expires_at: row.expires_at,
        })
    }

    fn active(&self, cart_id: &CartId) -> Result<Cart, StoreError> {
        let cart = self.assemble(cart_id)?;
        if !cart.is_active() {
            return Err(StoreError::CartNotActive {
                cart_id: cart.id,
                status: cart.status,
            });
        }
        Ok(cart)
    }

    /// Reject line ids that already belong to another cart.
    fn check_rows(&self, cart: &Cart) -> Result<(), StoreError> {
        for item in cart.items.iter().chain(&cart.saved_for_later) {
            if let Some(row) = self.items.get(&item.id) {
                if row.cart_id != cart.id {
                    return Err(StoreError::DuplicateItem(item.id.clone()));
                }
            }
        }
        Ok(())
    }

    fn drop_rows(&mut self, cart_id: &CartId) {
        if let Some(row) = self.carts.get_mut(cart_id) {
            for id in row.lines.drain(..).chain(row.saved.drain(..)) {
                self.items.remove(&id);
            }
        }
    }

    fn unindex(&mut self, owner: &CartOwner, cart_id: &CartId) {
        if self.active_by_owner.get(owner) == Some(cart_id) {
            self.active_by_owner.remove(owner);
        }
    }

    /// Replace every stored row of the cart with the given state.
    fn write_back(&mut self, cart: Cart) {
        self.drop_rows(&cart.id);

        let Cart {
            id,
            owner,
            status,
            currency,
            applied_coupons,
            items,
            saved_for_later,
            totals,
            created_at,
            updated_at,
            expires_at,
        } = cart;

        let lines = items.iter().map(|i| i.id.clone()).collect();
        let saved = saved_for_later.iter().map(|i| i.id.clone()).collect();
        let rows = items
            .into_iter()
            .map(|item| (ItemList::Active, item))
            .chain(saved_for_later.into_iter().map(|item| (ItemList::Saved, item)));
        for (list, item) in rows {
            self.items.insert(
                item.id.clone(),
                ItemRow {
                    cart_id: id.clone(),
                    list,
                    item,
                },
            );
        }

        self.carts.insert(
            id.clone(),
            CartRow {
                id,
                owner,
                status,
                currency,
                applied_coupons,
                totals,
                created_at,
                updated_at,
                expires_at,
                lines,
                saved,
            },
        );
    }
}

/// Apply changes to a detached cart, then refresh totals and timestamps.
fn stage(cart: &mut Cart, changes: Vec<CartChange>, ctx: &WriteContext) -> Result<(), StoreError> {
    for change in changes {
        change.apply(cart, ctx.now)?;
    }
    cart.totals = calculate_totals(
        &cart.items,
        &cart.applied_coupons,
        cart.currency,
        &ctx.pricing,
    )?;
    cart.updated_at = ctx.now;
    cart.expires_at = ctx.expires_at(&cart.owner);
    Ok(())
}

/// [`CartStore`] holding every cart in one mutex-guarded arena.
///
/// Each call takes the arena lock once, assembles the carts it touches,
/// changes the copies and writes them back only if every step succeeded.
#[derive(Debug, Default)]
pub struct MemoryCartStore {
    arena: Mutex<Arena>,
}

impl MemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn arena(&self) -> MutexGuard<'_, Arena> {
        self.arena.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CartStore for MemoryCartStore {
    async fn find_by_owner(&self, owner: &CartOwner) -> Result<Option<Cart>, StoreError> {
        let arena = self.arena();
        arena
            .active_by_owner
            .get(owner)
            .map(|id| arena.assemble(id))
            .transpose()
    }

    async fn create(
        &self,
        owner: &CartOwner,
        currency: Currency,
        ctx: &WriteContext,
    ) -> Result<Cart, StoreError> {
        let mut arena = self.arena();
        if arena.active_by_owner.contains_key(owner) {
            return Err(StoreError::DuplicateOwner(owner.clone()));
        }

        let cart = Cart {
            id: CartId::generate(),
            owner: owner.clone(),
            status: CartStatus::Active,
            currency,
            applied_coupons: Vec::new(),
            items: Vec::new(),
            saved_for_later: Vec::new(),
            totals: CartTotals::zero(currency),
            created_at: ctx.now,
            updated_at: ctx.now,
            expires_at: ctx.expires_at(owner),
        };
        arena
            .active_by_owner
            .insert(owner.clone(), cart.id.clone());
        arena.write_back(cart.clone());
        Ok(cart)
    }

    async fn find_with_items(&self, cart_id: &CartId) -> Result<Cart, StoreError> {
        self.arena().assemble(cart_id)
    }

    async fn find_item_by_id(&self, item_id: &CartItemId) -> Result<ItemLocation, StoreError> {
        let arena = self.arena();
        let row = arena
            .items
            .get(item_id)
            .ok_or_else(|| StoreError::ItemNotFound(item_id.clone()))?;
        let cart = arena
            .carts
            .get(&row.cart_id)
            .ok_or_else(|| StoreError::CartNotFound(row.cart_id.clone()))?;
        Ok(ItemLocation {
            cart_id: row.cart_id.clone(),
            owner: cart.owner.clone(),
            list: row.list,
            item: row.item.clone(),
        })
    }

    async fn apply_changes(
        &self,
        cart_id: &CartId,
        changes: Vec<CartChange>,
        ctx: &WriteContext,
    ) -> Result<Cart, StoreError> {
        let mut arena = self.arena();
        let mut cart = arena.active(cart_id)?;
        stage(&mut cart, changes, ctx)?;
        arena.check_rows(&cart)?;
        arena.write_back(cart.clone());
        Ok(cart)
    }

    async fn merge_items(
        &self,
        target: &CartId,
        changes: Vec<CartChange>,
        retire: Option<&CartId>,
        ctx: &WriteContext,
    ) -> Result<Cart, StoreError> {
        let mut arena = self.arena();
        let mut cart = arena.active(target)?;

        let retired = match retire {
            Some(source) if source == target => {
                return Err(StoreError::InvalidRow(
                    "cannot merge a cart into itself".into(),
                ))
            }
            Some(source) => {
                let mut source = arena.active(source)?;
                source.status = source.status.transition(CartStatus::Merged)?;
                Some(source)
            }
            None => None,
        };

        stage(&mut cart, changes, ctx)?;
        arena.check_rows(&cart)?;

        if let Some(mut source) = retired {
            source.items.clear();
            source.saved_for_later.clear();
            source.totals = CartTotals::zero(source.currency);
            source.updated_at = ctx.now;
            arena.unindex(&source.owner, &source.id);
            arena.write_back(source);
        }
        arena.write_back(cart.clone());
        Ok(cart)
    }

    async fn reassign_owner(
        &self,
        cart_id: &CartId,
        user_id: &UserId,
        ctx: &WriteContext,
    ) -> Result<Cart, StoreError> {
        let mut arena = self.arena();
        let mut cart = arena.active(cart_id)?;
        let new_owner = CartOwner::User(user_id.clone());

        if cart.owner == new_owner {
            return Ok(cart);
        }
        if arena.active_by_owner.contains_key(&new_owner) {
            return Err(StoreError::DuplicateOwner(new_owner));
        }

        arena.unindex(&cart.owner, &cart.id);
        arena
            .active_by_owner
            .insert(new_owner.clone(), cart.id.clone());
        cart.owner = new_owner;
        cart.updated_at = ctx.now;
        cart.expires_at = ctx.expires_at(&cart.owner);
        arena.write_back(cart.clone());
        Ok(cart)
    }

    async fn set_status(
        &self,
        cart_id: &CartId,
        status: CartStatus,
        ctx: &WriteContext,
    ) -> Result<Cart, StoreError> {
        let mut arena = self.arena();
        let mut cart = arena.active(cart_id)?;
        cart.status = cart.status.transition(status)?;
        cart.updated_at = ctx.now;
        arena.unindex(&cart.owner, &cart.id);
        arena.write_back(cart.clone());
        Ok(cart)
    }

    async fn recompute_and_persist_totals(
        &self,
        cart_id: &CartId,
        pricing: &PricingRules,
    ) -> Result<Cart, StoreError> {
        let mut arena = self.arena();
        let mut cart = arena.assemble(cart_id)?;
        cart.totals = calculate_totals(&cart.items, &cart.applied_coupons, cart.currency, pricing)?;
        arena.write_back(cart.clone());
        Ok(cart)
    }

    async fn delete(&self, cart_id: &CartId) -> Result<(), StoreError> {
        let mut arena = self.arena();
        let owner = arena
            .carts
            .get(cart_id)
            .map(|row| row.owner.clone())
            .ok_or_else(|| StoreError::CartNotFound(cart_id.clone()))?;
        arena.drop_rows(cart_id);
        arena.carts.remove(cart_id);
        arena.unindex(&owner, cart_id);
        Ok(())
    }

    async fn delete_if_expired(
        &self,
        cart_id: &CartId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut arena = self.arena();
        let Some(row) = arena.carts.get(cart_id) else {
            return Ok(false);
        };
        if row.status != CartStatus::Active || row.expires_at > now {
            return Ok(false);
        }
        row.status.transition(CartStatus::Expired)?;

        let owner = row.owner.clone();
        arena.drop_rows(cart_id);
        arena.carts.remove(cart_id);
        arena.unindex(&owner, cart_id);
        arena.expired_purged += 1;
        Ok(true)
    }

    async fn list_expired(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CartId>, StoreError> {
        let arena = self.arena();
        let mut expired: Vec<&CartRow> = arena
            .carts
            .values()
            .filter(|row| row.status == CartStatus::Active && row.expires_at <= now)
            .collect();
        expired.sort_by(|a, b| a.expires_at.cmp(&b.expires_at).then_with(|| a.id.cmp(&b.id)));
        Ok(expired
            .into_iter()
            .take(limit)
            .map(|row| row.id.clone())
            .collect())
    }

    async fn statistics(&self, now: DateTime<Utc>) -> Result<CartStatistics, StoreError> {
        let arena = self.arena();
        let mut stats = CartStatistics {
            total_carts: arena.carts.len(),
            expired_purged: arena.expired_purged,
            ..CartStatistics::default()
        };
        let mut value: BTreeMap<Currency, i64> = BTreeMap::new();

        for row in arena.carts.values() {
            match row.status {
                CartStatus::Active => {}
                CartStatus::Merged => {
                    stats.merged_carts += 1;
                    continue;
                }
                CartStatus::Converted => {
                    stats.converted_carts += 1;
                    continue;
                }
                CartStatus::Expired => continue,
            }

            stats.active_carts += 1;
            if row.owner.is_guest() {
                stats.active_guest_carts += 1;
            } else {
                stats.active_user_carts += 1;
            }
            if row.expires_at <= now {
                stats.active_past_expiry += 1;
            }
            stats.active_items = stats.active_items.saturating_add(row.totals.total_items);
            stats.saved_items = row
                .saved
                .iter()
                .filter_map(|id| arena.items.get(id))
                .fold(stats.saved_items, |acc, r| acc.saturating_add(r.item.quantity));

            let total = value.entry(row.currency).or_insert(0);
            *total = total.saturating_add(row.totals.total_amount.amount_cents);
        }

        stats.active_value = value
            .into_iter()
            .map(|(currency, cents)| Money::new(cents, currency))
            .collect();
        Ok(stats)
    }
}

//! Cart persistence.
//!
//! A store keeps cart headers and line rows apart: rows are keyed by their
//! own id and indexed by the owning cart id, and a cart is assembled from
//! its rows on read. Every mutating call is atomic: the row changes, the
//! coupon set and the recomputed totals land together or not at all.

mod change;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use turbo_commerce::cart::{Cart, CartItem, CartOwner, CartStatus, PricingRules};
use turbo_commerce::ids::{CartId, CartItemId, ProductId, UserId};
use turbo_commerce::money::{Currency, Money};
use turbo_commerce::CommerceError;

use crate::CartConfig;

pub use change::CartChange;
pub use memory::MemoryCartStore;

/// Which collection of a cart a line lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemList {
    /// Counted in totals.
    Active,
    /// Saved for later.
    Saved,
}

/// A line together with the cart and owner it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemLocation {
    pub cart_id: CartId,
    pub owner: CartOwner,
    pub list: ItemList,
    pub item: CartItem,
}

/// Everything a mutating store call needs besides the change itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteContext {
    /// Timestamp for `updated_at`.
    pub now: DateTime<Utc>,
    /// Rules used to recompute totals.
    pub pricing: PricingRules,
    pub guest_ttl: Duration,
    pub user_ttl: Duration,
}

impl WriteContext {
    /// Build a context from engine configuration.
    pub fn from_config(config: &CartConfig, now: DateTime<Utc>) -> Self {
        Self {
            now,
            pricing: config.pricing.clone(),
            guest_ttl: config.guest_ttl(),
            user_ttl: config.user_ttl(),
        }
    }

    /// New inactivity deadline for a cart with this owner.
    pub fn expires_at(&self, owner: &CartOwner) -> DateTime<Utc> {
        let ttl = if owner.is_guest() {
            self.guest_ttl
        } else {
            self.user_ttl
        };
        self.now
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Aggregate counts over every stored cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartStatistics {
    pub total_carts: usize,
    pub active_carts: usize,
    pub merged_carts: usize,
    pub converted_carts: usize,
    /// Carts reclaimed by the expiry sweep since start.
    pub expired_purged: u64,
    pub active_guest_carts: usize,
    pub active_user_carts: usize,
    /// Active carts whose deadline has passed but were not yet swept.
    pub active_past_expiry: usize,
    /// Sum of quantities over active lines of active carts.
    pub active_items: i64,
    /// Sum of quantities over saved lines of active carts.
    pub saved_items: i64,
    /// Total value of active carts, one entry per currency.
    pub active_value: Vec<Money>,
}

/// Store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("cart not found: {0}")]
    CartNotFound(CartId),

    #[error("cart item not found: {0}")]
    ItemNotFound(CartItemId),

    /// The owner already has an active cart.
    #[error("{0} already has an active cart")]
    DuplicateOwner(CartOwner),

    /// An item id is already used by another row.
    #[error("duplicate cart item: {0}")]
    DuplicateItem(CartItemId),

    /// The list already holds a line for this product.
    #[error("duplicate line for product {0}")]
    DuplicateLine(ProductId),

    #[error("cart {cart_id} is {status}")]
    CartNotActive { cart_id: CartId, status: CartStatus },

    /// A row would violate a persisted invariant.
    #[error("invalid row: {0}")]
    InvalidRow(String),

    #[error(transparent)]
    Domain(#[from] CommerceError),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Persistence for carts and their lines.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// The active cart of an owner, if any.
    async fn find_by_owner(&self, owner: &CartOwner) -> Result<Option<Cart>, StoreError>;

    /// Create an empty active cart. Fails with [`StoreError::DuplicateOwner`]
    /// if the owner already has one.
    async fn create(
        &self,
        owner: &CartOwner,
        currency: Currency,
        ctx: &WriteContext,
    ) -> Result<Cart, StoreError>;

    /// A cart with its lines, whatever its status.
    async fn find_with_items(&self, cart_id: &CartId) -> Result<Cart, StoreError>;

    /// Locate a line and its owning cart.
    async fn find_item_by_id(&self, item_id: &CartItemId) -> Result<ItemLocation, StoreError>;

    /// Apply changes to an active cart and recompute its totals.
    async fn apply_changes(
        &self,
        cart_id: &CartId,
        changes: Vec<CartChange>,
        ctx: &WriteContext,
    ) -> Result<Cart, StoreError>;

    /// Apply merge changes to `target` and, in the same transaction, mark
    /// `retire` as merged and drop its lines.
    async fn merge_items(
        &self,
        target: &CartId,
        changes: Vec<CartChange>,
        retire: Option<&CartId>,
        ctx: &WriteContext,
    ) -> Result<Cart, StoreError>;

    /// Hand an active cart to a user.
    async fn reassign_owner(
        &self,
        cart_id: &CartId,
        user_id: &UserId,
        ctx: &WriteContext,
    ) -> Result<Cart, StoreError>;

    /// Move a cart to a new lifecycle status.
    async fn set_status(
        &self,
        cart_id: &CartId,
        status: CartStatus,
        ctx: &WriteContext,
    ) -> Result<Cart, StoreError>;

    /// Recompute totals from the stored rows.
    async fn recompute_and_persist_totals(
        &self,
        cart_id: &CartId,
        pricing: &PricingRules,
    ) -> Result<Cart, StoreError>;

    /// Remove a cart and all of its rows.
    async fn delete(&self, cart_id: &CartId) -> Result<(), StoreError>;

    /// Expire and remove a cart if it is still active and past its deadline.
    async fn delete_if_expired(
        &self,
        cart_id: &CartId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Active carts past their deadline, oldest first.
    async fn list_expired(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CartId>, StoreError>;

    async fn statistics(&self, now: DateTime<Utc>) -> Result<CartStatistics, StoreError>;

    /// Insert a new line.
    async fn add_item(
        &self,
        cart_id: &CartId,
        list: ItemList,
        item: CartItem,
        ctx: &WriteContext,
    ) -> Result<Cart, StoreError> {
        self.apply_changes(cart_id, vec![CartChange::InsertItem { list, item }], ctx)
            .await
    }

    /// Set a line's quantity. Zero is not a storable quantity.
    async fn update_item_quantity(
        &self,
        cart_id: &CartId,
        item_id: &CartItemId,
        quantity: i64,
        ctx: &WriteContext,
    ) -> Result<Cart, StoreError> {
        let change = CartChange::SetQuantity {
            item_id: item_id.clone(),
            quantity,
        };
        self.apply_changes(cart_id, vec![change], ctx).await
    }

    /// Remove a line from either list.
    async fn remove_item(
        &self,
        cart_id: &CartId,
        item_id: &CartItemId,
        ctx: &WriteContext,
    ) -> Result<Cart, StoreError> {
        self.apply_changes(cart_id, vec![CartChange::RemoveItem(item_id.clone())], ctx)
            .await
    }

    /// Drop every active line.
    async fn clear_items(&self, cart_id: &CartId, ctx: &WriteContext) -> Result<Cart, StoreError> {
        self.apply_changes(cart_id, vec![CartChange::ClearItems], ctx)
            .await
    }
}

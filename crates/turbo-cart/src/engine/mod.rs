//! The cart engine.
//!
//! Owns every cart state transition: quantity and stock reconciliation,
//! coupon application, guest-to-user merging and expiry. Each mutation runs
//! under the target cart's lock and ends in exactly one atomic store call,
//! so a failed stock or coupon lookup never leaves a partial write.

mod coupons;
mod items;
mod lifecycle;
mod merge;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use turbo_commerce::cart::{Cart, CartItem, CartOwner, ItemKey, ItemSnapshot};
use turbo_commerce::ids::{CartId, CartItemId, ProductId, VariantId};
use turbo_commerce::money::Money;
use turbo_commerce::CommerceError;

use crate::clock::{Clock, SystemClock};
use crate::gateway::{
    call_with_timeout, AvailabilityGateway, CouponValidator, DependencyTag, ProductAvailability,
};
use crate::locks::{CartGuard, CartLocks};
use crate::store::{CartStore, StoreError, WriteContext};
use crate::{CartConfig, CartError};

/// A request to add a product to the caller's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    pub quantity: i64,
    /// Display fields to snapshot onto a new line.
    #[serde(default)]
    pub snapshot: ItemSnapshot,
}

impl AddItemRequest {
    pub fn new(product_id: impl Into<ProductId>, quantity: i64) -> Self {
        Self {
            product_id: product_id.into(),
            variant_id: None,
            quantity,
            snapshot: ItemSnapshot::default(),
        }
    }

    pub fn with_variant(mut self, variant_id: impl Into<VariantId>) -> Self {
        self.variant_id = Some(variant_id.into());
        self
    }

    fn key(&self) -> ItemKey {
        ItemKey::new(self.product_id.clone(), self.variant_id.clone())
    }
}

/// How a guest cart was folded into a user's cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// The user had no cart; the guest cart now belongs to the user.
    Reassigned,
    /// Guest lines were merged into the user's cart and the guest cart retired.
    Merged,
    /// No active guest cart was found.
    NothingToMerge,
}

/// Result of a guest-to-user merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// The user's cart after the merge.
    pub cart: Cart,
    pub strategy: MergeStrategy,
    /// Guest lines carried into the user's cart.
    pub merged_lines: usize,
    /// Products left behind because they can no longer be sold.
    pub skipped_products: Vec<ProductId>,
}

impl MergeOutcome {
    fn nothing(cart: Cart) -> Self {
        Self {
            cart,
            strategy: MergeStrategy::NothingToMerge,
            merged_lines: 0,
            skipped_products: Vec::new(),
        }
    }
}

/// Result of one expired cart sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Carts found past their deadline.
    pub scanned: usize,
    /// Carts reclaimed.
    pub expired: usize,
    /// Carts that could not be reclaimed this run.
    pub failed: usize,
}

/// Cart business logic over injected store and collaborators.
pub struct CartEngine {
    config: CartConfig,
    store: Arc<dyn CartStore>,
    catalog: Arc<dyn AvailabilityGateway>,
    coupons: Arc<dyn CouponValidator>,
    clock: Arc<dyn Clock>,
    locks: CartLocks,
}

impl CartEngine {
    /// Create an engine on the system clock.
    pub fn new(
        config: CartConfig,
        store: Arc<dyn CartStore>,
        catalog: Arc<dyn AvailabilityGateway>,
        coupons: Arc<dyn CouponValidator>,
    ) -> Self {
        Self {
            config,
            store,
            catalog,
            coupons,
            clock: Arc::new(SystemClock),
            locks: CartLocks::new(),
        }
    }

    /// Use another clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &CartConfig {
        &self.config
    }

    pub fn locks(&self) -> &CartLocks {
        &self.locks
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn write_context(&self) -> WriteContext {
        WriteContext::from_config(&self.config, self.now())
    }

    /// Point-in-time availability, bounded by the inventory timeout.
    async fn lookup(&self, key: &ItemKey) -> Result<ProductAvailability, CartError> {
        let timeout = self.config.timeouts.for_tag(DependencyTag::Inventory);
        call_with_timeout(DependencyTag::Inventory, timeout, self.catalog.lookup(key))
            .await
            .map_err(CartError::from)
    }

    /// Per-line bound for a product.
    fn max_quantity(&self, availability: &ProductAvailability) -> i64 {
        availability
            .max_quantity
            .filter(|max| *max > 0)
            .unwrap_or(self.config.default_max_quantity)
    }

    /// Lock a cart by id and load it, checking owner and status.
    async fn lock_owned(
        &self,
        owner: &CartOwner,
        cart_id: &CartId,
    ) -> Result<(CartGuard, Cart), CartError> {
        let guard = self.locks.lock(cart_id).await;
        let cart = match self.store.find_with_items(cart_id).await {
            Ok(cart) => cart,
            Err(StoreError::CartNotFound(id)) => {
                drop(guard);
                self.locks.forget(cart_id);
                return Err(CartError::CartNotFound(id));
            }
            Err(e) => return Err(e.into()),
        };
        if &cart.owner != owner {
            return Err(CartError::Unauthorized(format!("cart {cart_id}")));
        }
        if !cart.is_active() {
            return Err(CartError::CartNotActive {
                cart_id: cart.id,
                status: cart.status,
            });
        }
        Ok((guard, cart))
    }

    /// Lock the owner's active cart, creating it if needed.
    ///
    /// If the cart is retired or reassigned while we wait for its lock, the
    /// owner's current cart is looked up again.
    async fn lock_current(&self, owner: &CartOwner) -> Result<(CartGuard, Cart), CartError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let cart = self.get_or_create_cart(owner).await?;
            match self.lock_owned(owner, &cart.id).await {
                Err(CartError::CartNotActive { .. } | CartError::Unauthorized(_))
                    if attempts < 3 =>
                {
                    continue
                }
                result => return result,
            }
        }
    }

    /// Error for an item id that is not in the caller's cart.
    async fn missing_item(&self, cart_id: &CartId, item_id: &CartItemId) -> CartError {
        match self.store.find_item_by_id(item_id).await {
            Ok(location) if &location.cart_id != cart_id => {
                CartError::Unauthorized(format!("cart item {item_id}"))
            }
            Ok(_) | Err(StoreError::ItemNotFound(_)) => CartError::CartItemNotFound(item_id.clone()),
            Err(e) => e.into(),
        }
    }
}

/// Reject a catalog price in another currency than the cart.
fn ensure_currency(cart: &Cart, price: &Money) -> Result<(), CartError> {
    if price.currency != cart.currency {
        return Err(CartError::Domain(CommerceError::CurrencyMismatch {
            expected: cart.currency.code().to_string(),
            got: price.currency.code().to_string(),
        }));
    }
    Ok(())
}

/// Mark a line as available at its current snapshot.
fn refresh_availability(line: &mut CartItem, now: DateTime<Utc>) {
    line.is_available = true;
    line.availability_message = None;
    line.updated_at = now;
}

impl std::fmt::Debug for CartEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartEngine")
            .field("config", &self.config)
            .field("locks", &self.locks.len())
            .finish_non_exhaustive()
    }
}

//! Cart lookup, checkout readiness, conversion and expiry.

use tracing::{info, warn};
use turbo_commerce::cart::{calculate_totals, Cart, CartOwner, CartStatus, CartTotals, CheckoutValidation};
use turbo_commerce::ids::CartId;

use super::{CartEngine, CleanupReport};
use crate::store::{CartStatistics, StoreError};
use crate::CartError;

impl CartEngine {
    /// The owner's active cart, created empty on first use.
    pub async fn get_or_create_cart(&self, owner: &CartOwner) -> Result<Cart, CartError> {
        if let Some(cart) = self.store.find_by_owner(owner).await? {
            return Ok(cart);
        }

        let ctx = self.write_context();
        match self
            .store
            .create(owner, self.config.default_currency, &ctx)
            .await
        {
            Ok(cart) => {
                info!(cart_id = %cart.id, owner = %owner, "cart created");
                Ok(cart)
            }
            // Lost a creation race; the winner's cart is the owner's cart.
            Err(StoreError::DuplicateOwner(_)) => {
                self.store.find_by_owner(owner).await?.ok_or_else(|| {
                    CartError::Storage(StoreError::Backend(format!(
                        "cart for {owner} vanished during creation"
                    )))
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The owner's active cart, if any.
    pub async fn find_cart(&self, owner: &CartOwner) -> Result<Option<Cart>, CartError> {
        Ok(self.store.find_by_owner(owner).await?)
    }

    /// Totals for the owner's cart under the engine's pricing rules.
    ///
    /// Pure computation; nothing is written.
    pub async fn calculate_totals(&self, owner: &CartOwner) -> Result<CartTotals, CartError> {
        match self.store.find_by_owner(owner).await? {
            Some(cart) => Ok(calculate_totals(
                &cart.items,
                &cart.applied_coupons,
                cart.currency,
                &self.config.pricing,
            )?),
            None => Ok(CartTotals::zero(self.config.default_currency)),
        }
    }

    /// Check every active line against current availability.
    ///
    /// Problems with lines are reported in the result. A collaborator
    /// failure is an error, never a pass.
    pub async fn validate_cart_for_checkout(
        &self,
        owner: &CartOwner,
    ) -> Result<CheckoutValidation, CartError> {
        let Some(cart) = self.store.find_by_owner(owner).await? else {
            return Ok(CheckoutValidation::empty_cart());
        };
        if cart.is_empty() {
            return Ok(CheckoutValidation::empty_cart());
        }

        let mut errors = Vec::new();
        for line in &cart.items {
            let name = line.snapshot.name.as_str();
            match self.lookup(&line.key()).await {
                Ok(availability) if !availability.is_active => {
                    errors.push(CheckoutValidation::out_of_stock(name));
                }
                Ok(availability) => {
                    let available = availability.sellable();
                    if available == 0 {
                        errors.push(CheckoutValidation::out_of_stock(name));
                    } else if line.quantity > available {
                        errors.push(CheckoutValidation::insufficient_stock(
                            name,
                            available,
                            line.quantity,
                        ));
                    }
                }
                Err(CartError::ProductNotFound(_)) => {
                    errors.push(CheckoutValidation::out_of_stock(name));
                }
                Err(e) => return Err(e),
            }
        }

        let validation = CheckoutValidation::from_errors(errors);
        if !validation.is_valid {
            info!(cart_id = %cart.id, problems = validation.errors.len(), "cart not ready for checkout");
        }
        Ok(validation)
    }

    /// Mark a cart as turned into an order. Converted carts are never
    /// reclaimed by the expiry sweep.
    pub async fn mark_converted(&self, cart_id: &CartId) -> Result<Cart, CartError> {
        let _guard = self.locks.lock(cart_id).await;
        let ctx = self.write_context();
        let cart = self
            .store
            .set_status(cart_id, CartStatus::Converted, &ctx)
            .await?;
        info!(cart_id = %cart_id, owner = %cart.owner, "cart converted");
        Ok(cart)
    }

    /// Reclaim active carts past their deadline, up to the configured
    /// batch size.
    ///
    /// Each cart is re-checked under its lock, so a cart touched after it
    /// was listed survives.
    pub async fn cleanup_expired_carts(&self) -> Result<CleanupReport, CartError> {
        let now = self.now();
        let candidates = self
            .store
            .list_expired(now, self.config.sweep.batch_size)
            .await?;

        let mut report = CleanupReport {
            scanned: candidates.len(),
            ..CleanupReport::default()
        };
        for cart_id in &candidates {
            let _guard = self.locks.lock(cart_id).await;
            match self.store.delete_if_expired(cart_id, now).await {
                Ok(true) => report.expired += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(cart_id = %cart_id, error = %e, "failed to reclaim expired cart");
                    report.failed += 1;
                }
            }
        }
        self.locks.prune();

        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                expired = report.expired,
                failed = report.failed,
                "expired carts reclaimed"
            );
        }
        Ok(report)
    }

    /// Aggregate counts over every stored cart.
    pub async fn statistics(&self) -> Result<CartStatistics, CartError> {
        Ok(self.store.statistics(self.now()).await?)
    }
}

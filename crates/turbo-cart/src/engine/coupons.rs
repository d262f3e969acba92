//! Coupon application.

use tracing::{debug, info};
use turbo_commerce::cart::{AppliedCoupon, Cart, CartOwner, CouponCode};
use turbo_commerce::ids::CartId;

use super::CartEngine;
use crate::gateway::{call_with_timeout, DependencyTag, GatewayError};
use crate::store::CartChange;
use crate::CartError;

fn parse_code(raw: &str) -> Result<CouponCode, CartError> {
    CouponCode::parse(raw).map_err(|_| CartError::CouponValidationFailed {
        code: raw.trim().to_string(),
        reason: "malformed coupon code".into(),
    })
}

impl CartEngine {
    /// Validate a coupon with the coupon service and add it to the cart.
    ///
    /// Applying a code the cart already has is a no-op and does not call
    /// the service.
    pub async fn apply_coupon(
        &self,
        owner: &CartOwner,
        cart_id: &CartId,
        raw_code: &str,
    ) -> Result<Cart, CartError> {
        let code = parse_code(raw_code)?;
        let (_guard, cart) = self.lock_owned(owner, cart_id).await?;
        if cart.has_coupon(&code) {
            debug!(cart_id = %cart_id, code = %code, "coupon already applied");
            return Ok(cart);
        }

        let timeout = self.config.timeouts.for_tag(DependencyTag::Coupons);
        let grant = call_with_timeout(
            DependencyTag::Coupons,
            timeout,
            self.coupons.validate(&code, &cart),
        )
        .await
        .map_err(|err| match err {
            GatewayError::Rejected(reason) => CartError::CouponValidationFailed {
                code: code.to_string(),
                reason,
            },
            other => CartError::from(other),
        })?;

        let ctx = self.write_context();
        let coupon = AppliedCoupon {
            code: code.clone(),
            description: grant.description,
            value: grant.value,
            applied_at: ctx.now,
        };
        let cart = self
            .store
            .apply_changes(cart_id, vec![CartChange::AddCoupon(coupon)], &ctx)
            .await?;
        info!(cart_id = %cart_id, code = %code, discount = %cart.totals.discount_amount, "coupon applied");
        Ok(cart)
    }

    /// Remove a coupon. Removing a code that is not applied is a no-op.
    pub async fn remove_coupon(
        &self,
        owner: &CartOwner,
        cart_id: &CartId,
        raw_code: &str,
    ) -> Result<Cart, CartError> {
        let code = parse_code(raw_code)?;
        let (_guard, cart) = self.lock_owned(owner, cart_id).await?;
        if !cart.has_coupon(&code) {
            return Ok(cart);
        }

        let ctx = self.write_context();
        let cart = self
            .store
            .apply_changes(cart_id, vec![CartChange::RemoveCoupon(code.clone())], &ctx)
            .await?;
        debug!(cart_id = %cart_id, code = %code, "coupon removed");
        Ok(cart)
    }
}

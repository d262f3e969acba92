//! Request dispatch: identity, rate limit, policy, engine.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info_span, warn, Instrument};
use turbo_auth::{authorize, resolve_identity, Identity, IdentityResolver};
use turbo_cart::{AddItemRequest, CartEngine};
use turbo_commerce::cart::CartOwner;
use turbo_ratelimit::{FixedWindowLimiter, RateLimitDecision, RateLimitKey};

use crate::{ApiError, ApiResponse, CartRequest, RequestContext};

/// Client address used when a request carries none.
const UNKNOWN_CLIENT: &str = "unknown";

/// The cart service behind whatever transport carries requests.
///
/// Every request goes through the same steps: resolve the caller, count it
/// against the caller's rate limit window, check the capability policy,
/// then call the engine.
#[derive(Clone)]
pub struct CartApi {
    engine: Arc<CartEngine>,
    resolver: Arc<dyn IdentityResolver>,
    limiter: FixedWindowLimiter,
}

impl CartApi {
    pub fn new(
        engine: Arc<CartEngine>,
        resolver: Arc<dyn IdentityResolver>,
        limiter: FixedWindowLimiter,
    ) -> Self {
        Self {
            engine,
            resolver,
            limiter,
        }
    }

    pub fn engine(&self) -> &Arc<CartEngine> {
        &self.engine
    }

    /// Handle a raw JSON request body.
    pub async fn handle_json(&self, ctx: RequestContext, body: &str) -> ApiResponse {
        match CartRequest::from_json(body) {
            Ok(request) => self.handle(ctx, request).await,
            Err(e) => {
                debug!(request_id = %ctx.request_id, error = %e, "rejected malformed request");
                ApiResponse::from_error(&e).with_header("X-Request-Id", ctx.request_id.to_string())
            }
        }
    }

    /// Handle a typed request.
    pub async fn handle(&self, ctx: RequestContext, request: CartRequest) -> ApiResponse {
        let span = info_span!("cart_request", request_id = %ctx.request_id, op = request.name());
        async move {
            let (result, decision) = self.process(&ctx, request).await;
            let response = match result {
                Ok(data) => ApiResponse::ok(data),
                Err(e) => {
                    if e.is_internal() {
                        error!(error = ?e, "request failed");
                    } else {
                        debug!(code = e.code(), error = %e, "request rejected");
                    }
                    ApiResponse::from_error(&e)
                }
            };

            let mut response = response.with_header("X-Request-Id", ctx.request_id.to_string());
            if let Some(decision) = decision {
                for (name, value) in decision.headers() {
                    response = response.with_header(name, value);
                }
            }
            response
        }
        .instrument(span)
        .await
    }

    async fn process(
        &self,
        ctx: &RequestContext,
        request: CartRequest,
    ) -> (Result<Value, ApiError>, Option<RateLimitDecision>) {
        if let Err(e) = request.validate() {
            return (Err(e), None);
        }
        let identity = match resolve_identity(self.resolver.as_ref(), &ctx.credentials).await {
            Ok(identity) => identity,
            Err(e) => return (Err(e.into()), None),
        };

        let key = rate_limit_key(&identity, ctx);
        let decision = self.limiter.check(&key).await;
        if !decision.allowed {
            warn!(key = %key, limit = decision.limit, "rate limit exceeded");
            let err = ApiError::RateLimited {
                retry_after: decision.reset_after,
            };
            return (Err(err), Some(decision));
        }

        let result = match authorize(&identity, request.action()) {
            Ok(()) => self.dispatch(&identity, request).await,
            Err(e) => Err(e.into()),
        };
        (result, Some(decision))
    }

    async fn dispatch(&self, identity: &Identity, request: CartRequest) -> Result<Value, ApiError> {
        let engine = &self.engine;
        match request {
            CartRequest::GetCart => to_data(engine.get_or_create_cart(&owner(identity)?).await?),
            CartRequest::AddItem {
                product_id,
                variant_id,
                quantity,
                snapshot,
            } => {
                let add = AddItemRequest {
                    product_id,
                    variant_id,
                    quantity,
                    snapshot,
                };
                to_data(engine.add_item(&owner(identity)?, add).await?)
            }
            CartRequest::UpdateItemQuantity {
                cart_id,
                item_id,
                quantity,
            } => to_data(
                engine
                    .update_item_quantity(&owner(identity)?, &cart_id, &item_id, quantity)
                    .await?,
            ),
            CartRequest::RemoveItem { cart_id, item_id } => {
                to_data(engine.remove_item(&owner(identity)?, &cart_id, &item_id).await?)
            }
            CartRequest::SaveForLater { cart_id, item_id } => {
                to_data(engine.save_for_later(&owner(identity)?, &cart_id, &item_id).await?)
            }
            CartRequest::MoveToCart {
                cart_id,
                saved_item_id,
                quantity,
            } => to_data(
                engine
                    .move_to_cart(&owner(identity)?, &cart_id, &saved_item_id, quantity)
                    .await?,
            ),
            CartRequest::ClearCart { cart_id } => {
                to_data(engine.clear_cart(&owner(identity)?, &cart_id).await?)
            }
            CartRequest::ApplyCoupon {
                cart_id,
                coupon_code,
            } => to_data(
                engine
                    .apply_coupon(&owner(identity)?, &cart_id, &coupon_code)
                    .await?,
            ),
            CartRequest::RemoveCoupon {
                cart_id,
                coupon_code,
            } => to_data(
                engine
                    .remove_coupon(&owner(identity)?, &cart_id, &coupon_code)
                    .await?,
            ),
            CartRequest::ValidateCheckout => {
                to_data(engine.validate_cart_for_checkout(&owner(identity)?).await?)
            }
            CartRequest::CalculateTotals => {
                to_data(engine.calculate_totals(&owner(identity)?).await?)
            }
            CartRequest::MergeGuestCart { session_id } => {
                let user_id = identity.user_id().ok_or_else(|| {
                    ApiError::Unauthenticated("merging a guest cart needs a signed-in user".into())
                })?;
                to_data(engine.merge_guest_cart(&session_id, user_id).await?)
            }
            CartRequest::MarkConverted { cart_id } => to_data(engine.mark_converted(&cart_id).await?),
            CartRequest::Statistics => to_data(engine.statistics().await?),
            CartRequest::CleanupExpired => to_data(engine.cleanup_expired_carts().await?),
        }
    }
}

fn owner(identity: &Identity) -> Result<CartOwner, ApiError> {
    identity
        .cart_owner()
        .ok_or_else(|| ApiError::Unauthenticated("no caller identity supplied".into()))
}

/// Authenticated user first, then session, then client address.
fn rate_limit_key(identity: &Identity, ctx: &RequestContext) -> RateLimitKey {
    match identity {
        Identity::User(principal) => RateLimitKey::User(principal.user_id.clone()),
        Identity::Guest(session_id) => RateLimitKey::Session(session_id.clone()),
        Identity::Anonymous => RateLimitKey::Ip(
            ctx.credentials
                .client_ip
                .clone()
                .filter(|ip| !ip.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_CLIENT.to_string()),
        ),
    }
}

fn to_data<T: Serialize>(value: T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::Internal(format!("serialize response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use turbo_auth::{Credentials, Principal};
    use turbo_commerce::ids::{SessionId, UserId};

    #[test]
    fn test_rate_limit_key_prefers_user() {
        let ctx = RequestContext::new(Credentials::session("s1").with_client_ip("10.0.0.1"));

        let user = Identity::User(Principal::customer(UserId::new("u1")));
        assert_eq!(rate_limit_key(&user, &ctx), RateLimitKey::User(UserId::new("u1")));

        let guest = Identity::Guest(SessionId::new("s1"));
        assert_eq!(rate_limit_key(&guest, &ctx), RateLimitKey::Session(SessionId::new("s1")));

        assert_eq!(
            rate_limit_key(&Identity::Anonymous, &ctx),
            RateLimitKey::Ip("10.0.0.1".into())
        );
        let bare = RequestContext::new(Credentials::default());
        assert_eq!(
            rate_limit_key(&Identity::Anonymous, &bare),
            RateLimitKey::Ip(UNKNOWN_CLIENT.into())
        );
    }
}

//! In-memory collaborators for single-process use and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use turbo_commerce::cart::{Cart, CouponCode, DiscountValue, ItemKey};
use turbo_commerce::ids::ProductId;
use turbo_commerce::money::Money;

use super::{
    AvailabilityGateway, CouponGrant, CouponValidator, DependencyTag, GatewayError,
    ProductAvailability,
};

/// Catalog held in a map, with knobs to simulate a slow or failing service.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<ItemKey, ProductAvailability>>,
    delay: RwLock<Option<Duration>>,
    fail_on_lookup: RwLock<bool>,
    lookups: AtomicUsize,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a product or variant.
    pub async fn upsert(&self, key: ItemKey, availability: ProductAvailability) {
        self.products.write().await.insert(key, availability);
    }

    /// Insert or replace a product without variants.
    pub async fn set_product(&self, product_id: ProductId, availability: ProductAvailability) {
        self.upsert(ItemKey::new(product_id, None), availability).await;
    }

    /// Change stock for every entry of a product.
    pub async fn set_stock(&self, product_id: &ProductId, stock: i64) {
        let mut products = self.products.write().await;
        for (key, availability) in products.iter_mut() {
            if &key.product_id == product_id {
                availability.stock = stock;
            }
        }
    }

    /// Change the active flag for every entry of a product.
    pub async fn set_active(&self, product_id: &ProductId, is_active: bool) {
        let mut products = self.products.write().await;
        for (key, availability) in products.iter_mut() {
            if &key.product_id == product_id {
                availability.is_active = is_active;
            }
        }
    }

    /// Delay every lookup.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write().await = delay;
    }

    pub async fn set_fail_on_lookup(&self, fail: bool) {
        *self.fail_on_lookup.write().await = fail;
    }

    /// Number of lookups served so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AvailabilityGateway for InMemoryCatalog {
    async fn lookup(&self, key: &ItemKey) -> Result<ProductAvailability, GatewayError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        if *self.fail_on_lookup.read().await {
            return Err(GatewayError::Unavailable {
                dependency: DependencyTag::Inventory,
                reason: "catalog offline".into(),
            });
        }
        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let products = self.products.read().await;
        products
            .get(key)
            .or_else(|| products.get(&ItemKey::new(key.product_id.clone(), None)))
            .cloned()
            .ok_or_else(|| GatewayError::ProductNotFound(key.product_id.clone()))
    }
}

/// A coupon the in-memory validator knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponRule {
    pub description: String,
    pub value: DiscountValue,
    /// Subtotal the cart must reach, in minor units.
    #[serde(default)]
    pub min_subtotal_cents: Option<i64>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Coupon rules held in a map.
#[derive(Debug, Default)]
pub struct InMemoryCoupons {
    rules: RwLock<HashMap<CouponCode, CouponRule>>,
    fail_on_validate: RwLock<bool>,
}

impl InMemoryCoupons {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a rule.
    pub async fn insert(&self, code: CouponCode, rule: CouponRule) {
        self.rules.write().await.insert(code, rule);
    }

    pub async fn set_fail_on_validate(&self, fail: bool) {
        *self.fail_on_validate.write().await = fail;
    }
}

#[async_trait]
impl CouponValidator for InMemoryCoupons {
    async fn validate(&self, code: &CouponCode, cart: &Cart) -> Result<CouponGrant, GatewayError> {
        if *self.fail_on_validate.read().await {
            return Err(GatewayError::Unavailable {
                dependency: DependencyTag::Coupons,
                reason: "coupon service offline".into(),
            });
        }

        let rules = self.rules.read().await;
        let rule = rules
            .get(code)
            .ok_or_else(|| GatewayError::Rejected("unknown coupon code".into()))?;

        if !rule.active {
            return Err(GatewayError::Rejected("coupon is no longer active".into()));
        }
        if let DiscountValue::Fixed { amount } = &rule.value {
            if amount.currency != cart.currency {
                return Err(GatewayError::Rejected(
                    "coupon currency does not match cart".into(),
                ));
            }
        }
        if let Some(min) = rule.min_subtotal_cents {
            if cart.totals.subtotal.amount_cents < min {
                return Err(GatewayError::Rejected(format!(
                    "minimum subtotal of {} not met",
                    Money::new(min, cart.currency)
                )));
            }
        }

        Ok(CouponGrant {
            description: rule.description.clone(),
            value: rule.value.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turbo_commerce::ids::VariantId;
    use turbo_commerce::money::Currency;

    fn available(price: i64, stock: i64) -> ProductAvailability {
        ProductAvailability {
            price: Money::new(price, Currency::USD),
            stock,
            is_active: true,
            max_quantity: None,
        }
    }

    #[tokio::test]
    async fn test_variant_falls_back_to_product() {
        let catalog = InMemoryCatalog::new();
        catalog.set_product(ProductId::new("p1"), available(100, 5)).await;
        catalog
            .upsert(
                ItemKey::new(ProductId::new("p1"), Some(VariantId::new("red"))),
                available(150, 1),
            )
            .await;

        let red = ItemKey::new(ProductId::new("p1"), Some(VariantId::new("red")));
        let blue = ItemKey::new(ProductId::new("p1"), Some(VariantId::new("blue")));
        assert_eq!(catalog.lookup(&red).await.unwrap().price.amount_cents, 150);
        assert_eq!(catalog.lookup(&blue).await.unwrap().price.amount_cents, 100);
        assert_eq!(catalog.lookup_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let catalog = InMemoryCatalog::new();
        let key = ItemKey::new(ProductId::new("nope"), None);
        assert_eq!(
            catalog.lookup(&key).await,
            Err(GatewayError::ProductNotFound(ProductId::new("nope")))
        );
    }

    #[tokio::test]
    async fn test_set_stock_and_active() {
        let catalog = InMemoryCatalog::new();
        let id = ProductId::new("p1");
        catalog.set_product(id.clone(), available(100, 5)).await;
        catalog.set_stock(&id, 1).await;
        catalog.set_active(&id, false).await;

        let found = catalog.lookup(&ItemKey::new(id, None)).await.unwrap();
        assert_eq!(found.stock, 1);
        assert!(!found.is_active);
    }
}

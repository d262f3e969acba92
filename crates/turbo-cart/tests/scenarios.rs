//! End-to-end cart flows against the in-memory store and collaborators.

use std::sync::Arc;
use std::time::Duration;

use turbo_cart::{
    AddItemRequest, CartConfig, CartEngine, CartError, DependencyTag, ErrorKind, InMemoryCatalog,
    InMemoryCoupons, ManualClock, MemoryCartStore, MergeStrategy, ProductAvailability,
};
use turbo_commerce::cart::{CartOwner, ItemKey};
use turbo_commerce::ids::ProductId;
use turbo_commerce::money::{Currency, Money};

struct Shop {
    engine: CartEngine,
    catalog: Arc<InMemoryCatalog>,
    clock: Arc<ManualClock>,
}

fn shop() -> Shop {
    let catalog = Arc::new(InMemoryCatalog::new());
    let clock = Arc::new(ManualClock::default());
    let engine = CartEngine::new(
        CartConfig::default(),
        Arc::new(MemoryCartStore::new()),
        catalog.clone(),
        Arc::new(InMemoryCoupons::new()),
    )
    .with_clock(clock.clone());
    Shop {
        engine,
        catalog,
        clock,
    }
}

fn priced(price: i64, stock: i64) -> ProductAvailability {
    ProductAvailability {
        price: Money::new(price, Currency::USD),
        stock,
        is_active: true,
        max_quantity: None,
    }
}

#[tokio::test]
async fn test_totals_follow_lines() {
    let shop = shop();
    shop.catalog.set_product("a".into(), priced(100_000, 10)).await;
    shop.catalog.set_product("b".into(), priced(50_000, 10)).await;
    let owner = CartOwner::User("u1".into());

    shop.engine.add_item(&owner, AddItemRequest::new("a", 2)).await.unwrap();
    let cart = shop.engine.add_item(&owner, AddItemRequest::new("b", 1)).await.unwrap();

    assert_eq!(cart.totals.subtotal.amount_cents, 250_000);
    assert_eq!(cart.totals.total_items, 3);
    assert_eq!(cart.totals.item_count, 2);
    assert!(cart.totals.is_consistent());
}

#[tokio::test]
async fn test_add_beyond_stock_creates_nothing() {
    let shop = shop();
    shop.catalog.set_product("p1".into(), priced(100, 3)).await;
    let owner = CartOwner::Session("s1".into());

    let err = shop
        .engine
        .add_item(&owner, AddItemRequest::new("p1", 5))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        CartError::InsufficientStock {
            product_id: ProductId::new("p1"),
            available: 3,
            requested: 5,
        }
    );
    assert_eq!(err.kind(), ErrorKind::Conflict);
    let cart = shop.engine.get_or_create_cart(&owner).await.unwrap();
    assert!(cart.items.is_empty());
}

#[tokio::test]
async fn test_merge_never_exceeds_stock() {
    let shop = shop();
    shop.catalog.set_product("x".into(), priced(100, 2)).await;
    shop.engine
        .add_item(&CartOwner::User("u1".into()), AddItemRequest::new("x", 2))
        .await
        .unwrap();
    shop.engine
        .add_item(&CartOwner::Session("s1".into()), AddItemRequest::new("x", 1))
        .await
        .unwrap();

    let outcome = shop
        .engine
        .merge_guest_cart(&"s1".into(), &"u1".into())
        .await
        .unwrap();

    assert_eq!(outcome.strategy, MergeStrategy::Merged);
    let line = outcome
        .cart
        .get_item_by_key(&ItemKey::new("x".into(), None))
        .unwrap();
    assert_eq!(line.quantity, 2);
}

#[tokio::test]
async fn test_sign_in_flow_keeps_guest_lines() {
    let shop = shop();
    shop.catalog.set_product("p1".into(), priced(1_500, 10)).await;
    let shopper = CartOwner::Session("s1".into());
    let member = CartOwner::User("u1".into());

    let guest_cart = shop
        .engine
        .add_item(&shopper, AddItemRequest::new("p1", 2))
        .await
        .unwrap();
    let outcome = shop
        .engine
        .merge_guest_cart(&"s1".into(), &"u1".into())
        .await
        .unwrap();

    assert_eq!(outcome.strategy, MergeStrategy::Reassigned);
    assert_eq!(outcome.cart.id, guest_cart.id);

    // The old identity no longer reaches the cart.
    let err = shop
        .engine
        .clear_cart(&shopper, &guest_cart.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CartError::Unauthorized(_)));

    let cart = shop
        .engine
        .add_item(&member, AddItemRequest::new("p1", 1))
        .await
        .unwrap();
    assert_eq!(cart.id, guest_cart.id);
    assert_eq!(cart.items[0].quantity, 3);
}

#[tokio::test]
async fn test_converted_cart_survives_expiry() {
    let shop = shop();
    shop.catalog.set_product("p1".into(), priced(100, 10)).await;
    let owner = CartOwner::Session("s1".into());
    let cart = shop
        .engine
        .add_item(&owner, AddItemRequest::new("p1", 1))
        .await
        .unwrap();
    shop.engine.mark_converted(&cart.id).await.unwrap();

    shop.clock.advance(chrono::Duration::days(30));
    let report = shop.engine.cleanup_expired_carts().await.unwrap();

    assert_eq!(report.scanned, 0);
    let stats = shop.engine.statistics().await.unwrap();
    assert_eq!(stats.converted_carts, 1);
    assert_eq!(stats.expired_purged, 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_catalog_times_out_without_writing() {
    let shop = shop();
    shop.catalog.set_product("p1".into(), priced(100, 10)).await;
    shop.catalog.set_delay(Some(Duration::from_secs(5))).await;
    let owner = CartOwner::User("u1".into());

    let err = shop
        .engine
        .add_item(&owner, AddItemRequest::new("p1", 1))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CartError::DependencyUnavailable {
            dependency: DependencyTag::Inventory,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    // One attempt only.
    assert_eq!(shop.catalog.lookup_count(), 1);
    let cart = shop.engine.find_cart(&owner).await.unwrap().unwrap();
    assert!(cart.items.is_empty());
}

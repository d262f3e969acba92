//! Shopping cart engine for TurboCommerce.
//!
//! Builds on the domain types in `turbo-commerce` and adds everything with
//! I/O or concurrency in it:
//!
//! - **Store**: [`CartStore`] persistence with atomic multi-row changes
//! - **Gateway**: product availability and coupon collaborators, each
//!   behind its own timeout
//! - **Engine**: [`CartEngine`] operations, serialized per cart
//! - **Sweeper**: background reclaim of expired carts
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use turbo_cart::{AddItemRequest, CartConfig, CartEngine, InMemoryCatalog, InMemoryCoupons, MemoryCartStore};
//!
//! let engine = CartEngine::new(
//!     CartConfig::default(),
//!     Arc::new(MemoryCartStore::new()),
//!     Arc::new(InMemoryCatalog::new()),
//!     Arc::new(InMemoryCoupons::new()),
//! );
//! let cart = engine.add_item(&owner, AddItemRequest::new("sku-1", 2)).await?;
//! ```

mod clock;
mod config;
mod engine;
mod error;
pub mod gateway;
mod locks;
pub mod store;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CartConfig, CartConfigError, DependencyTimeouts, SweepConfig, MAX_TTL_SECS};
pub use engine::{AddItemRequest, CartEngine, CleanupReport, MergeOutcome, MergeStrategy};
pub use error::{CartError, ErrorKind};
pub use gateway::{
    AvailabilityGateway, CouponGrant, CouponRule, CouponValidator, DependencyTag, GatewayError,
    InMemoryCatalog, InMemoryCoupons, ProductAvailability,
};
pub use locks::{CartGuard, CartLocks};
pub use store::{CartStatistics, CartStore, MemoryCartStore, StoreError};
pub use sweeper::CartSweeper;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        AddItemRequest, CartConfig, CartEngine, CartError, CartStore, ErrorKind, MergeOutcome,
        MergeStrategy,
    };
}

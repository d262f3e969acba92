//! Key-value store layer for TurboCommerce.
//!
//! Everything that needs shared ephemeral state (rate limit windows, for
//! now) is written against [`KvStore`], so the process-local [`MemoryKv`]
//! can be swapped for a shared backend.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use turbo_cache::{KvStore, MemoryKv};
//!
//! let kv = MemoryKv::new();
//! kv.set("greeting", b"hello".to_vec(), Some(Duration::from_secs(30))).await?;
//! let counter = kv.increment("hits", Duration::from_secs(60)).await?;
//! assert_eq!(counter.count, 1);
//! ```

mod error;
mod kv;
mod reaper;

pub use error::CacheError;
pub use kv::{KvStore, MemoryKv, WindowCounter};
pub use reaper::ExpiryReaper;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{CacheError, KvStore, MemoryKv, WindowCounter};
}

//! Fixed-window rate limiting keyed by resolved identity.
//!
//! Windows live in an injected [`turbo_cache::KvStore`], so the limiter
//! works the same over a process-local map or a shared cache.

mod config;
mod limiter;

pub use config::{RateLimitConfig, RateLimitError};
pub use limiter::{FixedWindowLimiter, RateLimitDecision, RateLimitKey};

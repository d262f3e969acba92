//! Fixed-window limiter.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use turbo_cache::{cache_key, KvStore};
use turbo_commerce::ids::{SessionId, UserId};
use tracing::warn;

use crate::RateLimitConfig;

/// Identity a request is counted against.
///
/// Authenticated user first, then session, then client IP.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateLimitKey {
    User(UserId),
    Session(SessionId),
    Ip(String),
}

impl RateLimitKey {
    fn storage_key(&self) -> String {
        match self {
            RateLimitKey::User(id) => cache_key!("ratelimit", "user", id),
            RateLimitKey::Session(id) => cache_key!("ratelimit", "session", id),
            RateLimitKey::Ip(ip) => cache_key!("ratelimit", "ip", ip),
        }
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitKey::User(id) => write!(f, "user:{id}"),
            RateLimitKey::Session(id) => write!(f, "session:{id}"),
            RateLimitKey::Ip(ip) => write!(f, "ip:{ip}"),
        }
    }
}

/// Result of checking one request against its window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window resets.
    pub reset_after: Duration,
    /// Set when the store failed and the request was admitted anyway.
    pub fail_open: bool,
}

impl RateLimitDecision {
    fn unlimited(config: &RateLimitConfig) -> Self {
        Self {
            allowed: true,
            limit: config.requests_per_window,
            remaining: config.requests_per_window,
            reset_after: config.window(),
            fail_open: false,
        }
    }

    /// Standard limit metadata as header name/value pairs.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let reset = self.reset_after.as_secs().to_string();
        let mut headers = vec![
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
            ("X-RateLimit-Reset", reset.clone()),
        ];
        if !self.allowed {
            headers.push(("Retry-After", reset));
        }
        headers
    }
}

/// Fixed-window counter per identity over a [`KvStore`].
///
/// Windows are process-local when the store is; counts across instances
/// are best effort.
#[derive(Clone)]
pub struct FixedWindowLimiter {
    store: Arc<dyn KvStore>,
    config: RateLimitConfig,
}

impl FixedWindowLimiter {
    /// Create a new limiter.
    pub fn new(store: Arc<dyn KvStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count a request and decide whether to admit it.
    ///
    /// Store errors admit the request.
    pub async fn check(&self, key: &RateLimitKey) -> RateLimitDecision {
        if !self.config.enabled {
            return RateLimitDecision::unlimited(&self.config);
        }

        let limit = self.config.requests_per_window;
        match self
            .store
            .increment(&key.storage_key(), self.config.window())
            .await
        {
            Ok(counter) => {
                let used = u32::try_from(counter.count).unwrap_or(u32::MAX);
                RateLimitDecision {
                    allowed: used <= limit,
                    limit,
                    remaining: limit.saturating_sub(used),
                    reset_after: counter.ttl_remaining,
                    fail_open: false,
                }
            }
            Err(e) => {
                warn!(key = %key, error = %e, "rate limit store failed, admitting request");
                RateLimitDecision {
                    fail_open: true,
                    ..RateLimitDecision::unlimited(&self.config)
                }
            }
        }
    }
}

impl fmt::Debug for FixedWindowLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedWindowLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use turbo_cache::{CacheError, MemoryKv, WindowCounter};

    fn limiter(limit: u32, window_secs: u64) -> FixedWindowLimiter {
        FixedWindowLimiter::new(
            Arc::new(MemoryKv::new()),
            RateLimitConfig::default()
                .with_limit(limit)
                .with_window(Duration::from_secs(window_secs)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_exhausts_and_resets() {
        let limiter = limiter(2, 60);
        let key = RateLimitKey::User(UserId::new("u1"));

        let first = limiter.check(&key).await;
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);
        assert!(limiter.check(&key).await.allowed);

        let third = limiter.check(&key).await;
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(limiter.check(&key).await.allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let limiter = limiter(1, 60);
        let user = RateLimitKey::User(UserId::new("same"));
        let session = RateLimitKey::Session(SessionId::new("same"));

        assert!(limiter.check(&user).await.allowed);
        assert!(!limiter.check(&user).await.allowed);
        assert!(limiter.check(&session).await.allowed);
        assert!(limiter.check(&RateLimitKey::Ip("10.0.0.1".into())).await.allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_reports_time_left() {
        let limiter = limiter(5, 60);
        let key = RateLimitKey::Ip("10.0.0.1".into());

        limiter.check(&key).await;
        tokio::time::advance(Duration::from_secs(15)).await;
        let decision = limiter.check(&key).await;
        assert_eq!(decision.reset_after, Duration::from_secs(45));
    }

    #[tokio::test]
    async fn test_disabled_admits_everything() {
        let limiter = FixedWindowLimiter::new(
            Arc::new(MemoryKv::new()),
            RateLimitConfig {
                enabled: false,
                ..RateLimitConfig::default().with_limit(1)
            },
        );
        let key = RateLimitKey::Ip("1.1.1.1".into());
        for _ in 0..5 {
            assert!(limiter.check(&key).await.allowed);
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl KvStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn set(
            &self,
            _key: &str,
            _value: Vec<u8>,
            _ttl: Option<Duration>,
        ) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn exists(&self, _key: &str) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn increment(&self, _key: &str, _ttl: Duration) -> Result<WindowCounter, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn purge_expired(&self) -> Result<usize, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_fails_open() {
        let limiter = FixedWindowLimiter::new(
            Arc::new(BrokenStore),
            RateLimitConfig::default().with_limit(1),
        );
        let key = RateLimitKey::Ip("10.0.0.1".into());
        for _ in 0..3 {
            let decision = limiter.check(&key).await;
            assert!(decision.allowed);
            assert!(decision.fail_open);
        }
    }

    #[test]
    fn test_denied_headers_include_retry_after() {
        let decision = RateLimitDecision {
            allowed: false,
            limit: 10,
            remaining: 0,
            reset_after: Duration::from_secs(30),
            fail_open: false,
        };
        let headers = decision.headers();
        assert!(headers.contains(&("X-RateLimit-Limit", "10".to_string())));
        assert!(headers.contains(&("Retry-After", "30".to_string())));
    }
}

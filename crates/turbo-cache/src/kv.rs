//! Key-value store interface and in-memory backend.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::CacheError;

/// Snapshot of a windowed counter after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCounter {
    /// Value after the increment.
    pub count: u64,
    /// Time until the counter expires.
    pub ttl_remaining: Duration,
}

/// Key-value store the rest of the system is written against.
///
/// An in-memory map serves a single instance; a shared cache backend can
/// implement the same trait for multi-instance deployments without any
/// call site changing.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get a value. Returns `None` if the key doesn't exist or has expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Set a value with an optional time to live.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>)
        -> Result<(), CacheError>;

    /// Delete a value. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Check if a live key exists.
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Atomically increment a counter.
    ///
    /// A missing or expired counter starts at 1 with the given `ttl`; an
    /// existing counter keeps its original expiry.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<WindowCounter, CacheError>;

    /// Drop every expired entry, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize, CacheError>;
}

#[derive(Debug, Clone)]
enum StoredValue {
    Bytes(Vec<u8>),
    Counter(u64),
}

#[derive(Debug, Clone)]
struct Entry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Process-local [`KvStore`] backed by a mutex-guarded map.
///
/// Expiry uses tokio's clock, so paused-time tests can move windows forward
/// with `tokio::time::advance`.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryKv {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Check if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // A panic while holding the lock cannot leave an entry half-written.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        let entries = self.entries();
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => match &entry.value {
                StoredValue::Bytes(bytes) => Ok(Some(bytes.clone())),
                StoredValue::Counter(count) => Ok(Some(count.to_string().into_bytes())),
            },
            _ => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries().insert(
            key.to_string(),
            Entry {
                value: StoredValue::Bytes(value),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries()
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now)))
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<WindowCounter, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries();

        let live = entries.get_mut(key).filter(|entry| !entry.is_expired(now));
        if let Some(entry) = live {
            let StoredValue::Counter(count) = &mut entry.value else {
                return Err(CacheError::TypeMismatch(key.to_string()));
            };
            *count = count.saturating_add(1);
            let ttl_remaining = entry
                .expires_at
                .map(|at| at.saturating_duration_since(now))
                .unwrap_or(ttl);
            return Ok(WindowCounter {
                count: *count,
                ttl_remaining,
            });
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: StoredValue::Counter(1),
                expires_at: Some(now + ttl),
            },
        );
        Ok(WindowCounter {
            count: 1,
            ttl_remaining: ttl,
        })
    }

    async fn purge_expired(&self) -> Result<usize, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before - entries.len())
    }
}

/// Helper to build cache keys with namespacing.
///
/// # Example
///
/// ```rust,ignore
/// let key = cache_key!("ratelimit", "user", user_id);
/// // Returns "ratelimit:user:user123"
/// ```
#[macro_export]
macro_rules! cache_key {
    ($prefix:expr, $($part:expr),+) => {{
        let mut key = String::from($prefix);
        $(
            key.push(':');
            key.push_str(&$part.to_string());
        )+
        key
    }};
}

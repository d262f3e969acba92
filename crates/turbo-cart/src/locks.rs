//! Per-cart single-writer locks.
//!
//! Every operation that mutates a cart holds that cart's lock for its whole
//! read-validate-write sequence. Two-cart operations lock both carts in id
//! order, so opposing merges cannot deadlock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use turbo_commerce::ids::CartId;

/// Guard for one cart.
pub type CartGuard = OwnedMutexGuard<()>;

/// Registry of async mutexes keyed by cart id.
#[derive(Debug, Default)]
pub struct CartLocks {
    locks: Mutex<HashMap<CartId, Arc<AsyncMutex<()>>>>,
}

impl CartLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, cart_id: &CartId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(cart_id.clone()).or_default().clone()
    }

    /// Wait for exclusive access to a cart.
    pub async fn lock(&self, cart_id: &CartId) -> CartGuard {
        self.slot(cart_id).lock_owned().await
    }

    /// Wait for exclusive access to two carts.
    ///
    /// Guards are returned in argument order. The same id twice is locked
    /// once and yields no second guard.
    pub async fn lock_pair(&self, a: &CartId, b: &CartId) -> (CartGuard, Option<CartGuard>) {
        if a == b {
            (self.lock(a).await, None)
        } else if a < b {
            let first = self.lock(a).await;
            let second = self.lock(b).await;
            (first, Some(second))
        } else {
            let second = self.lock(b).await;
            let first = self.lock(a).await;
            (first, Some(second))
        }
    }

    /// Drop the entry for one cart if no task is holding or waiting on it.
    pub fn forget(&self, cart_id: &CartId) -> bool {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        match locks.get(cart_id) {
            Some(slot) if Arc::strong_count(slot) == 1 => locks.remove(cart_id).is_some(),
            _ => false,
        }
    }

    /// Drop entries no task is holding or waiting on.
    pub fn prune(&self) -> usize {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let before = locks.len();
        locks.retain(|_, slot| Arc::strong_count(slot) > 1);
        before - locks.len()
    }

    /// Number of tracked carts.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let locks = Arc::new(CartLocks::new());
        let id = CartId::new("c1");
        let guard = locks.lock(&id).await;

        let contender = {
            let locks = locks.clone();
            let id = id.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&id).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_opposite_pairs_do_not_deadlock() {
        let locks = Arc::new(CartLocks::new());
        let a = CartId::new("a");
        let b = CartId::new("b");

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let locks = locks.clone();
                let (x, y) = if i % 2 == 0 {
                    (a.clone(), b.clone())
                } else {
                    (b.clone(), a.clone())
                };
                tokio::spawn(async move {
                    let _guards = locks.lock_pair(&x, &y).await;
                    tokio::task::yield_now().await;
                })
            })
            .collect();

        let all = futures::future::join_all(tasks);
        let results = tokio::time::timeout(Duration::from_secs(5), all)
            .await
            .unwrap();
        assert!(results.into_iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn test_pair_of_same_cart_locks_once() {
        let locks = CartLocks::new();
        let id = CartId::new("same");

        let (guard, second) = tokio::time::timeout(Duration::from_secs(1), locks.lock_pair(&id, &id))
            .await
            .unwrap();
        assert!(second.is_none());
        drop(guard);

        tokio::time::timeout(Duration::from_secs(1), locks.lock(&id))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_forget_skips_held_locks() {
        let locks = CartLocks::new();
        let id = CartId::new("c1");
        let guard = locks.lock(&id).await;

        assert!(!locks.forget(&id));
        drop(guard);
        assert!(locks.forget(&id));
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_prune_keeps_held_locks() {
        let locks = CartLocks::new();
        let held = locks.lock(&CartId::new("held")).await;
        drop(locks.lock(&CartId::new("free")).await);

        assert_eq!(locks.prune(), 1);
        assert_eq!(locks.len(), 1);
        drop(held);
        assert_eq!(locks.prune(), 1);
        assert!(locks.is_empty());
    }
}

//! Periodic purge of expired key-value entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{CacheError, KvStore};

/// Background task that drops expired entries from a [`KvStore`].
pub struct ExpiryReaper {
    store: Arc<dyn KvStore>,
    interval: Duration,
}

impl ExpiryReaper {
    /// Create a reaper that runs once a minute.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            interval: Duration::from_secs(60),
        }
    }

    /// Set custom purge interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawn the reaper as a background task.
    ///
    /// Abort the returned handle to stop it.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                match self.run_once().await {
                    Ok(0) => {}
                    Ok(purged) => debug!(purged, "purged expired cache entries"),
                    Err(e) => warn!(error = %e, "cache expiry sweep failed"),
                }
            }
        })
    }

    /// Purge once.
    pub async fn run_once(&self) -> Result<usize, CacheError> {
        self.store.purge_expired().await
    }
}

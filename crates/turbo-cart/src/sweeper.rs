//! Periodic reclaim of expired carts.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{CartEngine, CartError, CleanupReport};

/// Background task that runs [`CartEngine::cleanup_expired_carts`] on an
/// interval.
pub struct CartSweeper {
    engine: Arc<CartEngine>,
    interval: Duration,
}

impl CartSweeper {
    /// Create a sweeper using the engine's configured interval.
    pub fn new(engine: Arc<CartEngine>) -> Self {
        let interval = engine.config().sweep.interval();
        Self { engine, interval }
    }

    /// Set custom sweep interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawn the sweeper as a background task.
    ///
    /// Abort the returned handle to stop it.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                match self.run_once().await {
                    Ok(report) if report.scanned == 0 => {}
                    Ok(report) => debug!(expired = report.expired, failed = report.failed, "cart sweep done"),
                    Err(e) => warn!(error = %e, "cart sweep failed"),
                }
            }
        })
    }

    /// Sweep once.
    pub async fn run_once(&self) -> Result<CleanupReport, CartError> {
        self.engine.cleanup_expired_carts().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{guest, harness, product};
    use crate::{AddItemRequest, CartConfig};

    #[tokio::test(start_paused = true)]
    async fn test_spawned_sweeper_reclaims() {
        let h = harness(CartConfig::default());
        h.catalog.set_product("p1".into(), product(100, 10)).await;
        h.engine
            .add_item(&guest("s1"), AddItemRequest::new("p1", 1))
            .await
            .unwrap();
        h.clock.advance(chrono::Duration::days(8));

        let engine = Arc::new(h.engine);
        let handle = CartSweeper::new(engine.clone())
            .with_interval(Duration::from_secs(5))
            .spawn();

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(engine.find_cart(&guest("s1")).await.unwrap().is_none());
        assert_eq!(engine.statistics().await.unwrap().expired_purged, 1);

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }
}

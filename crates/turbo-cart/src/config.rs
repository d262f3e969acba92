//! Cart engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use turbo_commerce::cart::{CartOwner, PricingRules, MAX_QUANTITY_PER_ITEM};
use turbo_commerce::money::Currency;

use crate::gateway::DependencyTag;

/// Longest inactivity window accepted for any cart.
pub const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Configuration for the cart engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CartConfig {
    /// Currency for newly created carts.
    pub default_currency: Currency,
    /// Inactivity window for guest carts, in seconds.
    pub guest_ttl_secs: u64,
    /// Inactivity window for user carts, in seconds.
    pub user_ttl_secs: u64,
    /// Line quantity bound when the catalog gives none.
    pub default_max_quantity: i64,
    /// Tax and shipping.
    pub pricing: PricingRules,
    /// Per-dependency call timeouts.
    pub timeouts: DependencyTimeouts,
    /// Expired cart sweep.
    pub sweep: SweepConfig,
}

impl Default for CartConfig {
    fn default() -> Self {
        Self {
            default_currency: Currency::USD,
            guest_ttl_secs: 7 * 24 * 60 * 60,
            user_ttl_secs: 30 * 24 * 60 * 60,
            default_max_quantity: MAX_QUANTITY_PER_ITEM,
            pricing: PricingRules::default(),
            timeouts: DependencyTimeouts::default(),
            sweep: SweepConfig::default(),
        }
    }
}

impl CartConfig {
    /// Inactivity window for a cart with the given owner.
    pub fn ttl_for(&self, owner: &CartOwner) -> chrono::Duration {
        if owner.is_guest() {
            self.guest_ttl()
        } else {
            self.user_ttl()
        }
    }

    pub fn guest_ttl(&self) -> chrono::Duration {
        ttl_duration(self.guest_ttl_secs)
    }

    pub fn user_ttl(&self) -> chrono::Duration {
        ttl_duration(self.user_ttl_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), CartConfigError> {
        if self.guest_ttl_secs == 0 || self.user_ttl_secs == 0 {
            return Err(CartConfigError::Invalid("cart TTLs cannot be 0".into()));
        }
        if self.guest_ttl_secs > MAX_TTL_SECS || self.user_ttl_secs > MAX_TTL_SECS {
            return Err(CartConfigError::Invalid(format!(
                "cart TTLs cannot exceed {MAX_TTL_SECS} seconds"
            )));
        }
        if self.default_max_quantity <= 0 {
            return Err(CartConfigError::Invalid(
                "default_max_quantity must be positive".into(),
            ));
        }
        if self.pricing.flat_shipping_cents < 0 {
            return Err(CartConfigError::Invalid(
                "flat_shipping_cents cannot be negative".into(),
            ));
        }
        if self
            .pricing
            .free_shipping_threshold_cents
            .is_some_and(|t| t < 0)
        {
            return Err(CartConfigError::Invalid(
                "free_shipping_threshold_cents cannot be negative".into(),
            ));
        }
        if self.timeouts.inventory_ms == 0 || self.timeouts.coupons_ms == 0 {
            return Err(CartConfigError::Invalid("dependency timeouts cannot be 0".into()));
        }
        if self.sweep.interval_secs == 0 || self.sweep.batch_size == 0 {
            return Err(CartConfigError::Invalid(
                "sweep interval and batch size cannot be 0".into(),
            ));
        }
        Ok(())
    }
}

/// Timeouts for calls to external collaborators, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyTimeouts {
    pub inventory_ms: u64,
    pub coupons_ms: u64,
}

impl Default for DependencyTimeouts {
    fn default() -> Self {
        Self {
            inventory_ms: duration_ms(DependencyTag::Inventory.default_timeout()),
            coupons_ms: duration_ms(DependencyTag::Coupons.default_timeout()),
        }
    }
}

impl DependencyTimeouts {
    /// Timeout for a dependency.
    pub fn for_tag(&self, tag: DependencyTag) -> Duration {
        match tag {
            DependencyTag::Inventory => Duration::from_millis(self.inventory_ms),
            DependencyTag::Coupons => Duration::from_millis(self.coupons_ms),
        }
    }
}

fn ttl_duration(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_TTL_SECS) as i64)
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Expired cart sweep settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// How often the sweep runs, in seconds.
    pub interval_secs: u64,
    /// Carts reclaimed per run at most.
    pub batch_size: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: 15 * 60,
            batch_size: 500,
        }
    }
}

impl SweepConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Invalid cart configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CartConfigError {
    #[error("invalid cart configuration: {0}")]
    Invalid(String),
}

//! Service configuration file.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use turbo_cart::CartConfig;
use turbo_ratelimit::RateLimitConfig;

/// Config file names searched for, nearest directory first.
pub const CONFIG_NAMES: [&str; 3] = ["turbo-cart.toml", ".turbo-cart.toml", "turbo-cart.json"];

/// Service configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Cart engine settings.
    #[serde(default)]
    pub cart: CartConfig,

    /// Per-identity request limits.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Load config from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content, is_json(path))
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn parse(content: &str, json: bool) -> Result<Self> {
        if json {
            Ok(serde_json::from_str(content)?)
        } else {
            Ok(toml::from_str(content)?)
        }
    }

    /// Render the config in the file's format.
    pub fn render(&self, json: bool) -> Result<String> {
        if json {
            Ok(serde_json::to_string_pretty(self)?)
        } else {
            Ok(toml::to_string_pretty(self)?)
        }
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.cart.validate().context("invalid [cart] section")?;
        self.rate_limit
            .validate()
            .context("invalid [rate_limit] section")?;
        if let Err(e) = EnvFilter::try_new(&self.logging.level) {
            bail!("invalid [logging] level '{}': {}", self.logging.level, e);
        }
        Ok(())
    }

    /// Settings that are legal but probably unintended.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.rate_limit.enabled {
            warnings.push("rate_limit.enabled is false; callers are not limited".to_string());
        }
        if self.cart.guest_ttl_secs > self.cart.user_ttl_secs {
            warnings.push("cart.guest_ttl_secs is longer than cart.user_ttl_secs".to_string());
        }
        if let Some(threshold) = self.cart.pricing.free_shipping_threshold_cents {
            if self.cart.pricing.flat_shipping_cents == 0 && threshold > 0 {
                warnings.push(
                    "cart.pricing.free_shipping_threshold_cents has no effect without a shipping fee"
                        .to_string(),
                );
            }
        }
        warnings
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Human-readable lines.
    #[default]
    Human,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Filter directive used when `TURBO_CART_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Human,
            level: "info".to_string(),
        }
    }
}

/// Whether a config path uses the JSON format.
pub fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

/// Generate a commented default turbo-cart.toml.
pub fn generate_default_config() -> String {
    r#"# Turbo Cart service configuration

[cart]
default_currency = "USD"
# Inactivity windows, in seconds.
guest_ttl_secs = 604800
user_ttl_secs = 2592000
default_max_quantity = 9999

[cart.pricing]
# Tax in basis points (825 = 8.25%), applied after discounts.
tax_rate_bps = 0
flat_shipping_cents = 0
# free_shipping_threshold_cents = 5000

[cart.timeouts]
inventory_ms = 150
coupons_ms = 200

[cart.sweep]
interval_secs = 900
batch_size = 500

[rate_limit]
enabled = true
requests_per_window = 100
window_secs = 60

[logging]
# "human" or "json". TURBO_CART_LOG overrides the level.
format = "human"
level = "info"
"#
    .to_string()
}

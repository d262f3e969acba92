//! Rate limit configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Rate limit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Whether requests are limited at all.
    pub enabled: bool,
    /// Requests admitted per identity per window.
    pub requests_per_window: u32,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_window: 100,
            window_secs: 60,
        }
    }
}

impl RateLimitConfig {
    /// Create strict limits for untrusted callers.
    pub fn strict() -> Self {
        Self {
            enabled: true,
            requests_per_window: 20,
            window_secs: 60,
        }
    }

    /// Set requests per window.
    pub fn with_limit(mut self, requests_per_window: u32) -> Self {
        self.requests_per_window = requests_per_window;
        self
    }

    /// Set the window length.
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window_secs = window.as_secs();
        self
    }

    /// Window length as a duration.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), RateLimitError> {
        if self.requests_per_window == 0 {
            return Err(RateLimitError::InvalidLimit(
                "requests_per_window cannot be 0".into(),
            ));
        }
        if self.window_secs == 0 {
            return Err(RateLimitError::InvalidLimit("window_secs cannot be 0".into()));
        }
        Ok(())
    }
}

/// Errors from rate limit configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    #[error("invalid rate limit configuration: {0}")]
    InvalidLimit(String),
}

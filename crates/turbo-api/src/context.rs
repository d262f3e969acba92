//! Per-request context.

use std::fmt;

use rand::Rng;
use turbo_auth::Credentials;

/// Unique request identifier for tracing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a new request ID.
    pub fn generate() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let noise: u32 = rand::thread_rng().gen();
        Self(format!("{millis:x}-{noise:08x}"))
    }

    /// Create from an existing ID string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the boundary knows about an inbound request before dispatch.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub credentials: Credentials,
}

impl RequestContext {
    /// Create a context with a fresh request id.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            request_id: RequestId::generate(),
            credentials,
        }
    }

    /// Reuse an id supplied by the caller, e.g. from an `X-Request-Id` header.
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !id.trim().is_empty() {
            self.request_id = RequestId::from_string(id);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_differ() {
        let a = RequestId::generate();
        let b = RequestId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().contains('-'));
    }

    #[test]
    fn test_caller_id_wins_unless_blank() {
        let ctx = RequestContext::new(Credentials::default()).with_request_id("req-7");
        assert_eq!(ctx.request_id.as_str(), "req-7");

        let ctx = RequestContext::new(Credentials::default()).with_request_id("  ");
        assert_ne!(ctx.request_id.as_str(), "  ");
    }
}

//! Request boundary for the TurboCommerce cart service.
//!
//! Transport-agnostic: a transport hands [`CartApi`] the caller's
//! credentials and a [`CartRequest`] (or its JSON), and gets back an
//! [`ApiResponse`] holding an HTTP status, rate limit headers and the
//! response envelope.
//!
//! # Example
//!
//! ```rust,ignore
//! use turbo_api::{CartApi, RequestContext};
//! use turbo_auth::Credentials;
//!
//! let ctx = RequestContext::new(Credentials::session("sess-1"));
//! let response = api
//!     .handle_json(ctx, r#"{"op": "add_item", "product_id": "sku-1", "quantity": 2}"#)
//!     .await;
//! println!("{} {}", response.status, response.to_json());
//! ```

mod context;
mod error;
mod request;
mod response;
mod service;

pub use context::{RequestContext, RequestId};
pub use error::{ApiError, INTERNAL_MESSAGE};
pub use request::CartRequest;
pub use response::{ApiResponse, Envelope, ErrorBody};
pub use service::CartApi;

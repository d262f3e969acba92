//! Response envelope.

use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ApiError;

/// Error payload inside a failed envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable code.
    pub code: String,
    pub message: String,
}

/// `{success, data}` on success, `{success, error: {code, message}}` on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// A boundary response: status, headers and envelope.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Envelope,
}

impl ApiResponse {
    /// Successful response carrying `data`.
    pub fn ok(data: Value) -> Self {
        Self {
            status: StatusCode::OK,
            headers: Vec::new(),
            body: Envelope {
                success: true,
                data: Some(data),
                error: None,
            },
        }
    }

    /// Failed response for `err`. Internal details are not included.
    pub fn from_error(err: &ApiError) -> Self {
        Self {
            status: err.status(),
            headers: Vec::new(),
            body: Envelope {
                success: false,
                data: None,
                error: Some(ErrorBody {
                    code: err.code().to_string(),
                    message: err.public_message(),
                }),
            },
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Check if the response was successful (2xx status).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Check if the response was a client error (4xx status).
    pub fn is_client_error(&self) -> bool {
        self.status.is_client_error()
    }

    /// Check if the response was a server error (5xx status).
    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }

    /// Error code, if the request failed.
    pub fn error_code(&self) -> Option<&str> {
        self.body.error.as_ref().map(|e| e.code.as_str())
    }

    /// Get a header value.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Parse the `data` payload.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let data = self
            .body
            .data
            .clone()
            .ok_or_else(|| ApiError::MalformedRequest("response has no data".into()))?;
        Ok(serde_json::from_value(data)?)
    }

    /// Serialize the envelope.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.body).unwrap_or_else(|_| {
            r#"{"success":false,"error":{"code":"INTERNAL_ERROR","message":"An internal error occurred"}}"#
                .to_string()
        })
    }

    /// Convert into an [`http::Response`] with a JSON body.
    ///
    /// Headers with invalid names or values are dropped.
    pub fn into_http(self) -> http::Response<String> {
        let body = self.to_json();
        let mut response = http::Response::new(body);
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use turbo_cart::CartError;
    use turbo_commerce::ids::CartItemId;

    #[test]
    fn test_success_envelope() {
        let resp = ApiResponse::ok(json!({"value": 42}));
        assert!(resp.is_success());
        assert_eq!(resp.to_json(), r#"{"success":true,"data":{"value":42}}"#);
    }

    #[test]
    fn test_error_envelope() {
        let err = ApiError::from(CartError::CartItemNotFound(CartItemId::new("i1")));
        let resp = ApiResponse::from_error(&err);

        assert!(resp.is_client_error());
        assert_eq!(resp.status, StatusCode::NOT_FOUND);
        assert_eq!(resp.error_code(), Some("CART_ITEM_NOT_FOUND"));
        let parsed: Value = serde_json::from_str(&resp.to_json()).unwrap();
        assert_eq!(parsed["success"], json!(false));
        assert_eq!(parsed["error"]["message"], json!("Cart item not found: i1"));
        assert!(parsed.get("data").is_none());
    }

    #[test]
    fn test_header_case_insensitive() {
        let resp = ApiResponse::ok(json!(null)).with_header("X-RateLimit-Limit", "100");
        assert_eq!(resp.header("x-ratelimit-limit"), Some("100"));
        assert_eq!(resp.header("Retry-After"), None);
    }

    #[test]
    fn test_into_http() {
        let resp = ApiResponse::from_error(&ApiError::MalformedRequest("bad".into()))
            .with_header("X-Request-Id", "req-1")
            .with_header("Bad Header", "dropped");
        let http = resp.into_http();

        assert_eq!(http.status(), StatusCode::BAD_REQUEST);
        assert_eq!(http.headers()["content-type"], "application/json");
        assert_eq!(http.headers()["x-request-id"], "req-1");
        assert_eq!(http.headers().len(), 2);
        assert!(http.body().contains("MALFORMED_REQUEST"));
    }

    #[test]
    fn test_typed_data() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Data {
            value: i32,
        }

        let resp = ApiResponse::ok(json!({"value": 7}));
        assert_eq!(resp.data::<Data>().unwrap(), Data { value: 7 });

        let failed = ApiResponse::from_error(&ApiError::Internal("boom".into()));
        assert!(failed.data::<Data>().is_err());
        assert!(failed.is_server_error());
    }
}

//! Transport seam between the API client and the network.
//!
//! [`Transport`] is the one place a request leaves the process. The
//! production implementation is [`HttpTransport`] (reqwest with a cookie
//! jar); decorators such as [`super::RefreshingTransport`] wrap any
//! transport, and tests substitute a scripted fake.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::config::ClientConfig;

/// Failure to obtain any HTTP response (DNS, connect, TLS, timeout, reset).
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self(err.to_string())
    }
}

/// An outbound API request.
///
/// Cloned, not rebuilt, when it has to be re-issued, so the retry carries
/// the same body and request ID as the original attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Endpoint path relative to the API root, with a leading slash.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    /// Correlates the attempts of one logical request in logs.
    pub request_id: Uuid,
    retried: bool,
}

impl ApiRequest {
    /// Create a request without query or body.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            request_id: Uuid::new_v4(),
            retried: false,
        }
    }

    /// `GET` request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// `POST` request.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// `DELETE` request.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Append a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Whether this request has already been re-issued after a refresh.
    #[must_use]
    pub const fn is_retried(&self) -> bool {
        self.retried
    }

    /// Copy of this request marked as already retried.
    #[must_use]
    pub fn to_retry(&self) -> Self {
        Self {
            retried: true,
            ..self.clone()
        }
    }
}

/// A response with any status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
    /// Parsed `Retry-After` header, in seconds.
    pub retry_after: Option<u64>,
}

impl ApiResponse {
    /// Build a response from a status and body.
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
        }
    }

    /// Build a response carrying a JSON body.
    #[must_use]
    pub fn json(status: StatusCode, body: &serde_json::Value) -> Self {
        Self::new(status, body.to_string())
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body.
    ///
    /// An empty body decodes as JSON `null`, which lets endpoints that answer
    /// `204 No Content` be read as `()` or `Option<T>`.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the body does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        if self.body.trim().is_empty() {
            serde_json::from_value(serde_json::Value::Null)
        } else {
            serde_json::from_str(&self.body)
        }
    }
}

/// Sends API requests and returns responses of any status.
///
/// Implementations report non-2xx statuses as `Ok`; only the absence of a
/// response is an error.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        (**self).send(request).await
    }
}

/// HTTP transport backed by `reqwest`.
///
/// The session credential is an HTTP-only cookie held by the client's
/// cookie jar: the server sets it, the jar replays it on every request, and
/// nothing in this crate reads it.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    /// Create a transport for the configured API.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(config.user_agent.clone());
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: config.api_base_url.clone(),
        })
    }

    /// Resolve an endpoint path and query against the API root.
    fn url_for(&self, request: &ApiRequest) -> Result<Url, TransportError> {
        let mut url = self
            .base_url
            .join(request.path.trim_start_matches('/'))
            .map_err(|e| TransportError(format!("invalid endpoint path {}: {e}", request.path)))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.url_for(request)?;

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .header("Accept", "application/json")
            .header("X-Request-Id", request.request_id.to_string());
        if let Some(body) = &request.body {
            builder = builder
                .header("Content-Type", "application/json")
                .body(body.to_string());
        }

        let response = builder.send().await?;
        let status = response.status();
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        let body = response.text().await?;

        Ok(ApiResponse {
            status,
            body,
            retry_after,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn transport(base: &str) -> HttpTransport {
        HttpTransport::new(&ClientConfig::for_base_url(base).unwrap()).unwrap()
    }

    #[test]
    fn test_url_for_joins_under_base_path() {
        let transport = transport("https://shop.example.com/backend");
        let url = transport
            .url_for(&ApiRequest::get("/api/orders/cart/"))
            .unwrap();
        assert_eq!(url.as_str(), "https://shop.example.com/backend/api/orders/cart/");
    }

    #[test]
    fn test_url_for_encodes_query() {
        let transport = transport("http://localhost:8000");
        let request = ApiRequest::get("/api/products/")
            .with_query("category", "home-garden")
            .with_query("search", "tea cup");
        let url = transport.url_for(&request).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/api/products/?category=home-garden&search=tea+cup"
        );
    }

    #[test]
    fn test_product_slug_stays_one_segment() {
        let transport = transport("http://localhost:8000");
        let url_for = |slug: &str| {
            transport
                .url_for(&ApiRequest::get(crate::api::endpoints::product(slug)))
                .unwrap()
        };

        let url = url_for("../auth/profile");
        assert_eq!(url.path(), "/api/products/..%2Fauth%2Fprofile/");

        let url = url_for("mug?search=x");
        assert_eq!(url.path(), "/api/products/mug%3Fsearch%3Dx/");
        assert_eq!(url.query(), None);

        let url = url_for("a#b");
        assert_eq!(url.path(), "/api/products/a%23b/");
        assert_eq!(url.fragment(), None);

        assert_eq!(url_for("green-tea").path(), "/api/products/green-tea/");
    }

    #[test]
    fn test_retry_copy_keeps_identity() {
        let request = ApiRequest::post("/api/orders/cart/add/")
            .with_body(serde_json::json!({"product_id": 1, "quantity": 1}));
        let retry = request.to_retry();
        assert!(!request.is_retried());
        assert!(retry.is_retried());
        assert_eq!(retry.request_id, request.request_id);
        assert_eq!(retry.body, request.body);
    }

    #[test]
    fn test_decode_empty_body_as_null() {
        let response = ApiResponse::new(StatusCode::NO_CONTENT, "");
        let decoded: Option<serde_json::Value> = response.decode().unwrap();
        assert!(decoded.is_none());
    }
}

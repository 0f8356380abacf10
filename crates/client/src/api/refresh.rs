//! One-shot transparent re-authentication.
//!
//! [`RefreshingTransport`] decorates another [`Transport`]. When a request
//! comes back `401 Unauthorized` it asks the server to renew the session
//! credential and, if that works, re-issues the request once:
//!
//! 1. The response is not a 401, the request *is* the refresh call, or the
//!    request was already retried: return the response untouched.
//! 2. Otherwise copy the request with its retried marker set.
//! 3. Call the refresh endpoint. On any failure (non-2xx or no response)
//!    return the original 401 untouched.
//! 4. On success send the marked copy and return whatever it yields, 401
//!    included.
//!
//! Both the refresh and the retry go straight to the inner transport, so a
//! single logical request causes at most one refresh and one retry no
//! matter how the server answers. Redirecting to a sign-in view is not this
//! layer's concern.

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, instrument, warn};

use super::endpoints;
use super::transport::{ApiRequest, ApiResponse, Transport, TransportError};

/// Transport decorator implementing the refresh-and-retry-once protocol.
pub struct RefreshingTransport<T> {
    inner: T,
}

impl<T: Transport> RefreshingTransport<T> {
    /// Wrap a transport.
    pub const fn new(inner: T) -> Self {
        Self { inner }
    }

    /// The wrapped transport.
    pub const fn inner(&self) -> &T {
        &self.inner
    }

    /// Ask the server to renew the session credential.
    async fn refresh(&self) -> bool {
        match self.inner.send(&ApiRequest::post(endpoints::TOKEN_REFRESH)).await {
            Ok(response) if response.is_success() => true,
            Ok(response) => {
                debug!(status = %response.status, "Session refresh rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, "Session refresh failed without a response");
                false
            }
        }
    }
}

/// Whether a request targets the refresh endpoint itself.
fn is_refresh_call(request: &ApiRequest) -> bool {
    request.path == endpoints::TOKEN_REFRESH
}

#[async_trait]
impl<T: Transport> Transport for RefreshingTransport<T> {
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path, request_id = %request.request_id))]
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let response = self.inner.send(request).await?;

        if response.status != StatusCode::UNAUTHORIZED
            || is_refresh_call(request)
            || request.is_retried()
        {
            return Ok(response);
        }

        let retry = request.to_retry();
        if !self.refresh().await {
            return Ok(response);
        }

        debug!("Session refreshed, retrying request once");
        self.inner.send(&retry).await
    }
}

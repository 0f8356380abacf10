//! Storefront REST API client.
//!
//! # Layers
//!
//! - [`Transport`] sends one request and returns a response of any status
//! - [`HttpTransport`] is the production transport (reqwest + cookie jar)
//! - [`RefreshingTransport`] renews an expired session once and retries
//! - [`ApiClient`] exposes one method per endpoint and maps failures to [`ApiError`]
//!
//! Categories, product listings and product details are cached with `moka`
//! (5 minute TTL by default). Cart, order and auth calls always hit the
//! server.

mod cache;
mod error;
mod payloads;
mod refresh;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::de::DeserializeOwned;
use shopfront_core::{Cart, CartItemId, Category, Identity, Listing, Order, Product, ProductId};
use tracing::{debug, instrument};

pub use error::{ApiError, ValidationErrors};
pub use payloads::{Credentials, ProductQuery, Registration};
pub use refresh::RefreshingTransport;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport, TransportError};

use cache::{CacheKey, CacheValue};

/// Endpoint paths, relative to the API root.
pub mod endpoints {
    pub const REGISTER: &str = "/api/auth/register/";
    pub const LOGIN: &str = "/api/auth/login/";
    pub const LOGOUT: &str = "/api/auth/logout/";
    pub const PROFILE: &str = "/api/auth/profile/";
    pub const TOKEN_REFRESH: &str = "/api/auth/token/refresh/";
    pub const PRODUCTS: &str = "/api/products/";
    pub const CATEGORIES: &str = "/api/products/categories/";
    pub const CART: &str = "/api/orders/cart/";
    pub const CART_ADD: &str = "/api/orders/cart/add/";
    pub const ORDERS: &str = "/api/orders/";
    pub const ORDER_CREATE: &str = "/api/orders/create/";

    /// Detail path of a product.
    ///
    /// The slug is percent-encoded as a single path segment, so `/`, `?`
    /// and `#` in it never leave the products collection.
    #[must_use]
    pub fn product(slug: &str) -> String {
        format!("/api/products/{}/", urlencoding::encode(slug))
    }

    /// Whether `slug` can name a product: not blank, not a dot segment.
    #[must_use]
    pub fn is_product_slug(slug: &str) -> bool {
        !slug.trim().is_empty() && slug.chars().any(|c| c != '.')
    }

    /// Removal path of a cart line.
    #[must_use]
    pub fn cart_remove(item_id: shopfront_core::CartItemId) -> String {
        format!("/api/orders/cart/remove/{item_id}/")
    }
}

// =============================================================================
// ApiClient
// =============================================================================

/// Client for the storefront REST API.
///
/// Cheap to clone; clones share the transport (and with it the session
/// cookie jar) and the catalog cache.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    transport: Arc<dyn Transport>,
    cache: Option<Cache<CacheKey, CacheValue>>,
}

impl ApiClient {
    /// Create a client over a transport.
    ///
    /// A zero `catalog_cache_ttl` disables catalog caching.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, catalog_cache_ttl: Duration) -> Self {
        let cache = (!catalog_cache_ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(1000)
                .time_to_live(catalog_cache_ttl)
                .build()
        });

        Self {
            inner: Arc::new(ApiClientInner { transport, cache }),
        }
    }

    /// Send a request and return the response if it is a success.
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let response = self.inner.transport.send(&request).await?;

        if response.is_success() {
            return Ok(response);
        }

        let err = ApiError::from_response(&response);
        if response.status.is_server_error() {
            tracing::error!(
                status = %response.status,
                path = %request.path,
                request_id = %request.request_id,
                body = %response.body.chars().take(500).collect::<String>(),
                "Storefront API returned server error"
            );
        } else {
            debug!(status = %response.status, path = %request.path, "Request rejected");
        }
        Err(err)
    }

    /// Send a request and decode its success body.
    async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let path = request.path.clone();
        let response = self.execute(request).await?;
        response.decode().map_err(|e| {
            tracing::error!(
                error = %e,
                path = %path,
                body = %response.body.chars().take(500).collect::<String>(),
                "Failed to decode storefront API response"
            );
            ApiError::from(e)
        })
    }

    async fn cached(&self, key: &CacheKey) -> Option<CacheValue> {
        match &self.inner.cache {
            Some(cache) => cache.get(key).await,
            None => None,
        }
    }

    async fn remember(&self, key: CacheKey, value: CacheValue) {
        if let Some(cache) = &self.inner.cache {
            cache.insert(key, value).await;
        }
    }

    /// Drop every cached catalog response.
    pub fn invalidate_catalog(&self) {
        if let Some(cache) = &self.inner.cache {
            cache.invalidate_all();
        }
    }

    // =========================================================================
    // Auth Methods
    // =========================================================================

    /// Create an account. Does not sign in.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Validation` with the server's field errors if the
    /// account is rejected.
    #[instrument(skip(self, registration), fields(email = %registration.email))]
    pub async fn register(&self, registration: &Registration) -> Result<(), ApiError> {
        let request = ApiRequest::post(endpoints::REGISTER).with_body(registration.to_body());
        self.execute(request).await?;
        Ok(())
    }

    /// Sign in. The server sets the session cookies and returns the identity.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unauthorized` for wrong credentials.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn login(&self, credentials: &Credentials) -> Result<Identity, ApiError> {
        let request = ApiRequest::post(endpoints::LOGIN).with_body(credentials.to_body());
        self.fetch(request).await
    }

    /// Sign out. The server clears the session cookies.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached or rejects the call.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.execute(ApiRequest::post(endpoints::LOGOUT)).await?;
        Ok(())
    }

    /// The identity bound to the current session.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unauthorized` when there is no valid session.
    #[instrument(skip(self))]
    pub async fn profile(&self) -> Result<Identity, ApiError> {
        self.fetch(ApiRequest::get(endpoints::PROFILE)).await
    }

    /// Renew the session credential explicitly.
    ///
    /// Requests made through a [`RefreshingTransport`] do this on their own.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unauthorized` when the refresh credential is gone.
    #[instrument(skip(self))]
    pub async fn refresh_session(&self) -> Result<(), ApiError> {
        self.execute(ApiRequest::post(endpoints::TOKEN_REFRESH)).await?;
        Ok(())
    }

    // =========================================================================
    // Catalog Methods
    // =========================================================================

    /// List products, optionally filtered by category slug and search term.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn products(&self, query: &ProductQuery) -> Result<Vec<Product>, ApiError> {
        let key = CacheKey::Products(query.normalized());
        if let Some(CacheValue::Products(products)) = self.cached(&key).await {
            debug!("Cache hit for products");
            return Ok(products);
        }

        let mut request = ApiRequest::get(endpoints::PRODUCTS);
        for (name, value) in query.to_pairs() {
            request = request.with_query(name, value);
        }
        let products = self.fetch::<Listing<Product>>(request).await?.into_items();

        self.remember(key, CacheValue::Products(products.clone())).await;
        Ok(products)
    }

    /// List categories.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn categories(&self) -> Result<Vec<Category>, ApiError> {
        if let Some(CacheValue::Categories(categories)) = self.cached(&CacheKey::Categories).await {
            debug!("Cache hit for categories");
            return Ok(categories);
        }

        let categories = self
            .fetch::<Listing<Category>>(ApiRequest::get(endpoints::CATEGORIES))
            .await?
            .into_items();

        self.remember(CacheKey::Categories, CacheValue::Categories(categories.clone()))
            .await;
        Ok(categories)
    }

    /// Get a product by its slug.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` for an unknown slug.
    #[instrument(skip(self), fields(slug = %slug))]
    pub async fn product(&self, slug: &str) -> Result<Product, ApiError> {
        if !endpoints::is_product_slug(slug) {
            return Err(ApiError::NotFound(format!("No product '{slug}'")));
        }

        let key = CacheKey::Product(slug.to_string());
        if let Some(CacheValue::Product(product)) = self.cached(&key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let product: Product = self.fetch(ApiRequest::get(endpoints::product(slug))).await?;

        self.remember(key, CacheValue::Product(Box::new(product.clone())))
            .await;
        Ok(product)
    }

    // =========================================================================
    // Cart Methods
    // =========================================================================

    /// The cart of the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unauthorized` without a session.
    #[instrument(skip(self))]
    pub async fn cart(&self) -> Result<Cart, ApiError> {
        self.fetch(ApiRequest::get(endpoints::CART)).await
    }

    /// Add units of a product to the cart.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` for an unknown product.
    #[instrument(skip(self))]
    pub async fn add_to_cart(&self, product_id: ProductId, quantity: u32) -> Result<(), ApiError> {
        let request = ApiRequest::post(endpoints::CART_ADD)
            .with_body(payloads::add_to_cart_body(product_id, quantity));
        self.execute(request).await?;
        Ok(())
    }

    /// Remove a line from the cart.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if the line is not in the user's cart.
    #[instrument(skip(self))]
    pub async fn remove_from_cart(&self, item_id: CartItemId) -> Result<(), ApiError> {
        self.execute(ApiRequest::delete(endpoints::cart_remove(item_id)))
            .await?;
        Ok(())
    }

    // =========================================================================
    // Order Methods
    // =========================================================================

    /// Orders of the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn orders(&self) -> Result<Vec<Order>, ApiError> {
        Ok(self
            .fetch::<Listing<Order>>(ApiRequest::get(endpoints::ORDERS))
            .await?
            .into_items())
    }

    /// Turn the cart into an order. The server empties the cart.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Validation` for an empty cart or missing address.
    #[instrument(skip(self, shipping_address))]
    pub async fn create_order(&self, shipping_address: &str) -> Result<Order, ApiError> {
        let request = ApiRequest::post(endpoints::ORDER_CREATE)
            .with_body(payloads::create_order_body(shipping_address));
        self.fetch(request).await
    }
}

//! The storefront service container.
//!
//! [`Storefront`] wires the transport stack, session store, cart
//! synchronizer and views together and gives front ends the actions a
//! shopper can take.

use std::sync::Arc;

use shopfront_core::{CartItemId, Order, ProductId};
use tracing::instrument;

use crate::api::{ApiClient, ApiError, HttpTransport, RefreshingTransport, Transport};
use crate::cart::CartSynchronizer;
use crate::catalog::Catalog;
use crate::config::ClientConfig;
use crate::error::{AppError, Result};
use crate::forms::{CheckoutForm, LoginForm, RegisterForm};
use crate::guard::{self, GuardDecision, ResumeTarget, Route};
use crate::orders::OrderDesk;
use crate::session::{SessionState, SessionStore};

/// Result of an add-to-cart action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddToCart {
    Added,
    /// Nobody is signed in; go to the sign-in view.
    SignInRequired { redirect_to: Route },
}

/// Everything a storefront front end needs.
///
/// Cheap to clone via `Arc`.
#[derive(Clone)]
pub struct Storefront {
    inner: Arc<StorefrontInner>,
}

struct StorefrontInner {
    config: ClientConfig,
    api: ApiClient,
    session: SessionStore,
    cart: CartSynchronizer,
    catalog: Catalog,
    orders: OrderDesk,
}

impl Storefront {
    /// Create a storefront talking HTTP to the configured API.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, transport))
    }

    /// Create a storefront over any transport.
    ///
    /// The transport is wrapped in a [`RefreshingTransport`].
    #[must_use]
    pub fn with_transport<T: Transport + 'static>(config: ClientConfig, transport: T) -> Self {
        let api = ApiClient::new(
            Arc::new(RefreshingTransport::new(transport)),
            config.catalog_cache_ttl,
        );
        let session = SessionStore::new(api.clone());
        let cart = CartSynchronizer::new(api.clone());
        let catalog = Catalog::new(api.clone());
        let orders = OrderDesk::new(api.clone(), cart.clone(), session.clone());

        Self {
            inner: Arc::new(StorefrontInner {
                config,
                api,
                session,
                cart,
                catalog,
                orders,
            }),
        }
    }

    /// Start the cart observer, then resolve the startup session.
    ///
    /// Must be called from within a Tokio runtime.
    #[instrument(skip(self))]
    pub async fn start(&self) -> SessionState {
        self.inner.cart.observe(&self.inner.session);
        self.inner.session.bootstrap().await
    }

    /// Stop background work.
    pub fn shutdown(&self) {
        self.inner.cart.stop();
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    #[must_use]
    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    #[must_use]
    pub fn cart(&self) -> &CartSynchronizer {
        &self.inner.cart
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    #[must_use]
    pub fn orders(&self) -> &OrderDesk {
        &self.inner.orders
    }

    /// Check whether `route` may be shown right now.
    #[must_use]
    pub fn guard(&self, route: &Route) -> GuardDecision {
        guard::check(&self.inner.session.state(), route)
    }

    /// Check `route` once the session has settled, never deferring.
    pub async fn guard_settled(&self, route: &Route) -> GuardDecision {
        let state = self.inner.session.settled().await;
        guard::check(&state, route)
    }

    /// Sign in and return where to go next.
    ///
    /// Returns once the shopper's cart has been loaded, so the next view
    /// renders the server's cart.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Form` without a request for invalid input, or the
    /// API error from the sign-in call.
    pub async fn sign_in(&self, form: LoginForm, resume: Option<&ResumeTarget>) -> Result<Route> {
        let credentials = form.validate()?;
        let identity = self.inner.session.login(&credentials).await?;
        self.inner.cart.wait_loaded(&self.inner.session, identity.id).await;
        Ok(guard::resume_destination(resume))
    }

    /// Create an account, sign in and return where to go next.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Form` without a request for invalid input (a
    /// mismatched password confirmation included), or the API error.
    pub async fn sign_up(&self, form: RegisterForm) -> Result<Route> {
        let registration = form.validate()?;
        let identity = self.inner.session.register(&registration).await?;
        self.inner.cart.wait_loaded(&self.inner.session, identity.id).await;
        Ok(Route::Home)
    }

    /// Sign out. Always succeeds locally.
    pub async fn sign_out(&self) {
        self.inner.session.logout().await;
    }

    /// Add a product to the cart from a product view.
    ///
    /// # Errors
    ///
    /// Returns the cart error; the held cart is unchanged if the add failed.
    pub async fn add_to_cart(&self, product_id: ProductId, quantity: u32) -> Result<AddToCart> {
        if !self.inner.session.state().is_authenticated() {
            return Ok(AddToCart::SignInRequired {
                redirect_to: Route::Login,
            });
        }

        self.settle(self.inner.cart.add_item(product_id, quantity).await)?;
        Ok(AddToCart::Added)
    }

    /// Remove a line from the cart.
    ///
    /// # Errors
    ///
    /// Returns the cart error; the held cart is unchanged if the remove failed.
    pub async fn remove_from_cart(&self, item_id: CartItemId) -> Result<()> {
        self.settle(self.inner.cart.remove_item(item_id).await)
    }

    /// Place an order for the held cart.
    ///
    /// # Errors
    ///
    /// Returns `AppError::EmptyCart` when there is nothing to order.
    pub async fn checkout(&self, form: &CheckoutForm) -> Result<Order> {
        self.settle(self.inner.orders.place_order(form).await)
    }

    /// Sign out locally when the server rejected the session for good.
    fn settle<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(AppError::Api(ApiError::Unauthorized { .. })) = &result {
            self.inner.session.expire();
        }
        result
    }
}

impl Drop for StorefrontInner {
    fn drop(&mut self) {
        self.cart.stop();
    }
}

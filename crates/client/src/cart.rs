//! Local mirror of the server-side cart.
//!
//! The cart is never patched: every successful mutation is followed by a
//! full refetch, and the held value is replaced as a whole. The mirror
//! follows the session:
//!
//! - `Unknown`: no action
//! - `Authenticated`: fetch
//! - `Anonymous`: clear, without a request
//!
//! Every identity transition bumps a generation counter. A fetch that
//! resolves after the identity it was started for is gone is discarded, so
//! a signed-out user never sees a late cart reappear. Within one identity,
//! fetches are ticketed when issued and a response never replaces one
//! issued after it.
//!
//! The first fetch after a sign-in marks the cart as loaded for that user
//! (a failed fetch too, holding no cart), so a front end can wait for it
//! before rendering.
//!
//! Add, remove and checkout share one mutation lock: a mutating call and
//! its resynchronizing fetch complete before the next mutation starts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use shopfront_core::{Cart, CartItemId, Order, ProductId, UserId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::api::{ApiClient, ApiError};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::forms::validate_quantity;
use crate::session::{SessionState, SessionStore};

/// Keeps the local cart consistent with the server's.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CartSynchronizer {
    inner: Arc<CartInner>,
}

struct CartInner {
    api: ApiClient,
    cart: watch::Sender<Option<Cart>>,
    generation: AtomicU64,
    /// Last ticket handed to a fetch.
    issued: AtomicU64,
    /// Ticket of the fetch whose response is held.
    applied: AtomicU64,
    /// User whose sign-in fetch has settled.
    loaded: watch::Sender<Option<UserId>>,
    mutation: tokio::sync::Mutex<()>,
    observer: Mutex<Option<JoinHandle<()>>>,
}

impl CartSynchronizer {
    /// Create a synchronizer holding no cart.
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        let (cart, _) = watch::channel(None);
        let (loaded, _) = watch::channel(None);
        Self {
            inner: Arc::new(CartInner {
                api,
                cart,
                generation: AtomicU64::new(0),
                issued: AtomicU64::new(0),
                applied: AtomicU64::new(0),
                loaded,
                mutation: tokio::sync::Mutex::new(()),
                observer: Mutex::new(None),
            }),
        }
    }

    /// The cart currently held, if any.
    #[must_use]
    pub fn cart(&self) -> Option<Cart> {
        self.inner.cart.borrow().clone()
    }

    /// Receiver notified whenever the held cart is replaced.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Cart>> {
        self.inner.cart.subscribe()
    }

    /// Units across all lines of the held cart, 0 without one.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.inner.cart.borrow().as_ref().map_or(0, Cart::item_count)
    }

    /// Start following a session store.
    ///
    /// Replaces any previous observer. Must be called from within a Tokio
    /// runtime.
    pub fn observe(&self, session: &SessionStore) {
        let mut rx = session.subscribe();
        let this = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                let state = rx.borrow_and_update().clone();
                this.on_session(&state);
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });

        if let Ok(mut observer) = self.inner.observer.lock()
            && let Some(previous) = observer.replace(handle)
        {
            previous.abort();
        }
    }

    /// Wait until the cart of `user` has been loaded after sign-in, or the
    /// session no longer belongs to `user`.
    ///
    /// Returns at once when no observer is running.
    pub async fn wait_loaded(&self, session: &SessionStore, user: UserId) {
        if !self.is_observing() {
            return;
        }

        let mut loaded = self.inner.loaded.subscribe();
        let mut state = session.subscribe();
        tokio::select! {
            _ = loaded.wait_for(|held| *held == Some(user)) => {}
            _ = state.wait_for(|state| state.identity().map(|who| who.id) != Some(user)) => {}
        }
    }

    fn is_observing(&self) -> bool {
        self.inner
            .observer
            .lock()
            .is_ok_and(|observer| observer.as_ref().is_some_and(|handle| !handle.is_finished()))
    }

    /// Stop following the session store.
    pub fn stop(&self) {
        if let Ok(mut observer) = self.inner.observer.lock()
            && let Some(handle) = observer.take()
        {
            handle.abort();
        }
    }

    fn on_session(&self, state: &SessionState) {
        match state {
            SessionState::Unknown => {}
            SessionState::Authenticated(identity) => {
                let generation = self.advance();
                let user = identity.id;
                debug!(user_id = %user, generation, "Identity changed, fetching cart");
                let this = self.clone();
                tokio::spawn(async move {
                    let result = this.fetch(generation).await;
                    this.mark_loaded(generation, user);
                    if let Err(e) = result {
                        warn!(error = %e, "Failed to load cart");
                    }
                });
            }
            SessionState::Anonymous => {
                let generation = self.advance();
                debug!(generation, "Signed out, clearing cart");
                self.inner.cart.send_replace(None);
                self.inner.loaded.send_replace(None);
            }
        }
    }

    fn mark_loaded(&self, generation: u64, user: UserId) {
        self.inner.loaded.send_if_modified(|loaded| {
            if self.generation() != generation {
                return false;
            }
            *loaded = Some(user);
            true
        });
    }

    fn advance(&self) -> u64 {
        self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Fetch the cart and apply it if `generation` is still current and no
    /// later fetch has been applied.
    ///
    /// A failed fetch clears the held cart.
    async fn fetch(&self, generation: u64) -> std::result::Result<(), ApiError> {
        let ticket = self.inner.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.inner.api.cart().await;
        let next = result.as_ref().ok().cloned();

        // The watch lock is held inside the closure, so checks and the
        // replacement happen as one step.
        let applied = self.inner.cart.send_if_modified(|held| {
            if self.generation() != generation
                || self.inner.applied.fetch_max(ticket, Ordering::SeqCst) > ticket
            {
                return false;
            }
            *held = next;
            true
        });
        if !applied {
            debug!(generation, ticket, "Discarding superseded cart response");
        }

        result.map(|_| ())
    }

    /// Replace the held cart with the server's.
    ///
    /// # Errors
    ///
    /// Returns the API error; the held cart is cleared in that case.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> std::result::Result<(), ApiError> {
        self.fetch(self.generation()).await
    }

    /// Add units of a product, then resynchronize.
    ///
    /// # Errors
    ///
    /// Returns `FormError::InvalidQuantity` for zero without a request. If
    /// the add call fails the held cart is left untouched.
    #[instrument(skip(self))]
    pub async fn add_item(&self, product_id: ProductId, quantity: u32) -> Result<()> {
        let quantity = validate_quantity(quantity)?;

        let _guard = self.inner.mutation.lock().await;
        let generation = self.generation();
        self.inner.api.add_to_cart(product_id, quantity).await?;
        let product = product_id.to_string();
        add_breadcrumb("cart", "Added item", Some(&[("product_id", product.as_str())]));

        self.fetch(generation).await?;
        Ok(())
    }

    /// Remove a cart line, then resynchronize.
    ///
    /// # Errors
    ///
    /// If the remove call fails the held cart is left untouched.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, item_id: CartItemId) -> Result<()> {
        let _guard = self.inner.mutation.lock().await;
        let generation = self.generation();
        self.inner.api.remove_from_cart(item_id).await?;
        let item = item_id.to_string();
        add_breadcrumb("cart", "Removed item", Some(&[("item_id", item.as_str())]));

        self.fetch(generation).await?;
        Ok(())
    }

    /// Turn the held cart into an order, then resynchronize.
    ///
    /// `shipping_address` must already be validated.
    ///
    /// # Errors
    ///
    /// Returns `AppError::EmptyCart` without a request when no cart or an
    /// empty one is held. A failed resynchronization after the order was
    /// placed is logged, not returned.
    #[instrument(skip(self, shipping_address))]
    pub async fn checkout(&self, shipping_address: &str) -> Result<Order> {
        let _guard = self.inner.mutation.lock().await;
        if self.cart().is_none_or(|cart| cart.is_empty()) {
            return Err(AppError::EmptyCart);
        }

        let generation = self.generation();
        let order = self.inner.api.create_order(shipping_address).await?;
        let order_id = order.id.to_string();
        add_breadcrumb("checkout", "Placed order", Some(&[("order_id", order_id.as_str())]));

        if let Err(e) = self.fetch(generation).await {
            warn!(error = %e, order_id = %order.id, "Failed to reload cart after checkout");
        }
        Ok(order)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use reqwest::StatusCode;
    use secrecy::SecretString;
    use shopfront_core::Email;

    use crate::api::testing::{
        FakeTransport, cart_json, eventually, identity_json, ok_json, status,
    };
    use crate::api::{
        ApiRequest, ApiResponse, Credentials, Transport, TransportError, endpoints,
    };
    use crate::forms::FormError;

    fn api(fake: &Arc<FakeTransport>) -> ApiClient {
        ApiClient::new(fake.clone(), Duration::ZERO)
    }

    fn credentials() -> Credentials {
        Credentials::new(
            Email::parse("ada@example.com").unwrap(),
            SecretString::from("hunter22".to_string()),
        )
    }

    /// Backend with a cart of `quantities` that grows on add.
    fn backend(quantities: Vec<u32>) -> (Arc<FakeTransport>, Arc<StdMutex<Vec<u32>>>) {
        let lines = Arc::new(StdMutex::new(quantities));
        let fake = Arc::new(FakeTransport::new({
            let lines = lines.clone();
            move |request, _| match request.path.as_str() {
                endpoints::LOGIN | endpoints::PROFILE => ok_json(&identity_json(1, "ada")),
                endpoints::LOGOUT => ok_json(&serde_json::json!({})),
                endpoints::CART => ok_json(&cart_json(&lines.lock().unwrap())),
                endpoints::CART_ADD => {
                    let quantity = request.body.as_ref().unwrap()["quantity"].as_u64().unwrap();
                    lines.lock().unwrap().push(u32::try_from(quantity).unwrap());
                    ok_json(&serde_json::json!({}))
                }
                _ => status(StatusCode::NOT_FOUND),
            }
        }));
        (fake, lines)
    }

    async fn next_cart(rx: &mut watch::Receiver<Option<Cart>>) -> Option<Cart> {
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .unwrap()
            .unwrap();
        rx.borrow_and_update().clone()
    }

    #[tokio::test]
    async fn test_fetches_on_sign_in_and_clears_on_sign_out() {
        let (fake, _) = backend(vec![2, 1]);
        let session = SessionStore::new(api(&fake));
        let cart = CartSynchronizer::new(api(&fake));
        let mut rx = cart.subscribe();
        cart.observe(&session);

        session.login(&credentials()).await.unwrap();
        let held = next_cart(&mut rx).await.unwrap();
        assert_eq!(held.item_count(), 3);
        assert_eq!(cart.item_count(), 3);

        let fetches = fake.count(endpoints::CART);
        session.logout().await;
        assert!(next_cart(&mut rx).await.is_none());
        assert_eq!(fake.count(endpoints::CART), fetches);
        assert_eq!(cart.item_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_session_does_not_fetch() {
        let (fake, _) = backend(vec![1]);
        let session = SessionStore::new(api(&fake));
        let cart = CartSynchronizer::new(api(&fake));

        cart.observe(&session);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(fake.count(endpoints::CART), 0);
        assert!(cart.cart().is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_into_session_fetches_cart() {
        let (fake, _) = backend(vec![4]);
        let session = SessionStore::new(api(&fake));
        let cart = CartSynchronizer::new(api(&fake));
        let mut rx = cart.subscribe();
        cart.observe(&session);

        session.bootstrap().await;

        assert_eq!(next_cart(&mut rx).await.unwrap().item_count(), 4);
    }

    #[tokio::test]
    async fn test_late_cart_is_discarded_after_sign_out() {
        let (fake, _) = backend(vec![5]);
        fake.hold(endpoints::CART);
        let session = SessionStore::new(api(&fake));
        let cart = CartSynchronizer::new(api(&fake));
        cart.observe(&session);

        session.login(&credentials()).await.unwrap();
        eventually(|| fake.count(endpoints::CART) == 1).await;
        session.logout().await;
        eventually(|| cart.generation() == 2).await;

        fake.release(endpoints::CART);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(cart.cart().is_none());
    }

    #[tokio::test]
    async fn test_wait_loaded_returns_with_cart() {
        let (fake, _) = backend(vec![2]);
        let session = SessionStore::new(api(&fake));
        let cart = CartSynchronizer::new(api(&fake));
        cart.observe(&session);

        let identity = session.login(&credentials()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), cart.wait_loaded(&session, identity.id))
            .await
            .unwrap();

        assert_eq!(cart.item_count(), 2);
    }

    #[tokio::test]
    async fn test_wait_loaded_ends_on_sign_out() {
        let (fake, _) = backend(vec![2]);
        fake.hold(endpoints::CART);
        let session = SessionStore::new(api(&fake));
        let cart = CartSynchronizer::new(api(&fake));
        cart.observe(&session);

        let identity = session.login(&credentials()).await.unwrap();
        let waiting = tokio::spawn({
            let cart = cart.clone();
            let session = session.clone();
            async move { cart.wait_loaded(&session, identity.id).await }
        });
        session.logout().await;

        tokio::time::timeout(Duration::from_secs(2), waiting)
            .await
            .unwrap()
            .unwrap();
        fake.release(endpoints::CART);
    }

    #[tokio::test]
    async fn test_wait_loaded_without_observer_returns_at_once() {
        let (fake, _) = backend(vec![2]);
        let session = SessionStore::new(api(&fake));
        let cart = CartSynchronizer::new(api(&fake));

        let identity = session.login(&credentials()).await.unwrap();
        tokio::time::timeout(Duration::from_millis(50), cart.wait_loaded(&session, identity.id))
            .await
            .unwrap();

        assert_eq!(fake.count(endpoints::CART), 0);
    }

    #[tokio::test]
    async fn test_add_item_refetches() {
        let (fake, _) = backend(vec![1]);
        let cart = CartSynchronizer::new(api(&fake));
        cart.refresh().await.unwrap();

        cart.add_item(ProductId::new(42), 2).await.unwrap();

        assert_eq!(cart.item_count(), 3);
        assert_eq!(
            fake.paths(),
            vec![endpoints::CART, endpoints::CART_ADD, endpoints::CART]
        );
        let add = &fake.requests()[1];
        assert_eq!(
            add.body,
            Some(serde_json::json!({"product_id": 42, "quantity": 2}))
        );
    }

    #[tokio::test]
    async fn test_failed_add_keeps_cart() {
        let fake = Arc::new(FakeTransport::new(|request, _| {
            if request.path == endpoints::CART_ADD {
                Err(TransportError("offline".to_string()))
            } else {
                ok_json(&cart_json(&[2]))
            }
        }));
        let cart = CartSynchronizer::new(api(&fake));
        cart.refresh().await.unwrap();
        let before = cart.cart();

        let err = cart.add_item(ProductId::new(42), 1).await.unwrap_err();

        assert!(matches!(err, AppError::Api(ApiError::Network(_))));
        assert_eq!(cart.cart(), before);
        assert_eq!(fake.count(endpoints::CART), 1);
    }

    #[tokio::test]
    async fn test_zero_quantity_is_rejected_locally() {
        let (fake, _) = backend(vec![]);
        let cart = CartSynchronizer::new(api(&fake));

        let err = cart.add_item(ProductId::new(42), 0).await.unwrap_err();

        assert!(matches!(err, AppError::Form(FormError::InvalidQuantity)));
        assert!(fake.requests().is_empty());
    }

    #[tokio::test]
    async fn test_remove_unknown_line() {
        let fake = Arc::new(FakeTransport::new(|request, _| {
            if request.path == endpoints::CART {
                ok_json(&cart_json(&[1]))
            } else {
                Ok(ApiResponse::new(StatusCode::NOT_FOUND, r#"{"error": "Item not found."}"#))
            }
        }));
        let cart = CartSynchronizer::new(api(&fake));
        cart.refresh().await.unwrap();

        let err = cart.remove_item(CartItemId::new(99)).await.unwrap_err();

        assert!(matches!(err, AppError::Api(ApiError::NotFound(_))));
        assert_eq!(cart.item_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_clears_cart() {
        let fake = Arc::new(FakeTransport::new(|_, index| {
            if index == 0 {
                ok_json(&cart_json(&[1]))
            } else {
                status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }));
        let cart = CartSynchronizer::new(api(&fake));
        cart.refresh().await.unwrap();

        assert!(cart.refresh().await.is_err());
        assert!(cart.cart().is_none());
    }

    /// Answers the first cart request late.
    #[derive(Default)]
    struct SlowFirst {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Transport for SlowFirst {
        async fn send(&self, _: &ApiRequest) -> std::result::Result<ApiResponse, TransportError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
                return ok_json(&cart_json(&[1]));
            }
            ok_json(&cart_json(&[2]))
        }
    }

    #[tokio::test]
    async fn test_older_response_never_replaces_newer() {
        let transport = Arc::new(SlowFirst::default());
        let cart = CartSynchronizer::new(ApiClient::new(transport.clone(), Duration::ZERO));

        let first = tokio::spawn({
            let cart = cart.clone();
            async move { cart.refresh().await }
        });
        eventually(|| transport.calls.load(Ordering::SeqCst) == 1).await;
        cart.refresh().await.unwrap();
        first.await.unwrap().unwrap();

        assert_eq!(cart.item_count(), 2);
    }

    #[tokio::test]
    async fn test_refetch_is_idempotent() {
        let (fake, _) = backend(vec![3, 1]);
        let cart = CartSynchronizer::new(api(&fake));

        cart.refresh().await.unwrap();
        let first = cart.cart();
        cart.refresh().await.unwrap();

        assert_eq!(cart.cart(), first);
    }

    #[tokio::test]
    async fn test_mutations_are_serialized() {
        let (fake, _) = backend(vec![]);
        fake.hold(endpoints::CART);
        let cart = CartSynchronizer::new(api(&fake));

        let first = tokio::spawn({
            let cart = cart.clone();
            async move { cart.add_item(ProductId::new(1), 1).await }
        });
        eventually(|| fake.count(endpoints::CART) == 1).await;
        let second = tokio::spawn({
            let cart = cart.clone();
            async move { cart.add_item(ProductId::new(2), 1).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fake.count(endpoints::CART_ADD), 1);

        fake.release(endpoints::CART);
        fake.release(endpoints::CART);
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        assert_eq!(
            fake.paths(),
            vec![
                endpoints::CART_ADD,
                endpoints::CART,
                endpoints::CART_ADD,
                endpoints::CART
            ]
        );
        assert_eq!(cart.item_count(), 2);
    }

    #[tokio::test]
    async fn test_checkout_requires_items() {
        let (fake, _) = backend(vec![]);
        let cart = CartSynchronizer::new(api(&fake));

        let err = cart.checkout("1 Main St").await.unwrap_err();
        assert!(matches!(err, AppError::EmptyCart));

        cart.refresh().await.unwrap();
        let err = cart.checkout("1 Main St").await.unwrap_err();
        assert!(matches!(err, AppError::EmptyCart));
        assert_eq!(fake.count(endpoints::ORDER_CREATE), 0);
    }

    #[tokio::test]
    async fn test_checkout_resynchronizes() {
        let placed = Arc::new(StdMutex::new(false));
        let fake = Arc::new(FakeTransport::new({
            let placed = placed.clone();
            move |request, _| match request.path.as_str() {
                endpoints::ORDER_CREATE => {
                    *placed.lock().unwrap() = true;
                    Ok(ApiResponse::json(
                        StatusCode::CREATED,
                        &serde_json::json!({
                            "id": 77,
                            "status": "pending",
                            "total_price": "20.00",
                            "shipping_address": "1 Main St",
                            "items": [],
                            "created_at": "2026-05-01T12:00:00Z"
                        }),
                    ))
                }
                _ if *placed.lock().unwrap() => ok_json(&cart_json(&[])),
                _ => ok_json(&cart_json(&[2])),
            }
        }));
        let cart = CartSynchronizer::new(api(&fake));
        cart.refresh().await.unwrap();

        let order = cart.checkout("1 Main St").await.unwrap();

        assert_eq!(order.id.as_i64(), 77);
        assert!(cart.cart().unwrap().is_empty());
        assert_eq!(
            fake.requests()[1].body,
            Some(serde_json::json!({"shipping_address": "1 Main St"}))
        );
    }
}

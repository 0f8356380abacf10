//! Order history and checkout.

use shopfront_core::Order;
use tracing::{instrument, warn};

use crate::api::ApiClient;
use crate::cart::CartSynchronizer;
use crate::error::{AppError, Result};
use crate::forms::CheckoutForm;
use crate::session::SessionStore;

/// Order views for the signed-in shopper.
#[derive(Clone)]
pub struct OrderDesk {
    api: ApiClient,
    cart: CartSynchronizer,
    session: SessionStore,
}

impl OrderDesk {
    #[must_use]
    pub const fn new(api: ApiClient, cart: CartSynchronizer, session: SessionStore) -> Self {
        Self { api, cart, session }
    }

    /// Past orders, or none if they cannot be loaded.
    ///
    /// A session the server rejects for good is signed out locally.
    #[instrument(skip(self))]
    pub async fn history(&self) -> Vec<Order> {
        self.api.orders().await.unwrap_or_else(|e| {
            if e.is_unauthorized() {
                self.session.expire();
            }
            warn!(error = %e, "Failed to load order history, showing none");
            Vec::new()
        })
    }

    /// Place an order for the held cart.
    ///
    /// # Errors
    ///
    /// Returns `AppError::EmptyCart` when there is nothing to order (the
    /// view goes back to the cart), `AppError::Form` for a blank address,
    /// or the API error if the server refuses the order.
    #[instrument(skip(self, form))]
    pub async fn place_order(&self, form: &CheckoutForm) -> Result<Order> {
        if self.cart.cart().is_none_or(|cart| cart.is_empty()) {
            return Err(AppError::EmptyCart);
        }
        let address = form.validate()?;
        self.cart.checkout(&address).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use reqwest::StatusCode;

    use secrecy::SecretString;
    use shopfront_core::Email;

    use crate::api::testing::{FakeTransport, cart_json, identity_json, ok_json, status};
    use crate::api::{Credentials, endpoints};
    use crate::forms::FormError;
    use crate::session::SessionState;

    fn desk(fake: &Arc<FakeTransport>) -> OrderDesk {
        let api = ApiClient::new(fake.clone(), Duration::ZERO);
        OrderDesk::new(
            api.clone(),
            CartSynchronizer::new(api.clone()),
            SessionStore::new(api),
        )
    }

    #[tokio::test]
    async fn test_history_decodes_orders() {
        let fake = Arc::new(FakeTransport::new(|_, _| {
            ok_json(&serde_json::json!([{
                "id": 3,
                "status": "shipped",
                "total_price": "42.00",
                "shipping_address": "1 Main St",
                "items": [],
                "created_at": "2026-02-11T09:15:00Z"
            }]))
        }));

        let orders = desk(&fake).history().await;

        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status.label(), "Shipped");
    }

    #[tokio::test]
    async fn test_history_degrades_to_empty() {
        let fake = Arc::new(FakeTransport::new(|_, _| status(StatusCode::UNAUTHORIZED)));

        assert!(desk(&fake).history().await.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_history_signs_out_locally() {
        let fake = Arc::new(FakeTransport::new(|request, _| match request.path.as_str() {
            endpoints::LOGIN => ok_json(&identity_json(1, "ada")),
            _ => status(StatusCode::UNAUTHORIZED),
        }));
        let desk = desk(&fake);
        let credentials = Credentials::new(
            Email::parse("ada@example.com").unwrap(),
            SecretString::from("hunter22".to_string()),
        );
        desk.session.login(&credentials).await.unwrap();

        assert!(desk.history().await.is_empty());
        assert_eq!(desk.session.state(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn test_failed_history_keeps_session() {
        let fake = Arc::new(FakeTransport::new(|request, _| match request.path.as_str() {
            endpoints::LOGIN => ok_json(&identity_json(1, "ada")),
            _ => status(StatusCode::INTERNAL_SERVER_ERROR),
        }));
        let desk = desk(&fake);
        let credentials = Credentials::new(
            Email::parse("ada@example.com").unwrap(),
            SecretString::from("hunter22".to_string()),
        );
        desk.session.login(&credentials).await.unwrap();

        assert!(desk.history().await.is_empty());
        assert!(desk.session.state().is_authenticated());
    }

    #[tokio::test]
    async fn test_place_order_without_cart() {
        let fake = Arc::new(FakeTransport::new(|_, _| ok_json(&cart_json(&[]))));
        let form = CheckoutForm {
            shipping_address: "1 Main St".to_string(),
        };

        let err = desk(&fake).place_order(&form).await.unwrap_err();

        assert!(matches!(err, AppError::EmptyCart));
        assert!(fake.requests().is_empty());
    }

    #[tokio::test]
    async fn test_place_order_requires_address() {
        let fake = Arc::new(FakeTransport::new(|_, _| ok_json(&cart_json(&[1]))));
        let desk = desk(&fake);
        desk.cart.refresh().await.unwrap();

        let err = desk
            .place_order(&CheckoutForm::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Form(FormError::Required { .. })));
        assert_eq!(fake.count(endpoints::ORDER_CREATE), 0);
    }
}

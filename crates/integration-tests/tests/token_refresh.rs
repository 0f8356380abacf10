//! Transparent session refresh against the test API.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use shopfront_client::api::endpoints;
use shopfront_client::{AddToCart, ApiError, AppError, SessionState};
use shopfront_core::ProductId;
use shopfront_integration_tests::TestApi;

#[tokio::test]
async fn test_expired_session_refreshes_transparently() {
    let api = TestApi::start().await.unwrap();
    let storefront = api.signed_in().await.unwrap();
    let refreshes = api.hits(endpoints::TOKEN_REFRESH);

    api.expire_access_tokens();
    storefront.cart().refresh().await.unwrap();

    assert_eq!(api.hits(endpoints::TOKEN_REFRESH), refreshes + 1);
    assert!(storefront.session().state().is_authenticated());
    assert!(storefront.cart().cart().is_some());
}

#[tokio::test]
async fn test_mutation_is_retried_once_after_refresh() {
    let api = TestApi::start().await.unwrap();
    let storefront = api.signed_in().await.unwrap();

    api.expire_access_tokens();
    let outcome = storefront.add_to_cart(ProductId::new(1), 1).await.unwrap();

    assert_eq!(outcome, AddToCart::Added);
    assert_eq!(api.hits(endpoints::CART_ADD), 2);
    assert_eq!(storefront.cart().item_count(), 1);
}

#[tokio::test]
async fn test_refreshed_session_stays_valid() {
    let api = TestApi::start().await.unwrap();
    let storefront = api.signed_in().await.unwrap();

    api.expire_access_tokens();
    storefront.api().profile().await.unwrap();
    let refreshes = api.hits(endpoints::TOKEN_REFRESH);
    storefront.api().profile().await.unwrap();

    assert_eq!(api.hits(endpoints::TOKEN_REFRESH), refreshes);
}

#[tokio::test]
async fn test_revoked_session_signs_out_locally() {
    let api = TestApi::start().await.unwrap();
    let storefront = api.signed_in().await.unwrap();
    let mut cart = storefront.cart().subscribe();
    let refreshes = api.hits(endpoints::TOKEN_REFRESH);

    api.expire_access_tokens();
    api.revoke_refresh_tokens();
    let err = storefront
        .add_to_cart(ProductId::new(1), 1)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Api(ApiError::Unauthorized { .. })));
    assert_eq!(api.hits(endpoints::TOKEN_REFRESH), refreshes + 1);
    assert_eq!(api.hits(endpoints::CART_ADD), 1);
    assert_eq!(storefront.session().state(), SessionState::Anonymous);
    tokio::time::timeout(Duration::from_secs(5), cart.wait_for(Option::is_none))
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_public_catalog_needs_no_refresh() {
    let api = TestApi::start().await.unwrap();
    let storefront = api.storefront().unwrap();
    storefront.start().await;
    let refreshes = api.hits(endpoints::TOKEN_REFRESH);

    let products = storefront
        .catalog()
        .browse(&shopfront_client::ProductQuery::all())
        .await;

    assert_eq!(products.len(), 4);
    assert_eq!(api.hits(endpoints::TOKEN_REFRESH), refreshes);
}

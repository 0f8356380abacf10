//! Catalog views against the test API.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use shopfront_client::api::endpoints;
use shopfront_client::{ClientConfig, ProductPage, ProductQuery, Storefront};
use shopfront_integration_tests::TestApi;

#[tokio::test]
async fn test_browse_by_category() {
    let api = TestApi::start().await.unwrap();
    let storefront = api.storefront().unwrap();

    let teaware = storefront
        .catalog()
        .browse(&ProductQuery::all().in_category("teaware"))
        .await;

    let slugs: Vec<_> = teaware.iter().map(|p| p.slug.as_str()).collect();
    assert_eq!(slugs, ["teapot", "tea-cup"]);
}

#[tokio::test]
async fn test_search_is_case_insensitive() {
    let api = TestApi::start().await.unwrap();
    let storefront = api.storefront().unwrap();

    let found = storefront
        .catalog()
        .browse(&ProductQuery::all().matching("TEAPOT"))
        .await;

    assert_eq!(found.len(), 1);
    assert!(!found[0].in_stock);
}

#[tokio::test]
async fn test_blank_filters_list_everything() {
    let api = TestApi::start().await.unwrap();
    let storefront = api.storefront().unwrap();

    let everything = storefront
        .catalog()
        .browse(&ProductQuery::all().in_category("  ").matching(""))
        .await;

    assert_eq!(everything.len(), 4);
}

#[tokio::test]
async fn test_categories() {
    let api = TestApi::start().await.unwrap();
    let storefront = api.storefront().unwrap();

    let categories = storefront.catalog().categories().await;

    assert_eq!(categories.len(), 2);
    assert_eq!(categories[0].slug, "tea");
}

#[tokio::test]
async fn test_product_page() {
    let api = TestApi::start().await.unwrap();
    let storefront = api.storefront().unwrap();

    let ProductPage::Found(product) = storefront.catalog().product_page("green-tea").await else {
        panic!("green tea is seeded");
    };
    assert_eq!(product.price.to_string(), "12.50");
    assert_eq!(product.category.unwrap().slug, "tea");

    assert_eq!(
        storefront.catalog().product_page("oolong").await,
        ProductPage::RedirectHome
    );
}

#[tokio::test]
async fn test_catalog_cache_serves_repeat_reads() {
    let api = TestApi::start().await.unwrap();
    let mut config = api.config().unwrap();
    config.catalog_cache_ttl = Duration::from_secs(60);
    let storefront = Storefront::new(config).unwrap();

    storefront.catalog().categories().await;
    storefront.catalog().categories().await;
    assert_eq!(api.hits(endpoints::CATEGORIES), 1);

    storefront.api().invalidate_catalog();
    storefront.catalog().categories().await;
    assert_eq!(api.hits(endpoints::CATEGORIES), 2);
}

#[tokio::test]
async fn test_unreachable_api_degrades_to_empty() {
    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/", closed.local_addr().unwrap());
    drop(closed);
    let storefront = Storefront::new(ClientConfig::for_base_url(&url).unwrap()).unwrap();

    assert!(storefront.catalog().browse(&ProductQuery::all()).await.is_empty());
    assert!(storefront.catalog().categories().await.is_empty());
}

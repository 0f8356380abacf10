//! Catalog views.
//!
//! Browsing degrades instead of failing: a list that cannot be loaded is
//! shown empty, and a product page that cannot be loaded sends the shopper
//! back home.

use shopfront_core::{Category, Product};
use tracing::{instrument, warn};

use crate::api::{ApiClient, ProductQuery};

/// What a product page should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductPage {
    Found(Box<Product>),
    /// Unknown slug or failed load.
    RedirectHome,
}

/// Read-only catalog access for views.
#[derive(Clone)]
pub struct Catalog {
    api: ApiClient,
}

impl Catalog {
    #[must_use]
    pub const fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Products matching `query`, or none if they cannot be loaded.
    #[instrument(skip(self))]
    pub async fn browse(&self, query: &ProductQuery) -> Vec<Product> {
        self.api.products(query).await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load products, showing none");
            Vec::new()
        })
    }

    /// All categories, or none if they cannot be loaded.
    #[instrument(skip(self))]
    pub async fn categories(&self) -> Vec<Category> {
        self.api.categories().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load categories, showing none");
            Vec::new()
        })
    }

    /// Load a product page.
    #[instrument(skip(self))]
    pub async fn product_page(&self, slug: &str) -> ProductPage {
        match self.api.product(slug).await {
            Ok(product) => ProductPage::Found(Box::new(product)),
            Err(e) if e.is_not_found() => ProductPage::RedirectHome,
            Err(e) => {
                warn!(error = %e, "Failed to load product, redirecting home");
                ProductPage::RedirectHome
            }
        }
    }
}

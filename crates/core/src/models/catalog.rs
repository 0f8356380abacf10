//! Catalog models: categories and products.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Amount, CategoryId, ProductId};

/// A product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
}

/// A product as returned by the list and detail endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    pub price: Amount,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub in_stock: bool,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

const fn default_true() -> bool {
    true
}

impl Product {
    /// Clamp a requested quantity into what can be added from a product view.
    ///
    /// Mirrors the quantity stepper: never below one, never above the stock
    /// the server reported. Returns `None` when the product is out of stock.
    #[must_use]
    pub fn clamp_quantity(&self, requested: u32) -> Option<u32> {
        if !self.in_stock || self.stock == 0 {
            return None;
        }
        Some(requested.clamp(1, self.stock))
    }
}

/// The subset of product fields the cart views need.
///
/// Cart and order lines embed a full product on the wire; this view keeps
/// only what a line renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSummary<'a> {
    pub id: ProductId,
    pub name: &'a str,
    pub slug: &'a str,
    pub price: Amount,
    pub image: Option<&'a str>,
}

impl<'a> From<&'a Product> for ProductSummary<'a> {
    fn from(product: &'a Product) -> Self {
        Self {
            id: product.id,
            name: &product.name,
            slug: &product.slug,
            price: product.price,
            image: product.image.as_deref(),
        }
    }
}

//! Cache types for catalog responses.

use shopfront_core::{Category, Product};

use super::payloads::ProductQuery;

/// Cache key for catalog lookups.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Categories,
    Products(ProductQuery),
    Product(String),
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Categories(Vec<Category>),
    Products(Vec<Product>),
    Product(Box<Product>),
}

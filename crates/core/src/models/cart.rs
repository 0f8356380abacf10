//! The server-authoritative shopping cart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::catalog::Product;
use crate::types::{Amount, CartId, CartItemId};

/// One line of the cart.
///
/// `subtotal` is `quantity x product.price` as computed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub product: Product,
    pub quantity: u32,
    pub subtotal: Amount,
}

/// The cart of the current identity.
///
/// Replaced as a whole after every fetch; never patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    #[serde(default)]
    pub id: Option<CartId>,
    #[serde(default)]
    pub cart_items: Vec<CartItem>,
    pub total: Amount,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Cart {
    /// Number of units across all lines, for the cart badge.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.cart_items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cart_items.is_empty()
    }

    /// Find a line by its ID.
    #[must_use]
    pub fn item(&self, id: CartItemId) -> Option<&CartItem> {
        self.cart_items.iter().find(|item| item.id == id)
    }
}

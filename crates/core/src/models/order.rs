//! Placed orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::catalog::Product;
use crate::types::{Amount, OrderId, OrderItemId, OrderStatus};

/// A line of a placed order, priced at the moment the order was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product: Product,
    pub quantity: u32,
    pub price: Amount,
    pub subtotal: Amount,
}

/// An order in the current user's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(default)]
    pub status: OrderStatus,
    pub total_price: Amount,
    #[serde(default)]
    pub shipping_address: String,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
}

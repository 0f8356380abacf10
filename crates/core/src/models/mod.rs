//! Wire models of the storefront REST API.
//!
//! Field names follow the API's JSON exactly so the types deserialize
//! without renames. Every derived value (`subtotal`, `total`, `in_stock`)
//! is the server's; the client displays it and never recomputes it.

pub mod cart;
pub mod catalog;
pub mod identity;
pub mod listing;
pub mod order;

pub use cart::{Cart, CartItem};
pub use catalog::{Category, Product, ProductSummary};
pub use identity::Identity;
pub use listing::Listing;
pub use order::{Order, OrderItem};

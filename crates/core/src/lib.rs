//! Shopfront Core - Shared types library.
//!
//! This crate provides the types exchanged with the storefront REST API and
//! shared by the other Shopfront crates:
//! - `client` - Session, cart and routing synchronization layer
//! - `cli` - Terminal front end for the client
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O and no HTTP clients. The
//! server is authoritative for every computed value (subtotals, totals,
//! stock); these types carry those values, they never derive them.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, emails, amounts and statuses
//! - [`models`] - Wire models for identities, catalog, carts and orders

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod models;
pub mod types;

pub use models::*;
pub use types::*;

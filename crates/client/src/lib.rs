//! Shopfront Client - session, cart and route synchronization layer.
//!
//! This crate keeps a storefront front end consistent with a remote,
//! server-authoritative REST API:
//!
//! - [`api`] - HTTP transport, one-shot session refresh on 401, endpoint calls
//! - [`session`] - Who is signed in (`Unknown` / `Authenticated` / `Anonymous`)
//! - [`cart`] - Local mirror of the server cart, refetched after every change
//! - [`guard`] - Route protection with resume-after-login
//! - [`catalog`], [`orders`] - Views that degrade instead of failing
//! - [`forms`] - Local validation before anything is sent
//! - [`app`] - The [`Storefront`] container wiring it all together
//!
//! # Example
//!
//! ```rust,ignore
//! use shopfront_client::{ClientConfig, Storefront};
//!
//! let storefront = Storefront::new(ClientConfig::from_env()?)?;
//! storefront.start().await;
//!
//! for product in storefront.catalog().browse(&ProductQuery::all()).await {
//!     println!("{} {}", product.name, product.price);
//! }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod app;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod error;
pub mod forms;
pub mod guard;
pub mod orders;
pub mod session;

pub use api::{ApiClient, ApiError, ProductQuery};
pub use app::{AddToCart, Storefront};
pub use cart::CartSynchronizer;
pub use catalog::{Catalog, ProductPage};
pub use config::{ClientConfig, ConfigError};
pub use error::{AppError, Result};
pub use forms::{CheckoutForm, FormError, LoginForm, RegisterForm};
pub use guard::{GuardDecision, ResumeTarget, Route};
pub use orders::OrderDesk;
pub use session::{SessionState, SessionStore};

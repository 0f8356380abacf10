//! Unified error handling with Sentry integration.
//!
//! Every layer has its own `thiserror` enum; [`AppError`] wraps them for the
//! views and [`AppError::user_message`] turns any of them into text that is
//! safe to show a shopper.

use thiserror::Error;

use crate::api::{ApiError, TransportError};
use crate::config::ConfigError;
use crate::forms::FormError;

/// Application-level error type for the storefront client.
#[derive(Debug, Error)]
pub enum AppError {
    /// Storefront API call failed.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Form input rejected before any request was made.
    #[error("Form error: {0}")]
    Form(#[from] FormError),

    /// Configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// The HTTP transport could not be built.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Checkout was attempted without anything in the cart.
    #[error("Cart is empty")]
    EmptyCart,
}

impl AppError {
    /// Message for display next to the action that failed.
    ///
    /// Server-side details are only passed through when the server addressed
    /// them to the user (validation messages and sign-in failures).
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(err) => match err {
                ApiError::Network(_) => {
                    "Could not reach the store. Check your connection and try again.".to_string()
                }
                ApiError::Unauthorized { detail } => detail
                    .clone()
                    .unwrap_or_else(|| "Please sign in to continue.".to_string()),
                ApiError::Validation(errors) => errors.to_string(),
                ApiError::NotFound(_) => "The requested item could not be found.".to_string(),
                ApiError::RateLimited(secs) => {
                    format!("Too many attempts. Try again in {secs} seconds.")
                }
                ApiError::Server { .. } | ApiError::Decode(_) => {
                    "Something went wrong. Please try again later.".to_string()
                }
            },
            Self::Form(err) => err.to_string(),
            Self::Config(_) | Self::Transport(_) => {
                "The storefront is not configured correctly.".to_string()
            }
            Self::EmptyCart => "Your cart is empty.".to_string(),
        }
    }

    /// Whether the failure is ours or the server's rather than the shopper's.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Api(ApiError::Server { .. } | ApiError::Decode(_))
                | Self::Config(_)
                | Self::Transport(_)
        )
    }

    /// Capture internal failures to Sentry and log them.
    pub fn report(&self) {
        if self.is_internal() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Storefront error"
            );
        }
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context.
///
/// Call this after sign-in to associate errors with the shopper.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for a shopper action.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added item", Some(&[("product_id", "42")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    for (key, value) in data.unwrap_or_default() {
        breadcrumb.data.insert(
            (*key).to_string(),
            serde_json::Value::String((*value).to_string()),
        );
    }

    sentry::add_breadcrumb(breadcrumb);
}

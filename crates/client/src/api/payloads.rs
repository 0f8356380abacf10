//! Request payloads.

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use shopfront_core::{Email, ProductId};

/// Sign-in credentials.
#[derive(Debug)]
pub struct Credentials {
    pub email: Email,
    pub password: SecretString,
}

impl Credentials {
    #[must_use]
    pub const fn new(email: Email, password: SecretString) -> Self {
        Self { email, password }
    }

    pub(crate) fn to_body(&self) -> Value {
        json!({
            "email": self.email.as_str(),
            "password": self.password.expose_secret(),
        })
    }
}

/// A new account.
///
/// The password confirmation has already been checked locally; the server
/// still expects it as `password2`.
#[derive(Debug)]
pub struct Registration {
    pub username: String,
    pub email: Email,
    pub password: SecretString,
}

impl Registration {
    /// Credentials for signing in to the freshly created account.
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials {
            email: self.email.clone(),
            password: SecretString::from(self.password.expose_secret().to_owned()),
        }
    }

    pub(crate) fn to_body(&self) -> Value {
        let password = self.password.expose_secret();
        json!({
            "username": self.username,
            "email": self.email.as_str(),
            "password": password,
            "password2": password,
        })
    }
}

pub(crate) fn add_to_cart_body(product_id: ProductId, quantity: u32) -> Value {
    json!({ "product_id": product_id, "quantity": quantity })
}

pub(crate) fn create_order_body(shipping_address: &str) -> Value {
    json!({ "shipping_address": shipping_address })
}

/// Filters for the product list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProductQuery {
    /// Category slug.
    pub category: Option<String>,
    /// Free-text search.
    pub search: Option<String>,
}

impl ProductQuery {
    /// All products.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to a category slug.
    #[must_use]
    pub fn in_category(mut self, slug: impl Into<String>) -> Self {
        self.category = Some(slug.into());
        self
    }

    /// Add a search term.
    #[must_use]
    pub fn matching(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Trimmed copy with blank filters dropped, used both for the query
    /// string and as the cache key.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let clean = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
        };
        Self {
            category: clean(&self.category),
            search: clean(&self.search),
        }
    }

    pub(crate) fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let normalized = self.normalized();
        let mut pairs = Vec::new();
        if let Some(category) = normalized.category {
            pairs.push(("category", category));
        }
        if let Some(search) = normalized.search {
            pairs.push(("search", search));
        }
        pairs
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_register_body_repeats_password() {
        let registration = Registration {
            username: "ada".to_string(),
            email: Email::parse("ada@example.com").unwrap(),
            password: SecretString::from("hunter22".to_string()),
        };
        let body = registration.to_body();
        assert_eq!(body["password"], "hunter22");
        assert_eq!(body["password2"], "hunter22");
        assert_eq!(registration.credentials().to_body()["email"], "ada@example.com");
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let credentials = Credentials::new(
            Email::parse("ada@example.com").unwrap(),
            SecretString::from("hunter22".to_string()),
        );
        assert!(!format!("{credentials:?}").contains("hunter22"));
    }

    #[test]
    fn test_query_drops_blank_filters() {
        let query = ProductQuery::all().in_category("  ").matching("  tea cup ");
        assert_eq!(query.to_pairs(), vec![("search", "tea cup".to_string())]);
        assert!(ProductQuery::all().to_pairs().is_empty());
    }

    #[test]
    fn test_add_to_cart_body() {
        let body = add_to_cart_body(ProductId::new(42), 2);
        assert_eq!(body, json!({"product_id": 42, "quantity": 2}));
    }
}

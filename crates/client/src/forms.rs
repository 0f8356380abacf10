//! Form input validated locally before anything is sent.
//!
//! Each form turns raw text fields into the typed payload its action needs.
//! A form that fails here never causes a request.

use secrecy::SecretString;
use shopfront_core::{Email, EmailError};
use thiserror::Error;

use crate::api::{Credentials, Registration};

/// Reasons a form is rejected locally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    /// A required field is blank.
    #[error("{field} is required")]
    Required { field: &'static str },

    /// The email field does not hold an email address.
    #[error("Invalid email address: {0}")]
    InvalidEmail(#[from] EmailError),

    /// The password confirmation differs from the password.
    #[error("Passwords do not match")]
    PasswordMismatch,

    /// A cart quantity below one.
    #[error("Quantity must be at least 1")]
    InvalidQuantity,
}

fn required(field: &'static str, value: &str) -> Result<(), FormError> {
    if value.trim().is_empty() {
        return Err(FormError::Required { field });
    }
    Ok(())
}

/// Sign-in form.
#[derive(Debug, Clone, Default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl LoginForm {
    /// Validate into credentials.
    ///
    /// # Errors
    ///
    /// Returns `FormError` for a blank field or a malformed email.
    pub fn validate(self) -> Result<Credentials, FormError> {
        required("Email", &self.email)?;
        required("Password", &self.password)?;
        Ok(Credentials::new(
            Email::parse(&self.email)?,
            SecretString::from(self.password),
        ))
    }
}

/// Account creation form.
#[derive(Debug, Clone, Default)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
}

impl RegisterForm {
    /// Validate into a registration.
    ///
    /// # Errors
    ///
    /// Returns `FormError::PasswordMismatch` when the confirmation differs,
    /// or another `FormError` for blank or malformed fields.
    pub fn validate(self) -> Result<Registration, FormError> {
        if self.password != self.password_confirmation {
            return Err(FormError::PasswordMismatch);
        }
        required("Username", &self.username)?;
        required("Email", &self.email)?;
        required("Password", &self.password)?;

        Ok(Registration {
            username: self.username.trim().to_string(),
            email: Email::parse(&self.email)?,
            password: SecretString::from(self.password),
        })
    }
}

/// Checkout form.
#[derive(Debug, Clone, Default)]
pub struct CheckoutForm {
    pub shipping_address: String,
}

impl CheckoutForm {
    /// The trimmed shipping address.
    ///
    /// # Errors
    ///
    /// Returns `FormError::Required` for a blank address.
    pub fn validate(&self) -> Result<String, FormError> {
        required("Shipping address", &self.shipping_address)?;
        Ok(self.shipping_address.trim().to_string())
    }
}

/// Check a quantity to add to the cart.
///
/// # Errors
///
/// Returns `FormError::InvalidQuantity` for zero.
pub const fn validate_quantity(quantity: u32) -> Result<u32, FormError> {
    if quantity == 0 {
        return Err(FormError::InvalidQuantity);
    }
    Ok(quantity)
}

//! Monetary amounts as rendered by the storefront API.
//!
//! Django REST Framework renders model decimal fields as strings (`"149.90"`)
//! while computed properties such as a cart total may arrive as JSON numbers.
//! [`Amount`] accepts both and keeps the exact decimal value.
//!
//! There is deliberately no arithmetic on this type: subtotals and totals are
//! computed by the server and displayed as delivered.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A decimal amount in the store currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(Decimal);

impl Amount {
    /// Zero, used for an absent cart.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Wrap a decimal value.
    #[must_use]
    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// The exact decimal value.
    #[must_use]
    pub const fn value(&self) -> Decimal {
        self.0
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl fmt::Display for Amount {
    /// Two fractional digits, no currency symbol (formatting is the view's job).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_from_decimal_string() {
        let amount: Amount = serde_json::from_str("\"149.90\"").unwrap();
        assert_eq!(amount.value(), Decimal::new(14990, 2));
    }

    #[test]
    fn test_amount_from_json_number() {
        let amount: Amount = serde_json::from_str("299.8").unwrap();
        assert_eq!(amount.to_string(), "299.80");
    }

    #[test]
    fn test_amount_from_integer() {
        let amount: Amount = serde_json::from_str("0").unwrap();
        assert_eq!(amount, Amount::ZERO);
    }
}

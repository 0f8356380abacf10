//! The signed-in user's profile.

use serde::{Deserialize, Serialize};

use crate::types::{Email, UserId};

/// The authenticated user as returned by login and the profile endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub username: String,
    pub email: Email,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl Identity {
    /// Single uppercase initial for avatar badges, `U` when the username is blank.
    #[must_use]
    pub fn initial(&self) -> char {
        self.username
            .chars()
            .next()
            .and_then(|c| c.to_uppercase().next())
            .unwrap_or('U')
    }
}

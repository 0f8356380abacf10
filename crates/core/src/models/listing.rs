//! List responses, paginated or not.

use serde::{Deserialize, Serialize};

/// A list endpoint response.
///
/// Endpoints answer with a bare JSON array unless server-side pagination is
/// enabled, in which case the items sit under `results`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Plain(Vec<T>),
    Paginated {
        #[serde(default)]
        count: Option<u64>,
        #[serde(default)]
        next: Option<String>,
        #[serde(default)]
        previous: Option<String>,
        #[serde(default = "Vec::new")]
        results: Vec<T>,
    },
}

impl<T> Listing<T> {
    /// The items of the page, whichever shape the server used.
    #[must_use]
    pub fn into_items(self) -> Vec<T> {
        match self {
            Self::Plain(items) | Self::Paginated { results: items, .. } => items,
        }
    }
}

impl<T> From<Listing<T>> for Vec<T> {
    fn from(listing: Listing<T>) -> Self {
        listing.into_items()
    }
}

//! Typed failures of storefront API calls.

use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

use super::transport::{ApiResponse, TransportError};

/// Longest server body excerpt kept in an error.
const BODY_EXCERPT_CHARS: usize = 200;

/// Errors returned by [`super::ApiClient`] calls.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// No response was received.
    #[error("Network error: {0}")]
    Network(#[from] TransportError),

    /// The session is missing or expired and could not be renewed.
    #[error("Unauthorized: {}", .detail.as_deref().unwrap_or("authentication required"))]
    Unauthorized { detail: Option<String> },

    /// The server rejected the submitted fields.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the server.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Any other non-success status.
    #[error("Server error {status}: {detail}")]
    Server { status: u16, detail: String },

    /// A success response whose body did not match the expected shape.
    #[error("Response decode error: {0}")]
    Decode(String),
}

impl ApiError {
    /// Map a non-success response to an error.
    #[must_use]
    pub fn from_response(response: &ApiResponse) -> Self {
        let detail = detail_of(&response.body);
        match response.status {
            StatusCode::UNAUTHORIZED => Self::Unauthorized { detail },
            StatusCode::BAD_REQUEST => Self::Validation(ValidationErrors::from_body(&response.body)),
            StatusCode::NOT_FOUND => Self::NotFound(detail.unwrap_or_else(|| "Not found".to_string())),
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited(response.retry_after.unwrap_or(1)),
            status => Self::Server {
                status: status.as_u16(),
                detail: detail.unwrap_or_else(|| excerpt(&response.body)),
            },
        }
    }

    /// Whether the failure means there is no valid session.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Whether the requested resource does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// The server's `detail` message, if it sent one.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Unauthorized { detail } => detail.as_deref(),
            Self::NotFound(detail) | Self::Server { detail, .. } => Some(detail),
            Self::Validation(errors) => Some(errors.message()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Field errors from a `400 Bad Request` body.
///
/// The server answers with an object mapping field names to a message or a
/// list of messages, e.g. `{"email": ["Enter a valid email address."],
/// "password": ["Too short.", "Too common."]}`. [`Self::message`] flattens
/// every value in key order into one space-separated sentence for display
/// next to the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: Vec<(String, Vec<String>)>,
    message: String,
}

impl ValidationErrors {
    /// Parse a response body. Bodies that are not JSON objects are kept whole.
    #[must_use]
    pub fn from_body(body: &str) -> Self {
        let fields = match serde_json::from_str::<serde_json::Value>(body) {
            Ok(serde_json::Value::Object(map)) => map
                .into_iter()
                .map(|(field, value)| (field, flatten(value)))
                .collect(),
            Ok(other) => vec![("non_field_errors".to_string(), flatten(other))],
            Err(_) if body.trim().is_empty() => Vec::new(),
            Err(_) => vec![("non_field_errors".to_string(), vec![excerpt(body)])],
        };
        let message = fields
            .iter()
            .flat_map(|(_, messages)| messages.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");

        Self { fields, message }
    }

    /// All messages joined by a single space.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Messages for one field.
    #[must_use]
    pub fn field(&self, name: &str) -> &[String] {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map_or(&[], |(_, messages)| messages.as_slice())
    }

    /// Whether the server sent no messages at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.message.is_empty()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("request rejected")
        } else {
            f.write_str(&self.message)
        }
    }
}

/// Expand a field value into its messages.
fn flatten(value: serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Null => Vec::new(),
        serde_json::Value::String(s) => vec![s],
        serde_json::Value::Array(values) => values.into_iter().flat_map(flatten).collect(),
        serde_json::Value::Object(map) => map.into_iter().flat_map(|(_, v)| flatten(v)).collect(),
        other => vec![other.to_string()],
    }
}

/// Extract `detail` (or `error`) from a JSON object body.
fn detail_of(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["detail", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()).map(ToString::to_string))
}

fn excerpt(body: &str) -> String {
    body.trim().chars().take(BODY_EXCERPT_CHARS).collect()
}

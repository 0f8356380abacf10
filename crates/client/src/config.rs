//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_API_URL` - Base URL of the storefront REST API (e.g. `https://shop.example.com`)
//!
//! ## Optional
//! - `STOREFRONT_REQUEST_TIMEOUT_SECS` - Per-request timeout (default: none)
//! - `STOREFRONT_CATALOG_CACHE_TTL_SECS` - Catalog cache lifetime, 0 disables (default: 300)
//! - `STOREFRONT_USER_AGENT` - User agent sent with every request (default: `shopfront/<version>`)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_CATALOG_CACHE_TTL_SECS: u64 = 300;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the storefront API; endpoint paths are joined onto it
    pub api_base_url: Url,
    /// Optional per-request timeout. Requests wait indefinitely when unset.
    pub request_timeout: Option<Duration>,
    /// How long catalog responses stay cached
    pub catalog_cache_ttl: Duration,
    /// User agent header value
    pub user_agent: String,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_base_url = parse_base_url(&get_required_env("STOREFRONT_API_URL")?)?;
        let request_timeout = get_optional_env("STOREFRONT_REQUEST_TIMEOUT_SECS")
            .map(|value| parse_secs("STOREFRONT_REQUEST_TIMEOUT_SECS", &value))
            .transpose()?;
        let catalog_cache_ttl = match get_optional_env("STOREFRONT_CATALOG_CACHE_TTL_SECS") {
            Some(value) => parse_secs("STOREFRONT_CATALOG_CACHE_TTL_SECS", &value)?,
            None => Duration::from_secs(DEFAULT_CATALOG_CACHE_TTL_SECS),
        };

        Ok(Self {
            api_base_url,
            request_timeout,
            catalog_cache_ttl,
            user_agent: get_optional_env("STOREFRONT_USER_AGENT")
                .unwrap_or_else(default_user_agent),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Configuration for a given API URL with every optional setting at its default.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if the URL is not an absolute http(s) URL.
    pub fn for_base_url(api_base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_base_url: parse_base_url(api_base_url)?,
            request_timeout: None,
            catalog_cache_ttl: Duration::from_secs(DEFAULT_CATALOG_CACHE_TTL_SECS),
            user_agent: default_user_agent(),
            sentry_dsn: None,
            sentry_environment: None,
        })
    }

    /// Whether catalog responses should be cached at all.
    #[must_use]
    pub const fn catalog_cache_enabled(&self) -> bool {
        !self.catalog_cache_ttl.is_zero()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable, treating blank values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn default_user_agent() -> String {
    format!("shopfront/{}", env!("CARGO_PKG_VERSION"))
}

/// Parse a whole number of seconds.
fn parse_secs(key: &str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse the API base URL.
///
/// A trailing slash is enforced so that `Url::join` appends endpoint paths
/// instead of replacing the last path segment.
fn parse_base_url(value: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidEnvVar("STOREFRONT_API_URL".to_string(), reason);

    let mut url = Url::parse(value.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("URL must have a host".to_string()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

//! Cart sync configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CARTSYNC_API_BASE_URL` - Base URL of the commerce API (http or https)
//!
//! ## Optional
//! - `CARTSYNC_API_TOKEN` - Bearer token sent with every API request
//! - `CARTSYNC_DEBOUNCE_MS` - Quiet period before a product's edits are flushed (default: 300)
//! - `CARTSYNC_REQUEST_TIMEOUT_SECS` - Per-request HTTP timeout (default: 10)
//! - `CARTSYNC_BATCH_FLUSH` - Submit products expiring together as one batch call (default: false)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Shortest accepted debounce window.
pub const MIN_DEBOUNCE_MS: u64 = 50;
/// Longest accepted debounce window.
pub const MAX_DEBOUNCE_MS: u64 = 5_000;
/// Debounce window used when none is configured.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;
/// Request timeout used when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Cart sync application configuration.
#[derive(Debug, Clone)]
pub struct CartSyncConfig {
    /// Commerce API connection settings
    pub api: ApiConfig,
    /// Coalescer tuning
    pub sync: SyncSettings,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Commerce API connection settings.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct ApiConfig {
    /// Base URL, always ending in `/` so relative joins keep its path
    pub base_url: Url,
    /// Optional bearer token
    pub token: Option<SecretString>,
    /// Per-request timeout applied by the HTTP client
    pub request_timeout: Duration,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ApiConfig {
    /// Settings for `base_url` with no token and the default timeout.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if `base_url` is not an http(s) URL.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url("CARTSYNC_API_BASE_URL", base_url)?,
            token: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        })
    }
}

/// Tuning for the mutation coalescer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Quiet period after a product's last edit before its net delta is sent
    pub debounce: Duration,
    /// Collect products whose windows expire together into one batch call
    pub batch_flush: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            batch_flush: false,
        }
    }
}

impl SyncSettings {
    /// Settings with the given debounce window and single-product flushes.
    #[must_use]
    pub const fn with_debounce(debounce: Duration) -> Self {
        Self {
            debounce,
            batch_flush: false,
        }
    }
}

impl CartSyncConfig {
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

        let base_url = get_required_env("CARTSYNC_API_BASE_URL")?;
        let base_url = parse_base_url("CARTSYNC_API_BASE_URL", &base_url)?;
        let token = get_optional_env("CARTSYNC_API_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .map(SecretString::from);
        let request_timeout = parse_timeout_secs(
            "CARTSYNC_REQUEST_TIMEOUT_SECS",
            &get_env_or_default(
                "CARTSYNC_REQUEST_TIMEOUT_SECS",
                &DEFAULT_REQUEST_TIMEOUT_SECS.to_string(),
            ),
        )?;
        let debounce = parse_debounce_ms(
            "CARTSYNC_DEBOUNCE_MS",
            &get_env_or_default("CARTSYNC_DEBOUNCE_MS", &DEFAULT_DEBOUNCE_MS.to_string()),
        )?;
        let batch_flush = parse_bool(
            "CARTSYNC_BATCH_FLUSH",
            &get_env_or_default("CARTSYNC_BATCH_FLUSH", "false"),
        )?;

        Ok(Self {
            api: ApiConfig {
                base_url,
                token,
                request_timeout,
            },
            sync: SyncSettings {
                debounce,
                batch_flush,
            },
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an http(s) base URL, appending a trailing `/` to its path.
fn parse_base_url(var_name: &str, value: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(value.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

/// Parse a debounce window in milliseconds within the accepted range.
fn parse_debounce_ms(var_name: &str, value: &str) -> Result<Duration, ConfigError> {
    let ms = value
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))?;

    if !(MIN_DEBOUNCE_MS..=MAX_DEBOUNCE_MS).contains(&ms) {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            format!("must be between {MIN_DEBOUNCE_MS} and {MAX_DEBOUNCE_MS} (got {ms})"),
        ));
    }

    Ok(Duration::from_millis(ms))
}

/// Parse a positive timeout in seconds.
fn parse_timeout_secs(var_name: &str, value: &str) -> Result<Duration, ConfigError> {
    let secs = value
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))?;

    if secs == 0 {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            "must be greater than zero".to_string(),
        ));
    }

    Ok(Duration::from_secs(secs))
}

/// Parse a boolean flag (`true`/`false`/`1`/`0`/`yes`/`no`).
fn parse_bool(var_name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            format!("expected a boolean, got '{other}'"),
        )),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_base_url_adds_trailing_slash() {
        let url = parse_base_url("TEST_VAR", "http://localhost:5000").unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/");

        let url = parse_base_url("TEST_VAR", "https://shop.example.com/store").unwrap();
        assert_eq!(url.as_str(), "https://shop.example.com/store/");
        assert_eq!(
            url.join("api/cart").unwrap().as_str(),
            "https://shop.example.com/store/api/cart"
        );
    }

    #[test]
    fn test_parse_base_url_rejects_other_schemes() {
        let result = parse_base_url("TEST_VAR", "ftp://example.com");
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar(_, _))));
    }

    #[test]
    fn test_parse_base_url_rejects_garbage() {
        assert!(parse_base_url("TEST_VAR", "not a url").is_err());
    }

    #[test]
    fn test_parse_debounce_ms_in_range() {
        assert_eq!(
            parse_debounce_ms("TEST_VAR", "300").unwrap(),
            Duration::from_millis(300)
        );
        assert_eq!(
            parse_debounce_ms("TEST_VAR", " 1000 ").unwrap(),
            Duration::from_millis(1000)
        );
    }

    #[test]
    fn test_parse_debounce_ms_out_of_range() {
        assert!(parse_debounce_ms("TEST_VAR", "0").is_err());
        assert!(parse_debounce_ms("TEST_VAR", "10").is_err());
        assert!(parse_debounce_ms("TEST_VAR", "60000").is_err());
        assert!(parse_debounce_ms("TEST_VAR", "fast").is_err());
    }

    #[test]
    fn test_parse_timeout_secs_rejects_zero() {
        assert!(parse_timeout_secs("TEST_VAR", "0").is_err());
        assert_eq!(
            parse_timeout_secs("TEST_VAR", "5").unwrap(),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("TEST_VAR", "true").unwrap());
        assert!(parse_bool("TEST_VAR", "1").unwrap());
        assert!(!parse_bool("TEST_VAR", "FALSE").unwrap());
        assert!(!parse_bool("TEST_VAR", "").unwrap());
        assert!(parse_bool("TEST_VAR", "maybe").is_err());
    }

    #[test]
    fn test_default_sync_settings() {
        let settings = SyncSettings::default();
        assert_eq!(settings.debounce, Duration::from_millis(DEFAULT_DEBOUNCE_MS));
        assert!(!settings.batch_flush);
    }

    #[test]
    fn test_api_config_debug_redacts_token() {
        let mut config = ApiConfig::new("http://localhost:5000").unwrap();
        config.token = Some(SecretString::from("super-private-token"));
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-private-token"));
    }
}

//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `TABLESIDE_API_URL` - Base URL of the Tableside API (e.g., `https://api.tableside.dev`)
//!
//! ## Optional
//! - `TABLESIDE_TOKEN_FILE` - Path for persisting the session token across restarts
//! - `TABLESIDE_HTTP_TIMEOUT_SECS` - Per-request timeout (default: 30)
//! - `TABLESIDE_RETRY_ATTEMPTS` - Attempts per remote call (default: 3)
//! - `TABLESIDE_RETRY_DELAY_MS` - Delay between attempts (default: 1000)

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::retry::RetryPolicy;

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Ordering client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the Tableside API.
    pub api_url: Url,
    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
    /// Remote call attempts before giving up on transient failures.
    pub retry_attempts: u32,
    /// Fixed delay between retry attempts.
    pub retry_delay: Duration,
    /// Where to persist the session token, if anywhere.
    pub token_file: Option<PathBuf>,
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

        let api_url = get_required_env("TABLESIDE_API_URL")?
            .parse::<Url>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("TABLESIDE_API_URL".to_string(), e.to_string())
            })?;

        let http_timeout = Duration::from_secs(parse_env_or_default(
            "TABLESIDE_HTTP_TIMEOUT_SECS",
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?);
        let retry_attempts =
            parse_env_or_default("TABLESIDE_RETRY_ATTEMPTS", DEFAULT_RETRY_ATTEMPTS)?;
        let retry_delay = Duration::from_millis(parse_env_or_default(
            "TABLESIDE_RETRY_DELAY_MS",
            DEFAULT_RETRY_DELAY_MS,
        )?);
        let token_file = get_optional_env("TABLESIDE_TOKEN_FILE").map(PathBuf::from);

        Ok(Self {
            api_url,
            http_timeout,
            retry_attempts,
            retry_delay,
            token_file,
        })
    }

    /// Build a configuration with defaults for everything but the API URL.
    #[must_use]
    pub const fn new(api_url: Url) -> Self {
        Self {
            api_url,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            token_file: None,
        }
    }

    /// The retry policy described by this configuration.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, self.retry_delay)
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

/// Parse an optional environment variable, falling back to a default.
fn parse_env_or_default<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

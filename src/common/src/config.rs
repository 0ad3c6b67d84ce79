//! Configuration loading from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Default Polymarket data API endpoint.
pub const DEFAULT_DATA_API_URL: &str = "https://data-api.polymarket.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),

    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },
}

/// Application configuration loaded from environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Data API base URL (trades and activity history)
    pub data_api_url: String,

    /// Minimum gap between two upstream requests
    pub rate_limit_interval: Duration,

    /// Hard budget for a single rate-limited task
    pub task_timeout: Duration,

    /// Records requested per page
    pub page_size: u32,

    /// Upper bound on pages fetched for one wallet
    pub max_pages: u32,

    /// Retries for 429/5xx/transport failures
    pub max_retries: u32,

    /// Initial retry backoff, doubled on every attempt
    pub retry_backoff: Duration,

    /// HTTP client timeout
    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_api_url: DEFAULT_DATA_API_URL.to_string(),
            rate_limit_interval: Duration::from_millis(1200),
            task_timeout: Duration::from_secs(60),
            page_size: 500,
            max_pages: 200,
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// All variables are optional:
    /// - DATA_API_URL: data API base URL
    /// - RATE_LIMIT_INTERVAL_MS: minimum request gap (default: 1200)
    /// - TASK_TIMEOUT_SECS: per-task timeout (default: 60)
    /// - PAGE_SIZE: records per page (default: 500)
    /// - MAX_PAGES: pages per wallet before giving up (default: 200)
    /// - MAX_RETRIES: retry budget per page (default: 3)
    /// - RETRY_BACKOFF_MS: initial backoff (default: 500)
    /// - HTTP_TIMEOUT_SECS: HTTP client timeout (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present
        dotenvy::dotenv().ok();
        Self::from_env_only()
    }

    /// Load configuration from environment variables only (no .env file).
    /// Useful for testing.
    pub fn from_env_only() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let data_api_url =
            env::var("DATA_API_URL").unwrap_or_else(|_| defaults.data_api_url.clone());
        Url::parse(&data_api_url).map_err(|_| ConfigError::InvalidUrl(data_api_url.clone()))?;

        let rate_limit_interval = Duration::from_millis(parse_positive(
            "RATE_LIMIT_INTERVAL_MS",
            defaults.rate_limit_interval.as_millis() as u64,
        )?);
        let task_timeout = Duration::from_secs(parse_positive(
            "TASK_TIMEOUT_SECS",
            defaults.task_timeout.as_secs(),
        )?);
        let page_size = parse_positive("PAGE_SIZE", defaults.page_size)?;
        let max_pages = parse_positive("MAX_PAGES", defaults.max_pages)?;
        let max_retries = parse_var("MAX_RETRIES", defaults.max_retries)?;
        let retry_backoff = Duration::from_millis(parse_var(
            "RETRY_BACKOFF_MS",
            defaults.retry_backoff.as_millis() as u64,
        )?);
        let http_timeout = Duration::from_secs(parse_positive(
            "HTTP_TIMEOUT_SECS",
            defaults.http_timeout.as_secs(),
        )?);

        Ok(Self {
            // Trailing slash would produce "//trades"
            data_api_url: data_api_url.trim_end_matches('/').to_string(),
            rate_limit_interval,
            task_timeout,
            page_size,
            max_pages,
            max_retries,
            retry_backoff,
            http_timeout,
        })
    }
}

/// Read an optional variable, falling back to `default` when unset.
fn parse_var<T: FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            var: var.to_string(),
            value,
        }),
        Err(_) => Ok(default),
    }
}

/// Like `parse_var`, but zero is rejected.
fn parse_positive<T>(var: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialEq + Default + ToString,
{
    let value = parse_var(var, default)?;
    if value == T::default() {
        return Err(ConfigError::InvalidValue {
            var: var.to_string(),
            value: value.to_string(),
        });
    }
    Ok(value)
}

//! services/dashboard/src/config.rs
//!
//! Defines the gateway's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Root of the remote clinical API, e.g. `http://localhost:8000/api`.
    pub api_base_url: String,
    pub log_level: Level,
    /// Directory holding the durable ("remember me") session file.
    pub storage_dir: PathBuf,
    pub request_timeout: Duration,
    pub rate_limit_max: usize,
    pub rate_limit_window: Duration,
    pub max_retries: u32,
    pub cache_ttl: Duration,
    pub refresh_check_interval: Duration,
    /// A patient's latest record younger than this is updated instead of
    /// creating a new one during bulk prediction.
    pub recent_record_window: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Server ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let api_base_url = std::env::var("API_BASE_URL")
            .map_err(|_| ConfigError::MissingVar("API_BASE_URL".to_string()))?
            .trim_end_matches('/')
            .to_string();
        if !api_base_url.starts_with("http://") && !api_base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "API_BASE_URL".to_string(),
                format!("'{}' is not an http(s) URL", api_base_url),
            ));
        }

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let storage_dir = std::env::var("STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.session"));

        // --- HTTP client tuning ---
        let request_timeout = Duration::from_secs(parse_or("REQUEST_TIMEOUT_SECS", 15)?);
        let rate_limit_max = parse_or("RATE_LIMIT_MAX", 100)?;
        let rate_limit_window = Duration::from_secs(parse_or("RATE_LIMIT_WINDOW_SECS", 60)?);
        let max_retries = parse_or("MAX_RETRIES", 3)?;
        let cache_ttl = Duration::from_secs(parse_or("CACHE_TTL_SECS", 60)?);

        // --- Session and import ---
        let refresh_check_interval =
            Duration::from_secs(parse_or("REFRESH_CHECK_INTERVAL_SECS", 240)?);
        let recent_record_window =
            Duration::from_secs(60 * parse_or::<u64>("RECENT_RECORD_WINDOW_MINUTES", 60)?);

        if rate_limit_max == 0 {
            return Err(ConfigError::InvalidValue(
                "RATE_LIMIT_MAX".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            bind_address,
            api_base_url,
            log_level,
            storage_dir,
            request_timeout,
            rate_limit_max,
            rate_limit_window,
            max_retries,
            cache_ttl,
            refresh_check_interval,
            recent_record_window,
        })
    }

    /// Configuration with every default, pointed at `api_base_url`.
    pub fn with_base_url(api_base_url: impl Into<String>) -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 3000)),
            api_base_url: api_base_url.into(),
            log_level: Level::INFO,
            storage_dir: PathBuf::from("./.session"),
            request_timeout: Duration::from_secs(15),
            rate_limit_max: 100,
            rate_limit_window: Duration::from_secs(60),
            max_retries: 3,
            cache_ttl: Duration::from_secs(60),
            refresh_check_interval: Duration::from_secs(240),
            recent_record_window: Duration::from_secs(60 * 60),
        }
    }
}

fn parse_or<T: FromStr>(var: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(var.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

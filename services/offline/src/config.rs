//! services/offline/src/config.rs
//!
//! Defines the gateway's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;
use url::Url;

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
    pub database_url: String,
    pub log_level: Level,
    /// Base URL of the upstream story API, e.g. `https://story-api.dicoding.dev/v1`.
    pub api_base_url: Url,
    /// Origin the single-page app is served from.
    pub app_origin: Url,
    pub cors_origin: Option<String>,
    pub network_timeout: Duration,
    /// Number of placeholder stories synthesized for an offline collection request.
    pub offline_placeholder_count: usize,
    pub flush_debounce: Duration,
    pub periodic_flush: Option<Duration>,
    pub probe_interval: Option<Duration>,
    /// App-shell paths precached at install, relative to `app_origin`.
    pub precache_urls: Vec<String>,
    /// Cross-origin hosts (fonts, CDNs) served cache-first.
    pub extra_cache_first_origins: Vec<String>,
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

        // --- Server and Database Settings ---
        let bind_address = parse_var("BIND_ADDRESS", "127.0.0.1:8787")?;
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://offline.db?mode=rwc".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Upstream Origins ---
        let api_base_url = std::env::var("API_BASE_URL")
            .map_err(|_| ConfigError::MissingVar("API_BASE_URL".to_string()))
            .and_then(|raw| parse_url("API_BASE_URL", &raw))?;
        let app_origin = std::env::var("APP_ORIGIN")
            .map_err(|_| ConfigError::MissingVar("APP_ORIGIN".to_string()))
            .and_then(|raw| parse_url("APP_ORIGIN", &raw))?;
        let cors_origin = std::env::var("CORS_ORIGIN").ok();

        // --- Offline Behaviour ---
        let network_timeout = Duration::from_secs(parse_var("NETWORK_TIMEOUT_SECS", "3")?);
        let offline_placeholder_count: usize = parse_var("OFFLINE_PLACEHOLDER_COUNT", "3")?;
        let flush_debounce = Duration::from_millis(parse_var("FLUSH_DEBOUNCE_MS", "500")?);
        let periodic_flush = non_zero_secs(parse_var("PERIODIC_FLUSH_SECS", "60")?);
        let probe_interval = non_zero_secs(parse_var("PROBE_INTERVAL_SECS", "15")?);

        let precache_urls = list_var("PRECACHE_URLS").unwrap_or_else(default_precache_urls);
        let extra_cache_first_origins = list_var("EXTRA_CACHE_FIRST_ORIGINS").unwrap_or_default();

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            api_base_url,
            app_origin,
            cors_origin,
            network_timeout,
            offline_placeholder_count: offline_placeholder_count.clamp(1, 3),
            flush_debounce,
            periodic_flush,
            probe_interval,
            precache_urls,
            extra_cache_first_origins,
        })
    }

    /// A hermetic configuration backed by an in-memory database, with background
    /// probing and periodic flushing disabled.
    pub fn for_tests(api_base_url: &str, app_origin: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_url: "sqlite::memory:".to_string(),
            log_level: Level::DEBUG,
            api_base_url: parse_url("API_BASE_URL", api_base_url)?,
            app_origin: parse_url("APP_ORIGIN", app_origin)?,
            cors_origin: None,
            network_timeout: Duration::from_secs(3),
            offline_placeholder_count: 3,
            flush_debounce: Duration::from_millis(500),
            periodic_flush: None,
            probe_interval: None,
            precache_urls: Vec::new(),
            extra_cache_first_origins: Vec::new(),
        })
    }

    /// Resolves `path` under the API base, keeping the base's own path segments.
    pub fn api_endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        Url::parse(&format!(
            "{}/{}",
            self.api_base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        ))
    }
}

fn default_precache_urls() -> Vec<String> {
    [
        "/",
        "/index.html",
        "/app.bundle.js",
        "/app.css",
        "/manifest.json",
        "/favicon.png",
        "/favicon-192.png",
        "/favicon-512.png",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn parse_var<T>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}

fn parse_url(name: &str, raw: &str) -> Result<Url, ConfigError> {
    // Keep a trailing slash off the path so joins like `{base}/stories` stay predictable.
    let trimmed = raw.trim().trim_end_matches('/');
    Url::parse(trimmed).map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}

fn list_var(name: &str) -> Option<Vec<String>> {
    std::env::var(name).ok().map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

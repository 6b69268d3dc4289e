//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All optional:
//! - `APAGINA_API_URL` - Backend base URL (default: `http://localhost:3000/api`)
//! - `APAGINA_STORAGE_PATH` - Durable client storage file
//!   (default: `$HOME/.apagina/storage.json`)
//! - `APAGINA_HTTP_TIMEOUT_SECS` - Request timeout (default: 10)
//! - `APAGINA_SEARCH_DEBOUNCE_MS` - Search debounce window (default: 300)
//! - `APAGINA_CATALOG_CACHE_SECS` - Genre cache TTL (default: 300)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_API_URL: &str = "http://localhost:3000/api";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 300;
const DEFAULT_CATALOG_CACHE_SECS: u64 = 300;
const STORAGE_DIR: &str = ".apagina";
const STORAGE_FILE: &str = "storage.json";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL, without trailing slash (e.g. `http://localhost:3000/api`)
    pub api_url: String,
    /// File backing the durable client storage
    pub storage_path: PathBuf,
    /// Per-request timeout
    pub http_timeout: Duration,
    /// Quiet period before a typed search is sent
    pub search_debounce: Duration,
    /// How long the genre list is cached
    pub catalog_cache_ttl: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = match lookup("APAGINA_API_URL") {
            Some(value) => normalize_api_url("APAGINA_API_URL", &value)?,
            None => DEFAULT_API_URL.to_string(),
        };

        let storage_path = lookup("APAGINA_STORAGE_PATH").map_or_else(
            || default_storage_path(lookup("HOME")),
            PathBuf::from,
        );

        let http_timeout = Duration::from_secs(parse_u64(
            &lookup,
            "APAGINA_HTTP_TIMEOUT_SECS",
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?);
        let search_debounce = Duration::from_millis(parse_u64(
            &lookup,
            "APAGINA_SEARCH_DEBOUNCE_MS",
            DEFAULT_SEARCH_DEBOUNCE_MS,
        )?);
        let catalog_cache_ttl = Duration::from_secs(parse_u64(
            &lookup,
            "APAGINA_CATALOG_CACHE_SECS",
            DEFAULT_CATALOG_CACHE_SECS,
        )?);

        Ok(Self {
            api_url,
            storage_path,
            http_timeout,
            search_debounce,
            catalog_cache_ttl,
            sentry_dsn: lookup("SENTRY_DSN").filter(|dsn| !dsn.is_empty()),
        })
    }

    /// Configuration pointing at `api_url` with every other value defaulted.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the URL is not an absolute http(s) URL.
    pub fn with_api_url(api_url: &str) -> Result<Self, ConfigError> {
        let mut config = Self::from_lookup(|_| None)?;
        config.api_url = normalize_api_url("api_url", api_url)?;
        Ok(config)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Validate a base URL and strip its trailing slash.
fn normalize_api_url(key: &str, value: &str) -> Result<String, ConfigError> {
    let url = Url::parse(value.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }

    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn parse_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    lookup(key).map_or(Ok(default), |value| {
        value
            .trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

fn default_storage_path(home: Option<String>) -> PathBuf {
    home.map_or_else(|| PathBuf::from("."), PathBuf::from)
        .join(STORAGE_DIR)
        .join(STORAGE_FILE)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_lookup(lookup_from(&[("HOME", "/home/leitor")])).unwrap();
        assert_eq!(config.api_url, "http://localhost:3000/api");
        assert_eq!(
            config.storage_path,
            PathBuf::from("/home/leitor/.apagina/storage.json")
        );
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert_eq!(config.search_debounce, Duration::from_millis(300));
        assert!(config.sentry_dsn.is_none());
    }

    #[test]
    fn test_api_url_trailing_slash_removed() {
        let config =
            ClientConfig::from_lookup(lookup_from(&[("APAGINA_API_URL", "https://loja.example/api/")]))
                .unwrap();
        assert_eq!(config.api_url, "https://loja.example/api");
    }

    #[test]
    fn test_invalid_api_url() {
        let result = ClientConfig::from_lookup(lookup_from(&[("APAGINA_API_URL", "not a url")]));
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar(key, _)) if key == "APAGINA_API_URL"));

        let result = ClientConfig::from_lookup(lookup_from(&[("APAGINA_API_URL", "ftp://x/api")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_number() {
        let result =
            ClientConfig::from_lookup(lookup_from(&[("APAGINA_HTTP_TIMEOUT_SECS", "dez")]));
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar(_, _))));
    }

    #[test]
    fn test_empty_sentry_dsn_is_none() {
        let config = ClientConfig::from_lookup(lookup_from(&[("SENTRY_DSN", "")])).unwrap();
        assert!(config.sentry_dsn.is_none());
    }

    #[test]
    fn test_with_api_url() {
        let config = ClientConfig::with_api_url("http://127.0.0.1:4000/api").unwrap();
        assert_eq!(config.api_url, "http://127.0.0.1:4000/api");
    }
}

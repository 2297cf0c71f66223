//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All variables are optional:
//! - `CORNERMARKET_API_URL` - Marketplace backend base URL (default: `http://127.0.0.1:8000`)
//! - `CORNERMARKET_STATE_DIR` - Directory for persisted client state (default: `.cornermarket`)
//! - `CORNERMARKET_REQUEST_TIMEOUT_SECS` - Per-request timeout (default: none)
//! - `CORNERMARKET_CATALOG_CACHE_TTL_SECS` - Catalog cache lifetime (default: 300)
//! - `CORNERMARKET_DRAFT_DEBOUNCE_MS` - Quiet period before a checkout draft is written (default: 500)
//! - `CORNERMARKET_DRAFT_PROMPT_SECS` - How long the draft recovery prompt stays up (default: 5)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_STATE_DIR: &str = ".cornermarket";
const DEFAULT_CATALOG_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_DRAFT_DEBOUNCE_MS: u64 = 500;
const DEFAULT_DRAFT_PROMPT_SECS: u64 = 5;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL without trailing slash
    pub api_url: String,
    /// Directory holding persisted tokens, theme and checkout draft
    pub state_dir: PathBuf,
    /// Optional per-request timeout; `None` leaves requests unbounded
    pub request_timeout: Option<Duration>,
    /// Lifetime of cached catalog reads
    pub catalog_cache_ttl: Duration,
    /// Checkout draft write settings
    pub draft: DraftConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Checkout draft persistence settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DraftConfig {
    /// Quiet period before a scheduled draft is written
    pub debounce: Duration,
    /// How long the recovery prompt stays visible without hover
    pub prompt_duration: Duration,
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DRAFT_DEBOUNCE_MS),
            prompt_duration: Duration::from_secs(DEFAULT_DRAFT_PROMPT_SECS),
        }
    }
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

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = normalize_api_url(
            "CORNERMARKET_API_URL",
            &lookup("CORNERMARKET_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        )?;
        let state_dir = PathBuf::from(
            lookup("CORNERMARKET_STATE_DIR").unwrap_or_else(|| DEFAULT_STATE_DIR.to_string()),
        );
        let request_timeout = parse_optional_u64(&lookup, "CORNERMARKET_REQUEST_TIMEOUT_SECS")?
            .map(Duration::from_secs);
        let catalog_cache_ttl = Duration::from_secs(
            parse_optional_u64(&lookup, "CORNERMARKET_CATALOG_CACHE_TTL_SECS")?
                .unwrap_or(DEFAULT_CATALOG_CACHE_TTL_SECS),
        );
        let draft = DraftConfig {
            debounce: Duration::from_millis(
                parse_optional_u64(&lookup, "CORNERMARKET_DRAFT_DEBOUNCE_MS")?
                    .unwrap_or(DEFAULT_DRAFT_DEBOUNCE_MS),
            ),
            prompt_duration: Duration::from_secs(
                parse_optional_u64(&lookup, "CORNERMARKET_DRAFT_PROMPT_SECS")?
                    .unwrap_or(DEFAULT_DRAFT_PROMPT_SECS),
            ),
        };

        Ok(Self {
            api_url,
            state_dir,
            request_timeout,
            catalog_cache_ttl,
            draft,
            sentry_dsn: lookup("SENTRY_DSN").filter(|v| !v.is_empty()),
            sentry_environment: lookup("SENTRY_ENVIRONMENT").filter(|v| !v.is_empty()),
        })
    }

    /// Configuration pointing at `api_url` with every other setting at its default.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `api_url` is not an http(s) URL.
    pub fn for_api_url(api_url: &str) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| (key == "CORNERMARKET_API_URL").then(|| api_url.to_string()))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Validate an http(s) base URL and strip trailing slashes.
fn normalize_api_url(var_name: &str, raw: &str) -> Result<String, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            "URL must have a host".to_string(),
        ));
    }
    Ok(raw.trim().trim_end_matches('/').to_string())
}

/// Parse an optional unsigned integer variable.
fn parse_optional_u64<F>(lookup: &F, key: &str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .map(|v| {
            v.trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
        .transpose()
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
        let config = ClientConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.api_url, "http://127.0.0.1:8000");
        assert_eq!(config.state_dir, PathBuf::from(".cornermarket"));
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.catalog_cache_ttl, Duration::from_secs(300));
        assert_eq!(config.draft, DraftConfig::default());
        assert_eq!(config.draft.prompt_duration, Duration::from_secs(5));
        assert!(config.sentry_dsn.is_none());
    }

    #[test]
    fn test_api_url_trailing_slashes_trimmed() {
        let config = ClientConfig::from_lookup(lookup_from(&[(
            "CORNERMARKET_API_URL",
            "https://market.example.com///",
        )]))
        .unwrap();
        assert_eq!(config.api_url, "https://market.example.com");
    }

    #[test]
    fn test_api_url_rejects_other_schemes() {
        let result = ClientConfig::from_lookup(lookup_from(&[(
            "CORNERMARKET_API_URL",
            "ftp://market.example.com",
        )]));
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar(_, _))));

        let result = ClientConfig::from_lookup(lookup_from(&[("CORNERMARKET_API_URL", "nope")]));
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar(_, _))));
    }

    #[test]
    fn test_numeric_overrides() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("CORNERMARKET_REQUEST_TIMEOUT_SECS", "30"),
            ("CORNERMARKET_CATALOG_CACHE_TTL_SECS", "5"),
            ("CORNERMARKET_DRAFT_DEBOUNCE_MS", "50"),
            ("CORNERMARKET_DRAFT_PROMPT_SECS", "3"),
        ]))
        .unwrap();
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.catalog_cache_ttl, Duration::from_secs(5));
        assert_eq!(config.draft.debounce, Duration::from_millis(50));
        assert_eq!(config.draft.prompt_duration, Duration::from_secs(3));
    }

    #[test]
    fn test_invalid_number() {
        let result = ClientConfig::from_lookup(lookup_from(&[(
            "CORNERMARKET_DRAFT_DEBOUNCE_MS",
            "soon",
        )]));
        let err = result.unwrap_err();
        assert!(err.to_string().contains("CORNERMARKET_DRAFT_DEBOUNCE_MS"));
    }

    #[test]
    fn test_empty_sentry_dsn_is_none() {
        let config =
            ClientConfig::from_lookup(lookup_from(&[("SENTRY_DSN", ""), ("SENTRY_ENVIRONMENT", "dev")]))
                .unwrap();
        assert!(config.sentry_dsn.is_none());
        assert_eq!(config.sentry_environment.as_deref(), Some("dev"));
    }

    #[test]
    fn test_for_api_url() {
        let config = ClientConfig::for_api_url("http://127.0.0.1:9000/").unwrap();
        assert_eq!(config.api_url, "http://127.0.0.1:9000");
    }
}

//! Gift card subsystem configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `GIFTCARDS_DATABASE_URL` - `PostgreSQL` connection string
//!   (falls back to generic `DATABASE_URL`)
//!
//! ## Optional
//! - `GIFTCARDS_STATS_CACHE_TTL_SECS` - How long admin stats may be served
//!   from cache (default: 30)

use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

/// Default stats cache TTL in seconds.
const DEFAULT_STATS_CACHE_TTL_SECS: u64 = 30;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Gift card subsystem configuration.
#[derive(Debug, Clone)]
pub struct GiftCardsConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// How long an admin stats snapshot may be served from cache.
    pub stats_cache_ttl: Duration,
}

impl GiftCardsConfig {
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

        let database_url = get_database_url("GIFTCARDS_DATABASE_URL")?;
        let stats_cache_ttl = parse_ttl_secs(
            "GIFTCARDS_STATS_CACHE_TTL_SECS",
            get_optional_env("GIFTCARDS_STATS_CACHE_TTL_SECS"),
        )?;

        Ok(Self {
            database_url,
            stats_cache_ttl,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    // Try primary key first (e.g., GIFTCARDS_DATABASE_URL)
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    // Fallback to generic DATABASE_URL (set by Fly.io postgres attach)
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Parse an optional seconds value, falling back to the default TTL.
fn parse_ttl_secs(key: &str, value: Option<String>) -> Result<Duration, ConfigError> {
    match value {
        None => Ok(Duration::from_secs(DEFAULT_STATS_CACHE_TTL_SECS)),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
    }
}

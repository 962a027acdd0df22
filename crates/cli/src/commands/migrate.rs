//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! sd-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `GIFTCARDS_DATABASE_URL` - `PostgreSQL` connection string
//!   (falls back to `DATABASE_URL`)

use stagedoor_giftcards::config::{ConfigError, GiftCardsConfig};
use stagedoor_giftcards::store::create_pool;
use thiserror::Error;

/// Errors that can occur while migrating.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Apply all pending gift card migrations.
///
/// # Errors
///
/// Returns [`MigrationError`] when configuration is missing or the
/// database rejects a migration.
pub async fn run() -> Result<(), MigrationError> {
    let config = GiftCardsConfig::from_env()?;

    tracing::info!("Connecting to gift card database...");
    let pool = create_pool(&config.database_url).await?;

    tracing::info!("Running gift card migrations...");
    sqlx::migrate!("../giftcards/migrations").run(&pool).await?;

    tracing::info!("Gift card migrations complete!");
    Ok(())
}

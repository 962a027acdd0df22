//! Aggregate gift card statistics.
//!
//! # Usage
//!
//! ```bash
//! sd-cli stats
//! ```

use std::sync::Arc;

use stagedoor_giftcards::audit::TracingAuditSink;
use stagedoor_giftcards::config::{ConfigError, GiftCardsConfig};
use stagedoor_giftcards::store::{PgGiftCardStore, create_pool};
use stagedoor_giftcards::{GiftCardError, GiftCardService};
use thiserror::Error;

/// Errors that can occur while computing statistics.
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    GiftCard(#[from] GiftCardError),
}

/// Print the aggregate counters the admin dashboard shows.
///
/// # Errors
///
/// Returns [`StatsError`] on configuration or database failure.
pub async fn run() -> Result<(), StatsError> {
    let config = GiftCardsConfig::from_env()?;
    let pool = create_pool(&config.database_url).await?;
    let service = GiftCardService::new(
        Arc::new(PgGiftCardStore::new(pool)),
        Arc::new(TracingAuditSink),
    );

    let stats = service.stats().await?;

    #[allow(clippy::print_stdout)]
    {
        println!("Gift card statistics");
        println!("  Total cards:     {}", stats.total_count);
        println!("  Active:          {}", stats.active_count);
        println!("  Partially used:  {}", stats.partially_used_count);
        println!("  Redeemed:        {}", stats.redeemed_count);
        println!("  Expired:         {}", stats.expired_count);
        println!("  Total value:     {}", stats.total_value);
        println!("  Active balance:  {}", stats.active_balance);
    }

    Ok(())
}

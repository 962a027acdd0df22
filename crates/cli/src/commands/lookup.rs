//! Look up a gift card by code.
//!
//! # Usage
//!
//! ```bash
//! sd-cli lookup ABCD-1234-EFGH-5678
//! ```
//!
//! Lookups are case-insensitive and refresh the expiration status before
//! printing, exactly like the production read path.

use std::sync::Arc;

use stagedoor_giftcards::audit::TracingAuditSink;
use stagedoor_giftcards::config::{ConfigError, GiftCardsConfig};
use stagedoor_giftcards::store::{PgGiftCardStore, create_pool};
use stagedoor_giftcards::{GiftCardError, GiftCardService};
use thiserror::Error;

/// Errors that can occur while looking up a card.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    GiftCard(#[from] GiftCardError),
}

/// Print the current state of one card, including its ledger.
///
/// # Errors
///
/// Returns [`LookupError`]; an unknown or malformed code surfaces as
/// [`GiftCardError::NotFound`].
pub async fn run(code: &str) -> Result<(), LookupError> {
    let config = GiftCardsConfig::from_env()?;
    let pool = create_pool(&config.database_url).await?;
    let service = GiftCardService::new(
        Arc::new(PgGiftCardStore::new(pool)),
        Arc::new(TracingAuditSink),
    );

    let card = service.lookup_by_code(code).await?;

    #[allow(clippy::print_stdout)]
    {
        println!("Gift card {}", card.code);
        println!("  Status:    {}", card.status);
        println!(
            "  Balance:   {} / {} {}",
            card.balance,
            card.amount,
            card.currency.code()
        );
        println!(
            "  Purchaser: {} <{}>",
            card.purchaser.name, card.purchaser.email
        );
        println!(
            "  Recipient: {} <{}>",
            card.recipient.name, card.recipient.email
        );
        println!("  Purchased: {}", card.purchased_at.format("%Y-%m-%d"));
        println!("  Expires:   {}", card.expires_at.format("%Y-%m-%d"));
        if let Some(redeemed_at) = card.redeemed_at {
            println!("  Redeemed:  {}", redeemed_at.format("%Y-%m-%d"));
        }
        if card.usage_history.is_empty() {
            println!("  No redemptions yet");
        } else {
            println!("  Usage history:");
            for entry in &card.usage_history {
                let order = entry.order_id.as_deref().unwrap_or("-");
                println!(
                    "    {}  -{}  order: {}  {}",
                    entry.date.format("%Y-%m-%d %H:%M"),
                    entry.amount,
                    order,
                    entry.description
                );
            }
        }
    }

    Ok(())
}

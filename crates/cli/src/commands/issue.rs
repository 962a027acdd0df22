//! Issue a gift card from the command line.
//!
//! # Usage
//!
//! ```bash
//! sd-cli issue --amount 300 \
//!     --purchaser-id member-8f2a41 \
//!     --purchaser-email dana@example.com --purchaser-name "Dana Levi" \
//!     --recipient-email noa@example.com --recipient-name "Noa Mizrahi" \
//!     --message "Happy birthday!"
//!
//! # Self-purchase: recipient defaults to the purchaser
//! sd-cli issue --amount 300 --for-self \
//!     --purchaser-id member-8f2a41 \
//!     --purchaser-email dana@example.com --purchaser-name "Dana Levi"
//! ```

use std::sync::Arc;

use stagedoor_core::{Currency, EmailAddress, EmailError, Money, MoneyError};
use stagedoor_giftcards::audit::TracingAuditSink;
use stagedoor_giftcards::config::{ConfigError, GiftCardsConfig};
use stagedoor_giftcards::model::{Purchaser, Recipient};
use stagedoor_giftcards::store::{PgGiftCardStore, create_pool};
use stagedoor_giftcards::{CreateGiftCard, GiftCardError, GiftCardService};
use thiserror::Error;

/// Errors that can occur while issuing a card.
#[derive(Debug, Error)]
pub enum IssueError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] MoneyError),

    #[error("Invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    #[error("Unsupported currency: {0}")]
    InvalidCurrency(String),

    #[error("Recipient email and name are required unless --for-self is set")]
    MissingRecipient,

    #[error(transparent)]
    GiftCard(#[from] GiftCardError),
}

/// Parsed `sd-cli issue` arguments.
pub struct IssueArgs {
    pub amount: i64,
    pub purchaser_id: String,
    pub purchaser_email: String,
    pub purchaser_name: String,
    pub recipient_email: Option<String>,
    pub recipient_name: Option<String>,
    pub recipient_phone: Option<String>,
    pub for_self: bool,
    pub message: Option<String>,
    pub currency: String,
}

/// Issue a new gift card and print its code.
///
/// # Errors
///
/// Returns [`IssueError`] on bad arguments, configuration problems, or a
/// rejected creation.
pub async fn run(args: IssueArgs) -> Result<(), IssueError> {
    let amount = Money::new(args.amount)?;
    let currency: Currency = args
        .currency
        .parse()
        .map_err(IssueError::InvalidCurrency)?;

    let purchaser = Purchaser {
        id: args.purchaser_id.into(),
        email: EmailAddress::parse(&args.purchaser_email)?,
        name: args.purchaser_name,
    };

    let recipient = if args.for_self {
        Recipient {
            email: purchaser.email.clone(),
            name: purchaser.name.clone(),
            phone: args.recipient_phone,
        }
    } else {
        let (Some(email), Some(name)) = (args.recipient_email, args.recipient_name) else {
            return Err(IssueError::MissingRecipient);
        };
        Recipient {
            email: EmailAddress::parse(&email)?,
            name,
            phone: args.recipient_phone,
        }
    };

    let request = CreateGiftCard {
        amount,
        currency,
        purchaser,
        recipient,
        is_for_self: args.for_self,
        message: args.message,
    };

    let config = GiftCardsConfig::from_env()?;
    tracing::info!("Connecting to gift card database...");
    let pool = create_pool(&config.database_url).await?;
    let service = GiftCardService::new(
        Arc::new(PgGiftCardStore::new(pool)),
        Arc::new(TracingAuditSink),
    );

    let card = service.create(request).await?;

    #[allow(clippy::print_stdout)]
    {
        println!("Gift card issued!");
        println!("  Code:      {}", card.code);
        println!("  Amount:    {} {}", card.amount, card.currency.code());
        println!("  Status:    {}", card.status);
        println!(
            "  Recipient: {} <{}>",
            card.recipient.name, card.recipient.email
        );
        println!("  Expires:   {}", card.expires_at.format("%Y-%m-%d"));
    }

    Ok(())
}

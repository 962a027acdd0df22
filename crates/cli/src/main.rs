//! Stagedoor CLI - database migrations and gift card management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run gift card database migrations
//! sd-cli migrate
//!
//! # Issue a gift card
//! sd-cli issue --amount 300 \
//!     --purchaser-id member-8f2a41 \
//!     --purchaser-email dana@example.com --purchaser-name "Dana Levi" \
//!     --recipient-email noa@example.com --recipient-name "Noa Mizrahi"
//!
//! # Look up a card
//! sd-cli lookup ABCD-1234-EFGH-5678
//!
//! # Aggregate statistics
//! sd-cli stats
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `issue` - Issue a new gift card
//! - `lookup` - Look up a gift card by code
//! - `stats` - Show aggregate gift card statistics

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "sd-cli")]
#[command(author, version, about = "Stagedoor CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run gift card database migrations
    Migrate,
    /// Issue a new gift card
    Issue {
        /// Face value in whole currency units (100-5000)
        #[arg(short, long)]
        amount: i64,

        /// Purchaser principal ID from the auth layer
        #[arg(long)]
        purchaser_id: String,

        /// Purchaser email address
        #[arg(long)]
        purchaser_email: String,

        /// Purchaser display name
        #[arg(long)]
        purchaser_name: String,

        /// Recipient email address (defaults to the purchaser with --for-self)
        #[arg(long)]
        recipient_email: Option<String>,

        /// Recipient display name
        #[arg(long)]
        recipient_name: Option<String>,

        /// Recipient phone number
        #[arg(long)]
        recipient_phone: Option<String>,

        /// Issue the card to the purchaser themselves
        #[arg(long)]
        for_self: bool,

        /// Gift message (at most 500 characters)
        #[arg(short, long)]
        message: Option<String>,

        /// Currency code
        #[arg(long, default_value = "ILS")]
        currency: String,
    },
    /// Look up a gift card by code
    Lookup {
        /// Card code, case-insensitive
        code: String,
    },
    /// Show aggregate gift card statistics
    Stats,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Issue {
            amount,
            purchaser_id,
            purchaser_email,
            purchaser_name,
            recipient_email,
            recipient_name,
            recipient_phone,
            for_self,
            message,
            currency,
        } => {
            commands::issue::run(commands::issue::IssueArgs {
                amount,
                purchaser_id,
                purchaser_email,
                purchaser_name,
                recipient_email,
                recipient_name,
                recipient_phone,
                for_self,
                message,
                currency,
            })
            .await?;
        }
        Commands::Lookup { code } => commands::lookup::run(&code).await?,
        Commands::Stats => commands::stats::run().await?,
    }
    Ok(())
}

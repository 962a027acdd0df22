//! The gift card aggregate and its pure state transitions.
//!
//! Everything here is synchronous and side-effect free. A spend is computed
//! as a [`RedemptionUpdate`] first and persisted separately, so the store
//! can apply it under an optimistic version check and the arithmetic stays
//! trivially testable.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use stagedoor_core::{
    CardCode, Currency, EmailAddress, GiftCardId, GiftCardStatus, Money, UserId,
};

use crate::error::GiftCardError;

/// Smallest face value a card can be issued at, in whole currency units.
pub const MIN_AMOUNT: i64 = 100;

/// Largest face value a card can be issued at, in whole currency units.
pub const MAX_AMOUNT: i64 = 5000;

/// Maximum length of the optional gift message, in characters.
pub const MESSAGE_MAX_LENGTH: usize = 500;

/// Cards are valid for five years from purchase.
pub const VALIDITY_MONTHS: u32 = 60;

/// Ledger description used when the caller does not supply one.
pub const DEFAULT_USAGE_DESCRIPTION: &str = "Gift card redemption";

/// The buying principal. Captured at purchase and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchaser {
    /// Principal ID from the auth layer. Opaque to this crate.
    pub id: UserId,
    pub email: EmailAddress,
    pub name: String,
}

/// Who the card is for. Matches the purchaser's identity on self-purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: EmailAddress,
    pub name: String,
    pub phone: Option<String>,
}

/// One spend applied to a card. Ledger entries are append-only and kept in
/// the order they were committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEntry {
    /// When the spend was applied.
    pub date: DateTime<Utc>,
    /// Amount deducted from the balance.
    pub amount: Money,
    /// Order the spend paid toward, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    /// Human-readable line for receipts and statements.
    pub description: String,
}

/// Parameters for issuing a new card.
#[derive(Debug, Clone)]
pub struct CreateGiftCard {
    /// Face value. Must be within [`MIN_AMOUNT`]..=[`MAX_AMOUNT`].
    pub amount: Money,
    pub currency: Currency,
    pub purchaser: Purchaser,
    pub recipient: Recipient,
    /// When true, the recipient identity is forced to the purchaser's.
    pub is_for_self: bool,
    /// Optional gift message, at most [`MESSAGE_MAX_LENGTH`] characters.
    pub message: Option<String>,
}

/// A computed spend, ready to persist.
///
/// The scalar fields replace the card's current values and `entry` is
/// appended to the ledger, all in one guarded store write.
#[derive(Debug, Clone)]
pub struct RedemptionUpdate {
    pub balance: Money,
    pub status: GiftCardStatus,
    /// Set when this spend drives the balance to zero.
    pub redeemed_at: Option<DateTime<Utc>>,
    pub entry: UsageEntry,
}

/// A gift card: prepaid value identified by a unique code.
///
/// # Invariants
///
/// - `0 <= balance <= amount`
/// - the ledger accounts for every unit spent:
///   `sum(usage_history) == amount - balance`
/// - `status == Redeemed` exactly when `balance == 0`, and redeemed is
///   terminal
/// - `expires_at` is fixed at purchase; a card past it never spends again
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GiftCard {
    pub id: GiftCardId,
    pub code: CardCode,
    /// Original face value. Immutable.
    pub amount: Money,
    /// Remaining spendable value.
    pub balance: Money,
    pub currency: Currency,
    pub status: GiftCardStatus,
    pub purchaser: Purchaser,
    pub recipient: Recipient,
    /// Gift message shown to the recipient.
    pub message: Option<String>,
    pub purchased_at: DateTime<Utc>,
    /// `purchased_at` plus five years. Immutable.
    pub expires_at: DateTime<Utc>,
    /// Set once, when the balance first reaches zero.
    pub redeemed_at: Option<DateTime<Utc>>,
    /// Append-only spend ledger, oldest first.
    pub usage_history: Vec<UsageEntry>,
    /// Optimistic concurrency token. Bumped on every persisted write.
    pub version: i64,
}

impl GiftCard {
    /// Issue a new card from a creation request.
    ///
    /// The caller supplies the (already generated) code and the purchase
    /// instant; uniqueness of the code is the store's problem.
    ///
    /// # Errors
    ///
    /// [`GiftCardError::InvalidAmount`] when the face value is out of
    /// bounds, [`GiftCardError::MessageTooLong`] when the gift message is
    /// over the limit.
    pub fn issue(
        request: CreateGiftCard,
        code: CardCode,
        now: DateTime<Utc>,
    ) -> Result<Self, GiftCardError> {
        let units = request.amount.units();
        if units < MIN_AMOUNT || units > MAX_AMOUNT {
            return Err(GiftCardError::InvalidAmount {
                amount: units,
                min: MIN_AMOUNT,
                max: MAX_AMOUNT,
            });
        }

        if let Some(message) = &request.message {
            let length = message.chars().count();
            if length > MESSAGE_MAX_LENGTH {
                return Err(GiftCardError::MessageTooLong {
                    length,
                    max: MESSAGE_MAX_LENGTH,
                });
            }
        }

        // Self-purchases keep the card attached to the buyer regardless of
        // what recipient fields were submitted alongside.
        let recipient = if request.is_for_self {
            Recipient {
                email: request.purchaser.email.clone(),
                name: request.purchaser.name.clone(),
                phone: request.recipient.phone,
            }
        } else {
            request.recipient
        };

        let expires_at = now
            .checked_add_months(Months::new(VALIDITY_MONTHS))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Ok(Self {
            id: GiftCardId::generate(),
            code,
            amount: request.amount,
            balance: request.amount,
            currency: request.currency,
            status: GiftCardStatus::Active,
            purchaser: request.purchaser,
            recipient,
            message: request.message,
            purchased_at: now,
            expires_at,
            redeemed_at: None,
            usage_history: Vec::new(),
            version: 1,
        })
    }

    /// `true` once the clock has passed the expiration date.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Lazy expiration refresh: flip a spendable card to `expired` once its
    /// date has passed. Returns `true` when the status changed, in which
    /// case the caller persists the flip.
    pub fn refresh_expiration(&mut self, now: DateTime<Utc>) -> bool {
        if self.status.is_spendable() && self.is_expired_at(now) {
            self.status = GiftCardStatus::Expired;
            true
        } else {
            false
        }
    }

    /// Check that a spend is currently allowed.
    ///
    /// A past expiration date always reports [`GiftCardError::Expired`],
    /// whatever the stored status says; a fully redeemed card reports
    /// [`GiftCardError::NotActive`].
    ///
    /// # Errors
    ///
    /// [`GiftCardError::NotActive`] or [`GiftCardError::Expired`].
    pub fn ensure_spendable(&self, now: DateTime<Utc>) -> Result<(), GiftCardError> {
        if self.status == GiftCardStatus::Redeemed {
            return Err(GiftCardError::NotActive {
                status: self.status,
            });
        }
        if self.is_expired_at(now) {
            return Err(GiftCardError::Expired {
                expired_at: self.expires_at,
            });
        }
        if self.status.is_terminal() {
            // Marked expired even though the date has not passed. Terminal
            // states never come back.
            return Err(GiftCardError::NotActive {
                status: self.status,
            });
        }
        Ok(())
    }

    /// Compute a spend against the current state.
    ///
    /// Pure: nothing is mutated. The returned update is handed to the store
    /// together with this card's `version`.
    ///
    /// # Errors
    ///
    /// The full redemption taxonomy: [`GiftCardError::NotActive`],
    /// [`GiftCardError::Expired`], [`GiftCardError::ZeroSpend`], and
    /// [`GiftCardError::InsufficientBalance`].
    pub fn spend(
        &self,
        amount: Money,
        now: DateTime<Utc>,
        order_id: Option<String>,
        description: Option<String>,
    ) -> Result<RedemptionUpdate, GiftCardError> {
        self.ensure_spendable(now)?;

        if amount.is_zero() {
            return Err(GiftCardError::ZeroSpend);
        }

        let Some(balance) = self.balance.checked_sub(amount) else {
            return Err(GiftCardError::InsufficientBalance {
                requested: amount,
                balance: self.balance,
            });
        };

        let redeemed = balance.is_zero();
        let description = description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_USAGE_DESCRIPTION.to_owned());

        Ok(RedemptionUpdate {
            balance,
            status: if redeemed {
                GiftCardStatus::Redeemed
            } else {
                GiftCardStatus::PartiallyUsed
            },
            redeemed_at: redeemed.then_some(now),
            entry: UsageEntry {
                date: now,
                amount,
                order_id,
                description,
            },
        })
    }

    /// Apply a computed update, returning the card as the store persisted
    /// it (version bumped, entry appended).
    #[must_use]
    pub fn with_redemption(&self, update: &RedemptionUpdate) -> Self {
        let mut card = self.clone();
        card.balance = update.balance;
        card.status = update.status;
        if let Some(at) = update.redeemed_at {
            card.redeemed_at = Some(at);
        }
        card.usage_history.push(update.entry.clone());
        card.version += 1;
        card
    }

    /// Sum of all ledger amounts. Always equals `amount - balance`.
    #[must_use]
    pub fn ledger_total(&self) -> i64 {
        self.usage_history
            .iter()
            .map(|entry| entry.amount.units())
            .sum()
    }
}

//! Gift card error types.

use chrono::{DateTime, Utc};
use stagedoor_core::{GiftCardStatus, Money};
use thiserror::Error;

use crate::store::StoreError;

/// Errors returned by gift card operations.
///
/// Everything except [`GiftCardError::Store`] is an expected business
/// condition: the caller renders a message and the process keeps serving.
/// Store failures are infrastructure faults and propagate as such.
#[derive(Debug, Error)]
pub enum GiftCardError {
    /// Creation amount outside the allowed face-value bounds.
    #[error("gift card amount {amount} is out of range ({min}-{max})")]
    InvalidAmount { amount: i64, min: i64, max: i64 },

    /// Gift message over the maximum length.
    #[error("gift message is {length} characters (maximum {max})")]
    MessageTooLong { length: usize, max: usize },

    /// The code or ID does not resolve to any card.
    #[error("gift card not found")]
    NotFound,

    /// The card is fully redeemed or marked expired.
    #[error("gift card is not active (status: {status})")]
    NotActive { status: GiftCardStatus },

    /// The expiration date has passed.
    #[error("gift card expired on {expired_at}")]
    Expired { expired_at: DateTime<Utc> },

    /// Requested spend exceeds the remaining balance.
    #[error("insufficient balance: requested {requested}, remaining {balance}")]
    InsufficientBalance { requested: Money, balance: Money },

    /// Zero-amount spends are rejected rather than recorded as no-op
    /// ledger entries.
    #[error("redemption amount must be greater than zero")]
    ZeroSpend,

    /// The card changed between read and write. The spend may still be
    /// valid against the new state; the caller decides whether to retry.
    #[error("gift card was modified concurrently, retry the redemption")]
    ConcurrentModification,

    /// Persistence failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl GiftCardError {
    /// Stable machine-readable code for API responses and logs.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount { .. } => "INVALID_AMOUNT",
            Self::MessageTooLong { .. } => "MESSAGE_TOO_LONG",
            Self::NotFound => "NOT_FOUND",
            Self::NotActive { .. } => "NOT_ACTIVE",
            Self::Expired { .. } => "EXPIRED",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::ZeroSpend => "ZERO_SPEND",
            Self::ConcurrentModification => "CONCURRENT_MODIFICATION",
            Self::Store(_) => "STORE_ERROR",
        }
    }

    /// `true` for expected business conditions the caller renders to the
    /// user, `false` for infrastructure faults worth paging over.
    #[must_use]
    pub const fn is_business_error(&self) -> bool {
        !matches!(self, Self::Store(_))
    }
}

//! Gift-card lifecycle status.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a gift card.
///
/// `active -> partially_used -> redeemed`, with `active` and `partially_used`
/// able to lapse to `expired` once the expiration date passes. `redeemed`
/// and `expired` are terminal. The stored status is a cached derivation;
/// the expiration date comparison is the ground truth, refreshed lazily on
/// read by the giftcards crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GiftCardStatus {
    /// Full face value remaining.
    Active,
    /// Some value spent, some remaining.
    PartiallyUsed,
    /// Balance reached zero. Terminal.
    Redeemed,
    /// Expiration date passed with value remaining. Terminal.
    Expired,
}

impl GiftCardStatus {
    /// The wire/database representation (`snake_case`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PartiallyUsed => "partially_used",
            Self::Redeemed => "redeemed",
            Self::Expired => "expired",
        }
    }

    /// Terminal statuses accept no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Redeemed | Self::Expired)
    }

    /// A spendable card can accept a redemption, subject to the date check.
    #[must_use]
    pub const fn is_spendable(self) -> bool {
        matches!(self, Self::Active | Self::PartiallyUsed)
    }
}

impl std::fmt::Display for GiftCardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for GiftCardStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "partially_used" => Ok(Self::PartiallyUsed),
            "redeemed" => Ok(Self::Redeemed),
            "expired" => Ok(Self::Expired),
            _ => Err(format!("invalid gift card status: {s}")),
        }
    }
}

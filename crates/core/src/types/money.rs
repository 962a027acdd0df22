//! Monetary amount type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Money`] value.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// The amount is negative.
    #[error("amount cannot be negative (got {amount})")]
    Negative {
        /// The rejected amount.
        amount: i64,
    },
    /// The input is not a whole number.
    #[error("amount must be a whole number of currency units: {0}")]
    NotAnInteger(String),
}

/// A monetary amount in whole currency units.
///
/// Gift-card values are whole units of the card's currency (250 means
/// 250 ILS); no fractional amounts exist anywhere in the subsystem, so the
/// representation is a plain integer rather than a decimal. The wrapped
/// value is guaranteed non-negative, and arithmetic is checked so a balance
/// never silently underflows or overflows.
///
/// ## Examples
///
/// ```
/// use stagedoor_core::Money;
///
/// let balance = Money::new(500).unwrap();
/// let spend = Money::new(200).unwrap();
///
/// assert_eq!(balance.checked_sub(spend), Money::new(300).ok());
/// assert_eq!(spend.checked_sub(balance), None); // would go negative
/// assert!(Money::new(-1).is_err());
/// ```
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero currency units.
    pub const ZERO: Self = Self(0);

    /// Parse a `Money` value from whole currency units.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Negative`] if `units` is negative.
    pub const fn new(units: i64) -> Result<Self, MoneyError> {
        if units < 0 {
            return Err(MoneyError::Negative { amount: units });
        }
        Ok(Self(units))
    }

    /// Returns the amount in whole currency units.
    #[must_use]
    pub const fn units(self) -> i64 {
        self.0
    }

    /// Returns `true` if the amount is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checked addition. Returns `None` on `i64` overflow.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Checked subtraction. Returns `None` if the result would be negative.
    #[must_use]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).and_then(|v| Self::new(v).ok())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let units = s
            .trim()
            .parse::<i64>()
            .map_err(|_| MoneyError::NotAnInteger(s.to_owned()))?;
        Self::new(units)
    }
}

impl From<Money> for i64 {
    fn from(money: Money) -> Self {
        money.0
    }
}

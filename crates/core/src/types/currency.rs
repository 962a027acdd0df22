//! Currency codes.

use serde::{Deserialize, Serialize};

/// ISO 4217 currency of a gift-card amount.
///
/// Fixed at card creation. The platform sells in Israeli new shekels, so
/// [`Currency::Ils`] is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Ils,
    Usd,
    Eur,
}

impl Currency {
    /// ISO 4217 code, e.g. `"ILS"`.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Ils => "ILS",
            Self::Usd => "USD",
            Self::Eur => "EUR",
        }
    }

    /// Display symbol, e.g. `"₪"`.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Ils => "₪",
            Self::Usd => "$",
            Self::Eur => "€",
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ILS" => Ok(Self::Ils),
            "USD" => Ok(Self::Usd),
            "EUR" => Ok(Self::Eur),
            _ => Err(format!("unsupported currency: {s}")),
        }
    }
}

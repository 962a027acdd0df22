//! Gift-card code type.

use core::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`CardCode`].
#[derive(thiserror::Error, Debug, Clone)]
pub enum CardCodeError {
    /// The input string is empty.
    #[error("card code cannot be empty")]
    Empty,
    /// The input is not four hyphen-separated groups of four characters.
    #[error("card code must be 4 groups of 4 characters separated by hyphens")]
    WrongShape,
    /// The input contains a character outside A-Z and 0-9.
    #[error("card code contains an invalid character: {character:?}")]
    InvalidCharacter {
        /// The offending character (after uppercasing).
        character: char,
    },
}

/// A gift-card code in `XXXX-XXXX-XXXX-XXXX` format.
///
/// Codes are uppercase alphanumeric, four hyphen-separated groups of four,
/// and unique per card. Parsing is case-insensitive and trims surrounding
/// whitespace; the stored form is always uppercase, so a code read from a
/// confirmation email, typed by hand, or scanned from a voucher all resolve
/// to the same card.
///
/// ## Examples
///
/// ```
/// use stagedoor_core::CardCode;
///
/// let code = CardCode::parse("ab12-cd34-ef56-gh78").unwrap();
/// assert_eq!(code.as_str(), "AB12-CD34-EF56-GH78");
/// assert_eq!(code.masked(), "****-****-****-GH78");
///
/// assert!(CardCode::parse("AB12CD34EF56GH78").is_err()); // missing hyphens
/// assert!(CardCode::parse("AB12-CD34-EF56").is_err());   // too few groups
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct CardCode(String);

impl CardCode {
    /// Number of hyphen-separated groups.
    pub const GROUP_COUNT: usize = 4;

    /// Characters per group.
    pub const GROUP_LENGTH: usize = 4;

    /// Characters codes are generated from. 36^16 possible codes.
    pub const ALPHABET: &'static [u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    /// Parse a `CardCode` from a string, normalizing to uppercase.
    ///
    /// # Errors
    ///
    /// Returns an error if the input (after trimming) is empty, is not four
    /// hyphen-separated groups of four characters, or contains a character
    /// outside A-Z / 0-9.
    pub fn parse(s: &str) -> Result<Self, CardCodeError> {
        let trimmed = s.trim();

        if trimmed.is_empty() {
            return Err(CardCodeError::Empty);
        }

        let normalized = trimmed.to_ascii_uppercase();

        let mut groups = 0;
        for group in normalized.split('-') {
            groups += 1;
            if group.len() != Self::GROUP_LENGTH {
                return Err(CardCodeError::WrongShape);
            }
            for character in group.chars() {
                if !character.is_ascii_uppercase() && !character.is_ascii_digit() {
                    return Err(CardCodeError::InvalidCharacter { character });
                }
            }
        }

        if groups != Self::GROUP_COUNT {
            return Err(CardCodeError::WrongShape);
        }

        Ok(Self(normalized))
    }

    /// Generate a random code from the given RNG.
    ///
    /// Uniqueness is NOT guaranteed here; the store enforces a uniqueness
    /// constraint, and callers regenerate on a conflict.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut code = String::with_capacity(Self::GROUP_COUNT * (Self::GROUP_LENGTH + 1) - 1);
        for group in 0..Self::GROUP_COUNT {
            if group > 0 {
                code.push('-');
            }
            for _ in 0..Self::GROUP_LENGTH {
                let index = rng.random_range(0..Self::ALPHABET.len());
                let byte = Self::ALPHABET.get(index).copied().unwrap_or(b'0');
                code.push(char::from(byte));
            }
        }
        Self(code)
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `CardCode` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// The last group of the code, for receipts and support lookups.
    #[must_use]
    pub fn last_four(&self) -> &str {
        self.0.rsplit('-').next().unwrap_or(&self.0)
    }

    /// Masked form safe for log lines and audit summaries:
    /// `****-****-****-XXXX`. Full codes are bearer credentials and must
    /// not appear in logs.
    #[must_use]
    pub fn masked(&self) -> String {
        format!("****-****-****-{}", self.last_four())
    }
}

impl fmt::Display for CardCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CardCode {
    type Err = CardCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for CardCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_code() {
        let code = CardCode::parse("AB12-CD34-EF56-GH78").unwrap();
        assert_eq!(code.as_str(), "AB12-CD34-EF56-GH78");
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let lower = CardCode::parse("ab12-cd34-ef56-gh78").unwrap();
        let upper = CardCode::parse("AB12-CD34-EF56-GH78").unwrap();
        assert_eq!(lower, upper);
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let code = CardCode::parse("  AB12-CD34-EF56-GH78 ").unwrap();
        assert_eq!(code.as_str(), "AB12-CD34-EF56-GH78");
    }

    #[test]
    fn test_parse_empty() {
        assert!(matches!(CardCode::parse(""), Err(CardCodeError::Empty)));
        assert!(matches!(CardCode::parse("  "), Err(CardCodeError::Empty)));
    }

    #[test]
    fn test_parse_wrong_shape() {
        assert!(matches!(
            CardCode::parse("AB12CD34EF56GH78"),
            Err(CardCodeError::WrongShape)
        ));
        assert!(matches!(
            CardCode::parse("AB12-CD34-EF56"),
            Err(CardCodeError::WrongShape)
        ));
        assert!(matches!(
            CardCode::parse("AB12-CD34-EF56-GH78-IJ90"),
            Err(CardCodeError::WrongShape)
        ));
        assert!(matches!(
            CardCode::parse("AB1-CD34-EF56-GH78"),
            Err(CardCodeError::WrongShape)
        ));
    }

    #[test]
    fn test_parse_invalid_character() {
        assert!(matches!(
            CardCode::parse("AB1!-CD34-EF56-GH78"),
            Err(CardCodeError::InvalidCharacter { character: '!' })
        ));
    }

    #[test]
    fn test_generate_is_well_formed() {
        let mut rng = rand::rng();
        for _ in 0..100 {
            let code = CardCode::generate(&mut rng);
            let reparsed = CardCode::parse(code.as_str()).unwrap();
            assert_eq!(code, reparsed);
        }
    }

    #[test]
    fn test_generate_produces_distinct_codes() {
        let mut rng = rand::rng();
        let a = CardCode::generate(&mut rng);
        let b = CardCode::generate(&mut rng);
        // 36^16 keyspace; a collision here means the RNG is broken
        assert_ne!(a, b);
    }

    #[test]
    fn test_last_four_and_masked() {
        let code = CardCode::parse("AB12-CD34-EF56-GH78").unwrap();
        assert_eq!(code.last_four(), "GH78");
        assert_eq!(code.masked(), "****-****-****-GH78");
        assert!(!code.masked().contains("AB12"));
    }

    #[test]
    fn test_display() {
        let code = CardCode::parse("AB12-CD34-EF56-GH78").unwrap();
        assert_eq!(format!("{code}"), "AB12-CD34-EF56-GH78");
    }

    #[test]
    fn test_serde_roundtrip() {
        let code = CardCode::parse("AB12-CD34-EF56-GH78").unwrap();
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, "\"AB12-CD34-EF56-GH78\"");

        let parsed: CardCode = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, code);
    }
}

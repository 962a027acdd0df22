//! Core types for Stagedoor.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod code;
pub mod currency;
pub mod email;
pub mod id;
pub mod money;
pub mod status;

pub use code::{CardCode, CardCodeError};
pub use currency::Currency;
pub use email::{EmailAddress, EmailError};
pub use id::{GiftCardId, UserId};
pub use money::{Money, MoneyError};
pub use status::GiftCardStatus;

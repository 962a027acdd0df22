//! Stagedoor gift cards - value tracking and redemption.
//!
//! A gift card is a prepaid monetary instrument identified by a unique
//! `XXXX-XXXX-XXXX-XXXX` code. This crate owns the card's full lifecycle:
//! issuing, balance tracking, partial and full redemption with an
//! append-only usage ledger, five-year expiration (refreshed lazily on
//! read), owner and recipient listings, and admin statistics.
//!
//! # Architecture
//!
//! - [`model`] - the card aggregate and its pure state transitions
//! - [`service`] - the operation boundary the rest of the platform calls
//! - [`store`] - persistence behind [`store::GiftCardStore`]
//!   (`PostgreSQL` and in-memory)
//! - [`audit`] - audit records for every mutation
//! - [`clock`] - injectable time source, so tests never sleep
//! - [`config`] - environment configuration
//!
//! Concurrent redemptions against the same card are serialized by an
//! optimistic version check rather than row locks; see
//! [`store::GiftCardStore::apply_redemption`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod audit;
pub mod clock;
pub mod config;
pub mod error;
pub mod model;
pub mod service;
pub mod store;

pub use error::GiftCardError;
pub use model::{CreateGiftCard, GiftCard, Purchaser, Recipient, UsageEntry};
pub use service::{CardValidation, DeclineReason, GiftCardService, RedeemGiftCard};
pub use store::{GiftCardStats, GiftCardStore, ListFilter, Page, StoreError};

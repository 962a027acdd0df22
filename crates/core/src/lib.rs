//! Stagedoor Core - Shared types library.
//!
//! This crate provides common types used across all Stagedoor components:
//! - `giftcards` - Gift-card value tracking and redemption
//! - `cli` - Command-line tools for migrations and management
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access, no HTTP
//! clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe codes, amounts, emails, IDs, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;

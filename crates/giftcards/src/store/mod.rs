//! Persistence for gift cards.
//!
//! # Backends
//!
//! - [`postgres::PgGiftCardStore`] - production store, one row per card
//! - [`memory::MemoryGiftCardStore`] - in-memory store with identical
//!   semantics, for tests and local tooling
//!
//! Both implement [`GiftCardStore`]. Mutations are guarded by an optimistic
//! version check: the write names the version the caller read, and the
//! store applies it only if the row still carries that version. A `false`
//! return from a guarded write means the card changed underneath the
//! caller, who re-reads and decides what to do.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stagedoor_core::{CardCode, EmailAddress, GiftCardId, GiftCardStatus, Money, UserId};
use thiserror::Error;

use crate::model::{GiftCard, RedemptionUpdate};

pub use memory::MemoryGiftCardStore;
pub use postgres::{PgGiftCardStore, create_pool};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the store is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested record was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation, e.g. a duplicate card code.
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Filters and paging for the admin listing.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Keep only cards with this stored status.
    pub status: Option<GiftCardStatus>,
    /// Keep only cards where this email is purchaser or recipient.
    pub email: Option<EmailAddress>,
    /// 1-based page number; 0 is treated as 1.
    pub page: u32,
    /// Page size; 0 becomes the default, larger values are clamped.
    pub limit: u32,
}

impl ListFilter {
    /// Page size used when the caller does not specify one.
    pub const DEFAULT_LIMIT: u32 = 20;
    /// Largest page size a caller can request.
    pub const MAX_LIMIT: u32 = 100;

    /// Effective `(page, limit)` after clamping.
    #[must_use]
    pub fn normalized(&self) -> (u32, u32) {
        let page = self.page.max(1);
        let limit = match self.limit {
            0 => Self::DEFAULT_LIMIT,
            requested => requested.min(Self::MAX_LIMIT),
        };
        (page, limit)
    }

    /// Row offset for the effective page.
    #[must_use]
    pub fn offset(&self) -> i64 {
        let (page, limit) = self.normalized();
        i64::from(page - 1) * i64::from(limit)
    }
}

/// One page of results plus the unpaged total.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total matching rows across all pages.
    pub total: u64,
    /// 1-based page number actually served.
    pub page: u32,
    /// Page size actually served.
    pub limit: u32,
}

impl<T> Page<T> {
    /// Number of pages at this page size.
    #[must_use]
    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(u64::from(self.limit.max(1)))
    }
}

/// Aggregate counters for the admin dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GiftCardStats {
    pub total_count: i64,
    pub active_count: i64,
    pub partially_used_count: i64,
    pub redeemed_count: i64,
    pub expired_count: i64,
    /// Sum of original face values across all cards.
    pub total_value: Money,
    /// Sum of remaining balances on spendable cards whose date has not
    /// passed. Applies its own `expires_at > now` filter, since stored
    /// statuses may lag the clock until the next read refreshes them.
    pub active_balance: Money,
}

/// Persistence operations for gift cards.
///
/// The guarded writes (`mark_expired`, `apply_redemption`) take the version
/// the caller read and report whether the write landed.
#[async_trait]
pub trait GiftCardStore: Send + Sync {
    /// Insert a newly issued card.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when the code already exists.
    async fn insert(&self, card: &GiftCard) -> Result<(), StoreError>;

    /// Fetch by code. Codes are stored normalized, so the caller parses
    /// user input through `CardCode` first.
    async fn find_by_code(&self, code: &CardCode) -> Result<Option<GiftCard>, StoreError>;

    async fn find_by_id(&self, id: GiftCardId) -> Result<Option<GiftCard>, StoreError>;

    /// Flip a spendable card to `expired`. Returns `false` when the card
    /// moved past `expected_version` or is no longer spendable.
    async fn mark_expired(&self, id: GiftCardId, expected_version: i64)
    -> Result<bool, StoreError>;

    /// Apply a computed redemption: balance, status, `redeemed_at`, and the
    /// ledger append land in one guarded write. Returns `false` on a lost
    /// version race; nothing is changed in that case.
    async fn apply_redemption(
        &self,
        id: GiftCardId,
        expected_version: i64,
        update: &RedemptionUpdate,
    ) -> Result<bool, StoreError>;

    /// Cards where `email` is purchaser or recipient, newest first.
    async fn list_by_email(&self, email: &EmailAddress) -> Result<Vec<GiftCard>, StoreError>;

    /// Cards bought by this principal, newest first.
    async fn list_purchased_by(&self, purchaser: &UserId) -> Result<Vec<GiftCard>, StoreError>;

    /// Cards addressed to this email, newest first.
    async fn list_received_by(&self, email: &EmailAddress) -> Result<Vec<GiftCard>, StoreError>;

    /// Admin listing with optional filters, offset-paginated, newest first.
    async fn list_page(&self, filter: &ListFilter) -> Result<Page<GiftCard>, StoreError>;

    /// Aggregate counters. `now` drives the independent expiration filter
    /// on `active_balance`.
    async fn stats(&self, now: DateTime<Utc>) -> Result<GiftCardStats, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_defaults_to_first_page_of_twenty() {
        let filter = ListFilter::default();
        assert_eq!(filter.normalized(), (1, 20));
        assert_eq!(filter.offset(), 0);
    }

    #[test]
    fn filter_clamps_oversized_limits() {
        let filter = ListFilter {
            limit: 10_000,
            ..ListFilter::default()
        };
        assert_eq!(filter.normalized(), (1, 100));
    }

    #[test]
    fn filter_treats_page_zero_as_one() {
        let filter = ListFilter {
            page: 0,
            limit: 10,
            ..ListFilter::default()
        };
        assert_eq!(filter.normalized(), (1, 10));
        assert_eq!(filter.offset(), 0);
    }

    #[test]
    fn filter_offset_skips_earlier_pages() {
        let filter = ListFilter {
            page: 3,
            limit: 25,
            ..ListFilter::default()
        };
        assert_eq!(filter.offset(), 50);
    }

    #[test]
    fn page_count_rounds_up() {
        let page = Page::<()> {
            items: Vec::new(),
            total: 41,
            page: 1,
            limit: 20,
        };
        assert_eq!(page.total_pages(), 3);
    }
}

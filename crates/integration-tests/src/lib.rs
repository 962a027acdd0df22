//! Integration tests for Stagedoor gift cards.
//!
//! # Running Tests
//!
//! ```bash
//! # In-memory suites (no database needed)
//! cargo test -p stagedoor-integration-tests
//!
//! # PostgreSQL store suite (needs a running database)
//! GIFTCARDS_TEST_DATABASE_URL=postgres://localhost/stagedoor_test \
//!     cargo test -p stagedoor-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `lifecycle` - create/lookup/redeem/validate flows
//! - `concurrency` - conflicting redemptions under the version guard
//! - `expiration` - lazy refresh and expiration dominance
//! - `listing` - owner/recipient listings, pagination, statistics
//! - `postgres_store` - the store contract against real `PostgreSQL`

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use stagedoor_core::{CardCode, Currency, EmailAddress, GiftCardId, Money, UserId};
use stagedoor_giftcards::audit::{AuditActor, AuditSink, MemoryAuditSink};
use stagedoor_giftcards::clock::{Clock, ManualClock};
use stagedoor_giftcards::model::{Purchaser, Recipient, RedemptionUpdate};
use stagedoor_giftcards::store::MemoryGiftCardStore;
use stagedoor_giftcards::{
    CreateGiftCard, GiftCard, GiftCardService, GiftCardStats, GiftCardStore, ListFilter, Page,
    RedeemGiftCard, StoreError,
};

/// The frozen instant every harness starts at.
#[must_use]
pub fn start_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
        .single()
        .expect("fixed timestamp is valid")
}

/// A service over the in-memory store, a recording audit sink, and a
/// hand-driven clock. Everything a gift card test needs.
pub struct TestHarness {
    pub service: GiftCardService,
    pub store: Arc<MemoryGiftCardStore>,
    pub audit: Arc<MemoryAuditSink>,
    pub clock: Arc<ManualClock>,
}

impl TestHarness {
    /// Harness frozen at [`start_instant`].
    #[must_use]
    pub fn new() -> Self {
        let store = Arc::new(MemoryGiftCardStore::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let clock = Arc::new(ManualClock::new(start_instant()));
        let service = GiftCardService::with_clock(
            Arc::clone(&store) as Arc<dyn GiftCardStore>,
            Arc::clone(&audit) as Arc<dyn AuditSink>,
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        Self {
            service,
            store,
            audit,
            clock,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Standard purchaser for tests: Dana.
#[must_use]
pub fn dana() -> Purchaser {
    Purchaser {
        id: UserId::from("member-8f2a41"),
        email: EmailAddress::parse("dana@example.com").expect("fixed email is valid"),
        name: "Dana Levi".to_owned(),
    }
}

/// Standard recipient for tests: Noa.
#[must_use]
pub fn noa() -> Recipient {
    Recipient {
        email: EmailAddress::parse("noa@example.com").expect("fixed email is valid"),
        name: "Noa Mizrahi".to_owned(),
        phone: Some("+972-50-1234567".to_owned()),
    }
}

/// Creation request: Dana buys a card for Noa.
#[must_use]
pub fn gift_request(amount: i64) -> CreateGiftCard {
    CreateGiftCard {
        amount: Money::new(amount).expect("non-negative test amount"),
        currency: Currency::Ils,
        purchaser: dana(),
        recipient: noa(),
        is_for_self: false,
        message: Some("Enjoy the show".to_owned()),
    }
}

/// Creation request: Dana buys a card for herself.
#[must_use]
pub fn self_request(amount: i64) -> CreateGiftCard {
    CreateGiftCard {
        is_for_self: true,
        message: None,
        ..gift_request(amount)
    }
}

/// Redemption request under Dana's identity.
#[must_use]
pub fn redeem_request(code: &str, amount: i64) -> RedeemGiftCard {
    RedeemGiftCard {
        code: code.to_owned(),
        amount: Money::new(amount).expect("non-negative test amount"),
        order_id: None,
        description: None,
        actor: AuditActor::user(dana().id, dana().email),
    }
}

/// Store wrapper that injects one competing redemption right before the
/// first guarded write it sees, forcing the caller onto the lost-version
/// path deterministically.
pub struct RacingStore {
    inner: MemoryGiftCardStore,
    competing_amount: Money,
    race_at: DateTime<Utc>,
    raced: AtomicBool,
}

impl RacingStore {
    #[must_use]
    pub fn new(competing_amount: Money, race_at: DateTime<Utc>) -> Self {
        Self {
            inner: MemoryGiftCardStore::new(),
            competing_amount,
            race_at,
            raced: AtomicBool::new(false),
        }
    }

    /// Whether the competing write has fired yet.
    #[must_use]
    pub fn raced(&self) -> bool {
        self.raced.load(Ordering::SeqCst)
    }

    async fn inject_competing_write(&self, id: GiftCardId) -> Result<(), StoreError> {
        let Some(card) = self.inner.find_by_id(id).await? else {
            return Ok(());
        };
        let update = card
            .spend(self.competing_amount, self.race_at, None, None)
            .expect("competing spend is valid against the seeded card");
        let applied = self
            .inner
            .apply_redemption(card.id, card.version, &update)
            .await?;
        assert!(applied, "competing write must land first");
        Ok(())
    }
}

#[async_trait]
impl GiftCardStore for RacingStore {
    async fn insert(&self, card: &GiftCard) -> Result<(), StoreError> {
        self.inner.insert(card).await
    }

    async fn find_by_code(&self, code: &CardCode) -> Result<Option<GiftCard>, StoreError> {
        self.inner.find_by_code(code).await
    }

    async fn find_by_id(&self, id: GiftCardId) -> Result<Option<GiftCard>, StoreError> {
        self.inner.find_by_id(id).await
    }

    async fn mark_expired(
        &self,
        id: GiftCardId,
        expected_version: i64,
    ) -> Result<bool, StoreError> {
        self.inner.mark_expired(id, expected_version).await
    }

    async fn apply_redemption(
        &self,
        id: GiftCardId,
        expected_version: i64,
        update: &RedemptionUpdate,
    ) -> Result<bool, StoreError> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            self.inject_competing_write(id).await?;
        }
        self.inner
            .apply_redemption(id, expected_version, update)
            .await
    }

    async fn list_by_email(&self, email: &EmailAddress) -> Result<Vec<GiftCard>, StoreError> {
        self.inner.list_by_email(email).await
    }

    async fn list_purchased_by(&self, purchaser: &UserId) -> Result<Vec<GiftCard>, StoreError> {
        self.inner.list_purchased_by(purchaser).await
    }

    async fn list_received_by(&self, email: &EmailAddress) -> Result<Vec<GiftCard>, StoreError> {
        self.inner.list_received_by(email).await
    }

    async fn list_page(&self, filter: &ListFilter) -> Result<Page<GiftCard>, StoreError> {
        self.inner.list_page(filter).await
    }

    async fn stats(&self, now: DateTime<Utc>) -> Result<GiftCardStats, StoreError> {
        self.inner.stats(now).await
    }
}

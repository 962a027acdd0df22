//! Gift card operations: create, lookup, redeem, validate, list, stats.
//!
//! This is the boundary the rest of the platform calls. A handler resolves
//! its principal, calls one method here, and renders the typed result.
//! Invariant enforcement lives in [`crate::model`]; persistence sits behind
//! [`GiftCardStore`]; every mutation leaves an audit record.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use stagedoor_core::{CardCode, EmailAddress, GiftCardId, Money, UserId};
use tracing::instrument;

use crate::audit::{AuditAction, AuditActor, AuditRecord, AuditSink};
use crate::clock::{Clock, SystemClock};
use crate::error::GiftCardError;
use crate::model::{CreateGiftCard, GiftCard};
use crate::store::{GiftCardStats, GiftCardStore, ListFilter, Page, StoreError};

/// How many fresh codes to try when the store reports a collision.
const MAX_CODE_ATTEMPTS: u32 = 5;

/// Default TTL for the cached admin stats snapshot.
pub const DEFAULT_STATS_CACHE_TTL: Duration = Duration::from_secs(30);

/// A redemption request against a card code.
#[derive(Debug, Clone)]
pub struct RedeemGiftCard {
    /// Code as entered by the user; normalized during lookup.
    pub code: String,
    /// Amount to deduct. Must be positive.
    pub amount: Money,
    /// Order this spend pays toward, when known.
    pub order_id: Option<String>,
    /// Ledger line; a generic default is used when blank.
    pub description: Option<String>,
    /// Who is redeeming, for the audit trail.
    pub actor: AuditActor,
}

/// Outcome of a read-only pre-checkout validation.
///
/// Business declines are data, not errors: checkout renders `reason` next
/// to the entered code and carries on.
#[derive(Debug, Clone)]
pub struct CardValidation {
    pub valid: bool,
    /// Present whenever the code resolved, usable or not.
    pub card: Option<GiftCard>,
    /// Why the card cannot be used, when `valid` is false.
    pub reason: Option<DeclineReason>,
}

/// Why a card failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclineReason {
    NotFound,
    NotActive,
    Expired,
    ZeroBalance,
}

impl DeclineReason {
    /// Stable machine-readable code for API responses.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::NotActive => "NOT_ACTIVE",
            Self::Expired => "EXPIRED",
            Self::ZeroBalance => "ZERO_BALANCE",
        }
    }
}

/// Gift card operations over an injected store, audit sink, and clock.
pub struct GiftCardService {
    store: Arc<dyn GiftCardStore>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    stats_cache: Cache<(), GiftCardStats>,
}

impl GiftCardService {
    /// Create a service with the system clock and default stats TTL.
    #[must_use]
    pub fn new(store: Arc<dyn GiftCardStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self::with_clock(store, audit, Arc::new(SystemClock))
    }

    /// Create a service with an explicit clock. Tests drive expiration
    /// through this.
    #[must_use]
    pub fn with_clock(
        store: Arc<dyn GiftCardStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_stats_cache_ttl(store, audit, clock, DEFAULT_STATS_CACHE_TTL)
    }

    /// Fully explicit constructor.
    #[must_use]
    pub fn with_stats_cache_ttl(
        store: Arc<dyn GiftCardStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        stats_cache_ttl: Duration,
    ) -> Self {
        Self {
            store,
            audit,
            clock,
            stats_cache: Cache::builder()
                .max_capacity(1)
                .time_to_live(stats_cache_ttl)
                .build(),
        }
    }

    /// Issue a new card.
    ///
    /// Generates a code, retries on the (rare) uniqueness collision, and
    /// audits the purchase under the purchaser's identity.
    ///
    /// # Errors
    ///
    /// [`GiftCardError::InvalidAmount`], [`GiftCardError::MessageTooLong`],
    /// or a store failure. Exhausting all code attempts surfaces the last
    /// conflict as a store error.
    #[instrument(skip(self, request), fields(amount = %request.amount, for_self = request.is_for_self))]
    pub async fn create(&self, request: CreateGiftCard) -> Result<GiftCard, GiftCardError> {
        let now = self.clock.now();
        let actor = AuditActor::user(
            request.purchaser.id.clone(),
            request.purchaser.email.clone(),
        );

        let mut attempts = 0;
        let card = loop {
            attempts += 1;
            let code = CardCode::generate(&mut rand::rng());
            let card = GiftCard::issue(request.clone(), code, now)?;
            match self.store.insert(&card).await {
                Ok(()) => break card,
                Err(StoreError::Conflict(reason)) if attempts < MAX_CODE_ATTEMPTS => {
                    tracing::warn!(attempts, %reason, "code collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        };

        self.stats_cache.invalidate(&()).await;
        self.record_audit(AuditRecord::new(
            actor,
            AuditAction::Created,
            card.id,
            format!(
                "issued gift card {} for {} {}",
                card.code.masked(),
                card.amount,
                card.currency.code()
            ),
            now,
        ))
        .await;

        tracing::info!(card_id = %card.id, code = %card.code.masked(), "gift card issued");
        Ok(card)
    }

    /// Look up a card by its code (case-insensitive).
    ///
    /// Reads perform the lazy expiration refresh: a spendable card whose
    /// date has passed comes back `expired`, and the flip is persisted.
    ///
    /// # Errors
    ///
    /// [`GiftCardError::NotFound`] when the code is malformed or unknown.
    #[instrument(skip(self, code))]
    pub async fn lookup_by_code(&self, code: &str) -> Result<GiftCard, GiftCardError> {
        // A malformed code cannot name a card.
        let Ok(code) = CardCode::parse(code) else {
            return Err(GiftCardError::NotFound);
        };
        let card = self
            .store
            .find_by_code(&code)
            .await?
            .ok_or(GiftCardError::NotFound)?;
        self.refreshed(card).await
    }

    /// Look up a card by its internal ID.
    ///
    /// # Errors
    ///
    /// [`GiftCardError::NotFound`] when no card has this ID.
    #[instrument(skip(self), fields(card_id = %id))]
    pub async fn lookup_by_id(&self, id: GiftCardId) -> Result<GiftCard, GiftCardError> {
        let card = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(GiftCardError::NotFound)?;
        self.refreshed(card).await
    }

    /// Spend against a card. See [`GiftCardError`] for the failure
    /// taxonomy.
    ///
    /// The write is guarded by the version read at the start. Of two
    /// simultaneous conflicting redemptions exactly one lands; the other
    /// re-reads once and reports either the precise business error the
    /// fresh state implies or [`GiftCardError::ConcurrentModification`],
    /// leaving the retry decision to the caller.
    #[instrument(skip(self, request), fields(amount = %request.amount))]
    pub async fn redeem(&self, request: RedeemGiftCard) -> Result<GiftCard, GiftCardError> {
        let card = self.lookup_by_code(&request.code).await?;
        let now = self.clock.now();

        let update = card.spend(
            request.amount,
            now,
            request.order_id.clone(),
            request.description.clone(),
        )?;

        if self
            .store
            .apply_redemption(card.id, card.version, &update)
            .await?
        {
            let updated = card.with_redemption(&update);
            self.stats_cache.invalidate(&()).await;
            self.record_audit(AuditRecord::new(
                request.actor,
                AuditAction::Redeemed,
                updated.id,
                format!(
                    "redeemed {} {} from gift card {}, {} remaining",
                    request.amount,
                    updated.currency.code(),
                    updated.code.masked(),
                    updated.balance
                ),
                now,
            ))
            .await;

            tracing::info!(
                card_id = %updated.id,
                balance = %updated.balance,
                status = %updated.status,
                "redemption applied"
            );
            return Ok(updated);
        }

        // Lost the version race. Re-read once to report the precise
        // condition; a still-valid spend is the caller's retry to make.
        let fresh = self
            .store
            .find_by_id(card.id)
            .await?
            .ok_or(GiftCardError::NotFound)?;
        fresh.spend(request.amount, now, None, None)?;
        Err(GiftCardError::ConcurrentModification)
    }

    /// Read-only pre-checkout validation.
    ///
    /// Business declines come back in the result, not as errors; `Err` is
    /// reserved for infrastructure failures.
    ///
    /// # Errors
    ///
    /// [`GiftCardError::Store`] only.
    #[instrument(skip(self, code))]
    pub async fn validate(&self, code: &str) -> Result<CardValidation, GiftCardError> {
        let card = match self.lookup_by_code(code).await {
            Ok(card) => card,
            Err(GiftCardError::NotFound) => {
                return Ok(CardValidation {
                    valid: false,
                    card: None,
                    reason: Some(DeclineReason::NotFound),
                });
            }
            Err(e) => return Err(e),
        };

        let reason = Self::decline_reason(&card, self.clock.now());
        Ok(CardValidation {
            valid: reason.is_none(),
            card: Some(card),
            reason,
        })
    }

    fn decline_reason(card: &GiftCard, now: DateTime<Utc>) -> Option<DeclineReason> {
        if let Err(e) = card.ensure_spendable(now) {
            return Some(match e {
                GiftCardError::Expired { .. } => DeclineReason::Expired,
                _ => DeclineReason::NotActive,
            });
        }
        if card.balance.is_zero() {
            // A spendable card with nothing left should not exist, but a
            // zero balance is unusable either way.
            return Some(DeclineReason::ZeroBalance);
        }
        None
    }

    /// Cards where `email` appears as purchaser or recipient, newest first.
    ///
    /// # Errors
    ///
    /// Store failures only; an unknown email is an empty list.
    #[instrument(skip(self), fields(email = %email))]
    pub async fn list_by_email(
        &self,
        email: &EmailAddress,
    ) -> Result<Vec<GiftCard>, GiftCardError> {
        let cards = self.store.list_by_email(email).await?;
        self.refreshed_all(cards).await
    }

    /// Cards this principal bought, newest first.
    ///
    /// # Errors
    ///
    /// Store failures only.
    #[instrument(skip(self), fields(purchaser = %purchaser))]
    pub async fn list_purchased_by(
        &self,
        purchaser: &UserId,
    ) -> Result<Vec<GiftCard>, GiftCardError> {
        let cards = self.store.list_purchased_by(purchaser).await?;
        self.refreshed_all(cards).await
    }

    /// Cards addressed to this email, newest first.
    ///
    /// # Errors
    ///
    /// Store failures only.
    #[instrument(skip(self), fields(email = %email))]
    pub async fn list_received_by(
        &self,
        email: &EmailAddress,
    ) -> Result<Vec<GiftCard>, GiftCardError> {
        let cards = self.store.list_received_by(email).await?;
        self.refreshed_all(cards).await
    }

    /// Admin listing with optional filters, offset-paginated.
    ///
    /// # Errors
    ///
    /// Store failures only.
    #[instrument(skip(self, filter))]
    pub async fn list_all(&self, filter: ListFilter) -> Result<Page<GiftCard>, GiftCardError> {
        let page = self.store.list_page(&filter).await?;
        let items = self.refreshed_all(page.items).await?;
        Ok(Page {
            items,
            total: page.total,
            page: page.page,
            limit: page.limit,
        })
    }

    /// Aggregate dashboard counters, served from a short-TTL cache.
    ///
    /// Mutations through this service invalidate the cache; writes from
    /// other processes may be reflected up to one TTL late.
    ///
    /// # Errors
    ///
    /// Store failures only.
    #[instrument(skip(self))]
    pub async fn stats(&self) -> Result<GiftCardStats, GiftCardError> {
        if let Some(stats) = self.stats_cache.get(&()).await {
            return Ok(stats);
        }
        let stats = self.store.stats(self.clock.now()).await?;
        self.stats_cache.insert((), stats).await;
        Ok(stats)
    }

    /// Apply the lazy expiration refresh to a card read from the store,
    /// persisting the flip when it wins the version race.
    async fn refreshed(&self, mut card: GiftCard) -> Result<GiftCard, GiftCardError> {
        let now = self.clock.now();
        if !card.refresh_expiration(now) {
            return Ok(card);
        }

        if self.store.mark_expired(card.id, card.version).await? {
            card.version += 1;
            self.stats_cache.invalidate(&()).await;
            self.record_audit(AuditRecord::new(
                AuditActor::system(),
                AuditAction::Expired,
                card.id,
                format!(
                    "gift card {} expired with {} {} unspent",
                    card.code.masked(),
                    card.balance,
                    card.currency.code()
                ),
                now,
            ))
            .await;
            return Ok(card);
        }

        // Lost the refresh race; whatever won holds the truth now.
        tracing::debug!(card_id = %card.id, "expiration refresh lost a write race");
        let mut fresh = self
            .store
            .find_by_id(card.id)
            .await?
            .ok_or(GiftCardError::NotFound)?;
        fresh.refresh_expiration(now);
        Ok(fresh)
    }

    async fn refreshed_all(&self, cards: Vec<GiftCard>) -> Result<Vec<GiftCard>, GiftCardError> {
        let mut refreshed = Vec::with_capacity(cards.len());
        for card in cards {
            refreshed.push(self.refreshed(card).await?);
        }
        Ok(refreshed)
    }

    async fn record_audit(&self, record: AuditRecord) {
        if let Err(e) = self.audit.record(record).await {
            tracing::error!(error = %e, "failed to record audit entry");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use stagedoor_core::{Currency, GiftCardStatus};

    use super::*;
    use crate::audit::{AuditError, MemoryAuditSink};
    use crate::clock::ManualClock;
    use crate::model::{DEFAULT_USAGE_DESCRIPTION, Purchaser, Recipient, RedemptionUpdate};
    use crate::store::MemoryGiftCardStore;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn request(amount: i64, is_for_self: bool) -> CreateGiftCard {
        CreateGiftCard {
            amount: Money::new(amount).unwrap(),
            currency: Currency::Ils,
            purchaser: Purchaser {
                id: UserId::from("member-1"),
                email: EmailAddress::parse("dana@example.com").unwrap(),
                name: "Dana Levi".to_owned(),
            },
            recipient: Recipient {
                email: EmailAddress::parse("noa@example.com").unwrap(),
                name: "Noa Mizrahi".to_owned(),
                phone: None,
            },
            is_for_self,
            message: Some("Enjoy the show".to_owned()),
        }
    }

    fn redeem_request(code: &str, amount: i64) -> RedeemGiftCard {
        RedeemGiftCard {
            code: code.to_owned(),
            amount: Money::new(amount).unwrap(),
            order_id: Some("order-17".to_owned()),
            description: None,
            actor: AuditActor::user(
                UserId::from("member-1"),
                EmailAddress::parse("dana@example.com").unwrap(),
            ),
        }
    }

    struct Harness {
        service: GiftCardService,
        audit: Arc<MemoryAuditSink>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let audit = Arc::new(MemoryAuditSink::new());
        let clock = Arc::new(ManualClock::new(start()));
        let service = GiftCardService::with_clock(
            Arc::new(MemoryGiftCardStore::new()),
            Arc::clone(&audit) as Arc<dyn AuditSink>,
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        Harness {
            service,
            audit,
            clock,
        }
    }

    #[tokio::test]
    async fn create_then_lookup_roundtrip() {
        let h = harness();
        let card = h.service.create(request(300, false)).await.unwrap();

        let found = h.service.lookup_by_code(card.code.as_str()).await.unwrap();
        assert_eq!(found.id, card.id);
        assert_eq!(found.balance.units(), 300);

        // lookup is case-insensitive over raw input
        let lowered = card.code.as_str().to_lowercase();
        let found = h.service.lookup_by_code(&lowered).await.unwrap();
        assert_eq!(found.id, card.id);

        let by_id = h.service.lookup_by_id(card.id).await.unwrap();
        assert_eq!(by_id.code, card.code);
    }

    #[tokio::test]
    async fn create_audits_under_the_purchaser() {
        let h = harness();
        let card = h.service.create(request(300, false)).await.unwrap();

        let records = h.audit.records().await;
        assert_eq!(records.len(), 1);
        let record = records.first().unwrap();
        assert_eq!(record.action, AuditAction::Created);
        assert_eq!(record.entity_id, card.id);
        assert_eq!(record.actor.to_string(), "dana@example.com");
        // the full code never reaches the audit trail
        assert!(!record.summary.contains(card.code.as_str()));
        assert!(record.summary.contains(&card.code.masked()));
    }

    #[tokio::test]
    async fn create_rejects_bad_amounts_without_touching_the_store() {
        let h = harness();
        let err = h.service.create(request(99, false)).await.unwrap_err();
        assert!(matches!(err, GiftCardError::InvalidAmount { .. }));
        assert!(h.audit.records().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_code_is_not_found() {
        let h = harness();
        let err = h.service.lookup_by_code("not a code").await.unwrap_err();
        assert!(matches!(err, GiftCardError::NotFound));

        let err = h
            .service
            .lookup_by_code("AAAA-BBBB-CCCC")
            .await
            .unwrap_err();
        assert!(matches!(err, GiftCardError::NotFound));
    }

    #[tokio::test]
    async fn redeem_walks_the_full_lifecycle() {
        let h = harness();
        let card = h.service.create(request(500, true)).await.unwrap();

        let after_first = h
            .service
            .redeem(redeem_request(card.code.as_str(), 200))
            .await
            .unwrap();
        assert_eq!(after_first.balance.units(), 300);
        assert_eq!(after_first.status, GiftCardStatus::PartiallyUsed);
        assert!(after_first.redeemed_at.is_none());

        let after_second = h
            .service
            .redeem(redeem_request(card.code.as_str(), 300))
            .await
            .unwrap();
        assert_eq!(after_second.balance, Money::ZERO);
        assert_eq!(after_second.status, GiftCardStatus::Redeemed);
        assert!(after_second.redeemed_at.is_some());
        assert_eq!(after_second.usage_history.len(), 2);
        assert_eq!(
            after_second.ledger_total(),
            after_second.amount.units() - after_second.balance.units()
        );

        // terminal: any further spend is NotActive
        let err = h
            .service
            .redeem(redeem_request(card.code.as_str(), 1))
            .await
            .unwrap_err();
        assert!(matches!(err, GiftCardError::NotActive { .. }));
    }

    #[tokio::test]
    async fn redeem_rejects_overspend_and_zero() {
        let h = harness();
        let card = h.service.create(request(200, true)).await.unwrap();

        let err = h
            .service
            .redeem(redeem_request(card.code.as_str(), 201))
            .await
            .unwrap_err();
        assert!(matches!(err, GiftCardError::InsufficientBalance { .. }));

        let mut zero = redeem_request(card.code.as_str(), 100);
        zero.amount = Money::ZERO;
        let err = h.service.redeem(zero).await.unwrap_err();
        assert!(matches!(err, GiftCardError::ZeroSpend));

        // failed attempts leave no trace
        let fresh = h.service.lookup_by_id(card.id).await.unwrap();
        assert_eq!(fresh.balance.units(), 200);
        assert!(fresh.usage_history.is_empty());
    }

    #[tokio::test]
    async fn redeem_uses_default_description_when_blank() {
        let h = harness();
        let card = h.service.create(request(200, true)).await.unwrap();

        let mut req = redeem_request(card.code.as_str(), 50);
        req.description = Some(String::new());
        let updated = h.service.redeem(req).await.unwrap();
        assert_eq!(
            updated.usage_history.first().unwrap().description,
            DEFAULT_USAGE_DESCRIPTION
        );
    }

    #[tokio::test]
    async fn expired_card_fails_redeem_and_the_flip_persists() {
        let h = harness();
        let card = h.service.create(request(300, true)).await.unwrap();

        h.clock.set(card.expires_at + ChronoDuration::days(1));
        let err = h
            .service
            .redeem(redeem_request(card.code.as_str(), 100))
            .await
            .unwrap_err();
        assert!(matches!(err, GiftCardError::Expired { .. }));

        // the read path already persisted the flip
        let stored = h.service.lookup_by_id(card.id).await.unwrap();
        assert_eq!(stored.status, GiftCardStatus::Expired);

        let records = h.audit.records().await;
        assert!(
            records
                .iter()
                .any(|r| r.action == AuditAction::Expired && r.actor.to_string() == "system")
        );
    }

    #[tokio::test]
    async fn validate_reports_reasons_without_erroring() {
        let h = harness();

        let missing = h.service.validate("AAAA-BBBB-CCCC-DDDD").await.unwrap();
        assert!(!missing.valid);
        assert!(missing.card.is_none());
        assert_eq!(missing.reason, Some(DeclineReason::NotFound));

        let card = h.service.create(request(300, true)).await.unwrap();
        let ok = h.service.validate(card.code.as_str()).await.unwrap();
        assert!(ok.valid);
        assert!(ok.reason.is_none());
        assert_eq!(ok.card.as_ref().map(|c| c.id), Some(card.id));

        h.service
            .redeem(redeem_request(card.code.as_str(), 300))
            .await
            .unwrap();
        let spent = h.service.validate(card.code.as_str()).await.unwrap();
        assert!(!spent.valid);
        assert_eq!(spent.reason, Some(DeclineReason::NotActive));

        let gift = h.service.create(request(300, true)).await.unwrap();
        h.clock.set(gift.expires_at + ChronoDuration::days(1));
        let expired = h.service.validate(gift.code.as_str()).await.unwrap();
        assert!(!expired.valid);
        assert_eq!(expired.reason, Some(DeclineReason::Expired));
    }

    #[tokio::test]
    async fn listings_project_by_role_and_dedup_self_purchases() {
        let h = harness();
        // self purchase: dana is both purchaser and recipient
        let own = h.service.create(request(200, true)).await.unwrap();
        h.clock.advance(ChronoDuration::minutes(1));
        // gift: dana buys for noa
        let gifted = h.service.create(request(300, false)).await.unwrap();

        let dana = EmailAddress::parse("dana@example.com").unwrap();
        let noa = EmailAddress::parse("noa@example.com").unwrap();

        let dana_cards = h.service.list_by_email(&dana).await.unwrap();
        let ids: Vec<GiftCardId> = dana_cards.iter().map(|c| c.id).collect();
        // both cards, each exactly once, newest first
        assert_eq!(ids, vec![gifted.id, own.id]);

        let noa_cards = h.service.list_by_email(&noa).await.unwrap();
        assert_eq!(noa_cards.len(), 1);

        let purchased = h
            .service
            .list_purchased_by(&UserId::from("member-1"))
            .await
            .unwrap();
        assert_eq!(purchased.len(), 2);

        let received = h.service.list_received_by(&noa).await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received.first().unwrap().id, gifted.id);

        let nobody = EmailAddress::parse("ghost@example.com").unwrap();
        assert!(h.service.list_by_email(&nobody).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_all_refreshes_expired_cards_on_the_way_out() {
        let h = harness();
        let card = h.service.create(request(300, true)).await.unwrap();
        h.clock.set(card.expires_at + ChronoDuration::days(1));

        let page = h.service.list_all(ListFilter::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(
            page.items.first().unwrap().status,
            GiftCardStatus::Expired
        );
    }

    #[tokio::test]
    async fn stats_invalidate_on_mutation() {
        let h = harness();
        h.service.create(request(200, true)).await.unwrap();

        let first = h.service.stats().await.unwrap();
        assert_eq!(first.total_count, 1);
        assert_eq!(first.active_balance.units(), 200);

        // a second create must not serve the stale snapshot
        h.service.create(request(300, false)).await.unwrap();
        let second = h.service.stats().await.unwrap();
        assert_eq!(second.total_count, 2);
        assert_eq!(second.active_balance.units(), 500);
    }

    // Store wrapper that fails the first N inserts with a code conflict.
    struct CollidingStore {
        inner: MemoryGiftCardStore,
        conflicts_left: AtomicU32,
    }

    #[async_trait]
    impl GiftCardStore for CollidingStore {
        async fn insert(&self, card: &GiftCard) -> Result<(), StoreError> {
            if self
                .conflicts_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Conflict("gift card code already exists".to_owned()));
            }
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
            self.inner
                .apply_redemption(id, expected_version, update)
                .await
        }

        async fn list_by_email(&self, email: &EmailAddress) -> Result<Vec<GiftCard>, StoreError> {
            self.inner.list_by_email(email).await
        }

        async fn list_purchased_by(
            &self,
            purchaser: &UserId,
        ) -> Result<Vec<GiftCard>, StoreError> {
            self.inner.list_purchased_by(purchaser).await
        }

        async fn list_received_by(
            &self,
            email: &EmailAddress,
        ) -> Result<Vec<GiftCard>, StoreError> {
            self.inner.list_received_by(email).await
        }

        async fn list_page(&self, filter: &ListFilter) -> Result<Page<GiftCard>, StoreError> {
            self.inner.list_page(filter).await
        }

        async fn stats(&self, now: DateTime<Utc>) -> Result<GiftCardStats, StoreError> {
            self.inner.stats(now).await
        }
    }

    #[tokio::test]
    async fn create_retries_past_code_collisions() {
        let store = Arc::new(CollidingStore {
            inner: MemoryGiftCardStore::new(),
            conflicts_left: AtomicU32::new(2),
        });
        let service = GiftCardService::with_clock(
            Arc::clone(&store) as Arc<dyn GiftCardStore>,
            Arc::new(MemoryAuditSink::new()),
            Arc::new(ManualClock::new(start())),
        );

        let card = service.create(request(250, true)).await.unwrap();
        assert_eq!(card.balance.units(), 250);
        assert_eq!(store.inner.len().await, 1);
    }

    #[tokio::test]
    async fn create_gives_up_after_exhausting_code_attempts() {
        let store = Arc::new(CollidingStore {
            inner: MemoryGiftCardStore::new(),
            conflicts_left: AtomicU32::new(u32::MAX),
        });
        let service = GiftCardService::with_clock(
            store,
            Arc::new(MemoryAuditSink::new()),
            Arc::new(ManualClock::new(start())),
        );

        let err = service.create(request(250, true)).await.unwrap_err();
        assert!(matches!(err, GiftCardError::Store(StoreError::Conflict(_))));
    }

    // Sink that refuses every record.
    struct FailingAuditSink;

    #[async_trait]
    impl AuditSink for FailingAuditSink {
        async fn record(&self, _record: AuditRecord) -> Result<(), AuditError> {
            Err(AuditError::Unavailable("audit pipe closed".to_owned()))
        }
    }

    #[tokio::test]
    async fn audit_failures_never_block_the_operation() {
        let store = Arc::new(MemoryGiftCardStore::new());
        let clock = Arc::new(ManualClock::new(start()));
        let service = GiftCardService::with_clock(
            Arc::clone(&store) as Arc<dyn GiftCardStore>,
            Arc::new(FailingAuditSink),
            Arc::clone(&clock) as Arc<dyn Clock>,
        );

        let card = service.create(request(300, true)).await.unwrap();
        let updated = service
            .redeem(redeem_request(card.code.as_str(), 100))
            .await
            .unwrap();
        assert_eq!(updated.balance.units(), 200);

        // both writes landed even though every record was refused
        let stored = store.find_by_id(card.id).await.unwrap().unwrap();
        assert_eq!(stored.balance.units(), 200);
        assert_eq!(stored.status, GiftCardStatus::PartiallyUsed);
        assert_eq!(stored.version, 2);

        // the lazy expiration flip persists through a dead sink too
        clock.set(card.expires_at + ChronoDuration::days(1));
        let flipped = service.lookup_by_id(card.id).await.unwrap();
        assert_eq!(flipped.status, GiftCardStatus::Expired);
        assert_eq!(flipped.version, 3);
    }
}

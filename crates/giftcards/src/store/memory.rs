//! In-memory gift card store.
//!
//! Mirrors the `PostgreSQL` store's observable behavior, including the
//! version-checked writes, so the redemption engine's concurrency handling
//! is testable without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stagedoor_core::{CardCode, EmailAddress, GiftCardId, GiftCardStatus, Money, UserId};
use tokio::sync::Mutex;

use super::{GiftCardStats, GiftCardStore, ListFilter, Page, StoreError};
use crate::model::{GiftCard, RedemptionUpdate};

/// Gift card store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryGiftCardStore {
    cards: Mutex<HashMap<GiftCardId, GiftCard>>,
}

impl MemoryGiftCardStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cards held. For test assertions.
    pub async fn len(&self) -> usize {
        self.cards.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cards.lock().await.is_empty()
    }
}

fn newest_first(mut cards: Vec<GiftCard>) -> Vec<GiftCard> {
    cards.sort_by(|a, b| b.purchased_at.cmp(&a.purchased_at));
    cards
}

#[async_trait]
impl GiftCardStore for MemoryGiftCardStore {
    async fn insert(&self, card: &GiftCard) -> Result<(), StoreError> {
        let mut cards = self.cards.lock().await;
        if cards.values().any(|existing| existing.code == card.code) {
            return Err(StoreError::Conflict(format!(
                "gift card code {} already exists",
                card.code.masked()
            )));
        }
        if cards.contains_key(&card.id) {
            return Err(StoreError::Conflict(format!(
                "gift card {} already exists",
                card.id
            )));
        }
        cards.insert(card.id, card.clone());
        Ok(())
    }

    async fn find_by_code(&self, code: &CardCode) -> Result<Option<GiftCard>, StoreError> {
        let cards = self.cards.lock().await;
        Ok(cards.values().find(|card| card.code == *code).cloned())
    }

    async fn find_by_id(&self, id: GiftCardId) -> Result<Option<GiftCard>, StoreError> {
        Ok(self.cards.lock().await.get(&id).cloned())
    }

    async fn mark_expired(
        &self,
        id: GiftCardId,
        expected_version: i64,
    ) -> Result<bool, StoreError> {
        let mut cards = self.cards.lock().await;
        let Some(card) = cards.get_mut(&id) else {
            return Ok(false);
        };
        if card.version != expected_version || !card.status.is_spendable() {
            return Ok(false);
        }
        card.status = GiftCardStatus::Expired;
        card.version += 1;
        Ok(true)
    }

    async fn apply_redemption(
        &self,
        id: GiftCardId,
        expected_version: i64,
        update: &RedemptionUpdate,
    ) -> Result<bool, StoreError> {
        let mut cards = self.cards.lock().await;
        let Some(card) = cards.get_mut(&id) else {
            return Ok(false);
        };
        if card.version != expected_version {
            return Ok(false);
        }
        card.balance = update.balance;
        card.status = update.status;
        if let Some(at) = update.redeemed_at {
            card.redeemed_at = Some(at);
        }
        card.usage_history.push(update.entry.clone());
        card.version += 1;
        Ok(true)
    }

    async fn list_by_email(&self, email: &EmailAddress) -> Result<Vec<GiftCard>, StoreError> {
        let cards = self.cards.lock().await;
        Ok(newest_first(
            cards
                .values()
                .filter(|card| card.purchaser.email == *email || card.recipient.email == *email)
                .cloned()
                .collect(),
        ))
    }

    async fn list_purchased_by(&self, purchaser: &UserId) -> Result<Vec<GiftCard>, StoreError> {
        let cards = self.cards.lock().await;
        Ok(newest_first(
            cards
                .values()
                .filter(|card| card.purchaser.id == *purchaser)
                .cloned()
                .collect(),
        ))
    }

    async fn list_received_by(&self, email: &EmailAddress) -> Result<Vec<GiftCard>, StoreError> {
        let cards = self.cards.lock().await;
        Ok(newest_first(
            cards
                .values()
                .filter(|card| card.recipient.email == *email)
                .cloned()
                .collect(),
        ))
    }

    async fn list_page(&self, filter: &ListFilter) -> Result<Page<GiftCard>, StoreError> {
        let (page, limit) = filter.normalized();
        let matching: Vec<GiftCard> = {
            let cards = self.cards.lock().await;
            cards
                .values()
                .filter(|card| {
                    filter.status.is_none_or(|status| card.status == status)
                        && filter.email.as_ref().is_none_or(|email| {
                            card.purchaser.email == *email || card.recipient.email == *email
                        })
                })
                .cloned()
                .collect()
        };
        let matching = newest_first(matching);

        let total = u64::try_from(matching.len()).unwrap_or(0);
        let offset = usize::try_from(filter.offset()).unwrap_or(0);
        let items = matching
            .into_iter()
            .skip(offset)
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect();

        Ok(Page {
            items,
            total,
            page,
            limit,
        })
    }

    async fn stats(&self, now: DateTime<Utc>) -> Result<GiftCardStats, StoreError> {
        let cards = self.cards.lock().await;

        let mut active_count = 0;
        let mut partially_used_count = 0;
        let mut redeemed_count = 0;
        let mut expired_count = 0;
        let mut total_value: i64 = 0;
        let mut active_balance: i64 = 0;

        for card in cards.values() {
            match card.status {
                GiftCardStatus::Active => active_count += 1,
                GiftCardStatus::PartiallyUsed => partially_used_count += 1,
                GiftCardStatus::Redeemed => redeemed_count += 1,
                GiftCardStatus::Expired => expired_count += 1,
            }
            total_value = total_value.saturating_add(card.amount.units());
            if card.status.is_spendable() && card.expires_at > now {
                active_balance = active_balance.saturating_add(card.balance.units());
            }
        }

        Ok(GiftCardStats {
            total_count: i64::try_from(cards.len()).unwrap_or(i64::MAX),
            active_count,
            partially_used_count,
            redeemed_count,
            expired_count,
            total_value: Money::new(total_value)
                .map_err(|e| StoreError::DataCorruption(format!("negative total value: {e}")))?,
            active_balance: Money::new(active_balance)
                .map_err(|e| StoreError::DataCorruption(format!("negative balance sum: {e}")))?,
        })
    }
}

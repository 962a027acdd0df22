//! `PostgreSQL` gift card store.
//!
//! # Table: `gift_cards`
//!
//! One row per card. The redemption ledger lives in the `usage_history`
//! JSONB column (append-only, commit order), so a redemption is a single
//! guarded UPDATE: balance, status, and the ledger append land atomically
//! without an explicit transaction.
//!
//! # Migrations
//!
//! Schema lives in `crates/giftcards/migrations/` and is applied with:
//!
//! ```bash
//! sd-cli migrate
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use stagedoor_core::{CardCode, Currency, EmailAddress, GiftCardId, Money, UserId};
use uuid::Uuid;

use super::{GiftCardStats, GiftCardStore, ListFilter, Page, StoreError};
use crate::model::{GiftCard, Purchaser, Recipient, RedemptionUpdate, UsageEntry};

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection fails.
pub async fn create_pool(database_url: &SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Row shape as stored; converted to the domain aggregate on read.
#[derive(sqlx::FromRow)]
struct GiftCardRow {
    id: Uuid,
    code: String,
    amount: i64,
    balance: i64,
    currency: String,
    status: String,
    purchaser_id: String,
    purchaser_email: String,
    purchaser_name: String,
    recipient_email: String,
    recipient_name: String,
    recipient_phone: Option<String>,
    message: Option<String>,
    purchased_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    redeemed_at: Option<DateTime<Utc>>,
    usage_history: serde_json::Value,
    version: i64,
}

impl TryFrom<GiftCardRow> for GiftCard {
    type Error = StoreError;

    fn try_from(row: GiftCardRow) -> Result<Self, Self::Error> {
        let code = CardCode::parse(&row.code)
            .map_err(|e| StoreError::DataCorruption(format!("invalid code in database: {e}")))?;
        let amount = Money::new(row.amount)
            .map_err(|e| StoreError::DataCorruption(format!("invalid amount in database: {e}")))?;
        let balance = Money::new(row.balance)
            .map_err(|e| StoreError::DataCorruption(format!("invalid balance in database: {e}")))?;
        let currency: Currency = row.currency.parse().map_err(|e| {
            StoreError::DataCorruption(format!("invalid currency in database: {e}"))
        })?;
        let status = row
            .status
            .parse()
            .map_err(|e| StoreError::DataCorruption(format!("invalid status in database: {e}")))?;
        let purchaser_email = EmailAddress::parse(&row.purchaser_email).map_err(|e| {
            StoreError::DataCorruption(format!("invalid purchaser email in database: {e}"))
        })?;
        let recipient_email = EmailAddress::parse(&row.recipient_email).map_err(|e| {
            StoreError::DataCorruption(format!("invalid recipient email in database: {e}"))
        })?;
        let usage_history: Vec<UsageEntry> = serde_json::from_value(row.usage_history)
            .map_err(|e| {
                StoreError::DataCorruption(format!("invalid usage history in database: {e}"))
            })?;

        Ok(Self {
            id: GiftCardId::from_uuid(row.id),
            code,
            amount,
            balance,
            currency,
            status,
            purchaser: Purchaser {
                id: UserId::new(row.purchaser_id),
                email: purchaser_email,
                name: row.purchaser_name,
            },
            recipient: Recipient {
                email: recipient_email,
                name: row.recipient_name,
                phone: row.recipient_phone,
            },
            message: row.message,
            purchased_at: row.purchased_at,
            expires_at: row.expires_at,
            redeemed_at: row.redeemed_at,
            usage_history,
            version: row.version,
        })
    }
}

#[derive(sqlx::FromRow)]
struct StatsRow {
    total_count: i64,
    active_count: i64,
    partially_used_count: i64,
    redeemed_count: i64,
    expired_count: i64,
    total_value: i64,
    active_balance: i64,
}

/// Gift card store backed by `PostgreSQL`.
pub struct PgGiftCardStore {
    pool: PgPool,
}

impl PgGiftCardStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn rows_to_cards(rows: Vec<GiftCardRow>) -> Result<Vec<GiftCard>, StoreError> {
    rows.into_iter().map(GiftCard::try_from).collect()
}

/// Append the optional status/email filters as a WHERE clause.
fn push_filters<'a>(query: &mut QueryBuilder<'a, Postgres>, filter: &'a ListFilter) {
    let mut separator = " WHERE ";
    if let Some(status) = filter.status {
        query.push(separator);
        query.push("status = ");
        query.push_bind(status.as_str());
        separator = " AND ";
    }
    if let Some(email) = &filter.email {
        query.push(separator);
        query.push("(purchaser_email = ");
        query.push_bind(email.as_str());
        query.push(" OR recipient_email = ");
        query.push_bind(email.as_str());
        query.push(")");
    }
}

#[async_trait]
impl GiftCardStore for PgGiftCardStore {
    async fn insert(&self, card: &GiftCard) -> Result<(), StoreError> {
        let usage_history = serde_json::to_value(&card.usage_history).map_err(|e| {
            StoreError::DataCorruption(format!("unserializable usage history: {e}"))
        })?;

        sqlx::query(
            r"
            INSERT INTO gift_cards (
                id, code, amount, balance, currency, status,
                purchaser_id, purchaser_email, purchaser_name,
                recipient_email, recipient_name, recipient_phone,
                message, purchased_at, expires_at, redeemed_at,
                usage_history, version
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9,
                $10, $11, $12, $13, $14, $15, $16, $17, $18
            )
            ",
        )
        .bind(card.id.as_uuid())
        .bind(card.code.as_str())
        .bind(card.amount.units())
        .bind(card.balance.units())
        .bind(card.currency.code())
        .bind(card.status.as_str())
        .bind(card.purchaser.id.as_str())
        .bind(card.purchaser.email.as_str())
        .bind(card.purchaser.name.as_str())
        .bind(card.recipient.email.as_str())
        .bind(card.recipient.name.as_str())
        .bind(card.recipient.phone.as_deref())
        .bind(card.message.as_deref())
        .bind(card.purchased_at)
        .bind(card.expires_at)
        .bind(card.redeemed_at)
        .bind(usage_history)
        .bind(card.version)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                StoreError::Conflict(format!(
                    "gift card code {} already exists",
                    card.code.masked()
                ))
            } else {
                StoreError::Database(e)
            }
        })?;

        Ok(())
    }

    async fn find_by_code(&self, code: &CardCode) -> Result<Option<GiftCard>, StoreError> {
        let row = sqlx::query_as::<_, GiftCardRow>(
            r"
            SELECT
                id, code, amount, balance, currency, status,
                purchaser_id, purchaser_email, purchaser_name,
                recipient_email, recipient_name, recipient_phone,
                message, purchased_at, expires_at, redeemed_at,
                usage_history, version
            FROM gift_cards
            WHERE code = $1
            ",
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(GiftCard::try_from).transpose()
    }

    async fn find_by_id(&self, id: GiftCardId) -> Result<Option<GiftCard>, StoreError> {
        let row = sqlx::query_as::<_, GiftCardRow>(
            r"
            SELECT
                id, code, amount, balance, currency, status,
                purchaser_id, purchaser_email, purchaser_name,
                recipient_email, recipient_name, recipient_phone,
                message, purchased_at, expires_at, redeemed_at,
                usage_history, version
            FROM gift_cards
            WHERE id = $1
            ",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(GiftCard::try_from).transpose()
    }

    async fn mark_expired(
        &self,
        id: GiftCardId,
        expected_version: i64,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r"
            UPDATE gift_cards
            SET status = 'expired', version = version + 1
            WHERE id = $1
              AND version = $2
              AND status IN ('active', 'partially_used')
            ",
        )
        .bind(id.as_uuid())
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn apply_redemption(
        &self,
        id: GiftCardId,
        expected_version: i64,
        update: &RedemptionUpdate,
    ) -> Result<bool, StoreError> {
        let entry = serde_json::to_value(&update.entry).map_err(|e| {
            StoreError::DataCorruption(format!("unserializable ledger entry: {e}"))
        })?;

        // `usage_history || $6` appends the entry object to the JSONB array,
        // so the whole redemption is one compare-and-swap statement.
        let result = sqlx::query(
            r"
            UPDATE gift_cards
            SET balance = $3,
                status = $4,
                redeemed_at = COALESCE($5, redeemed_at),
                usage_history = usage_history || $6,
                version = version + 1
            WHERE id = $1 AND version = $2
            ",
        )
        .bind(id.as_uuid())
        .bind(expected_version)
        .bind(update.balance.units())
        .bind(update.status.as_str())
        .bind(update.redeemed_at)
        .bind(entry)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_by_email(&self, email: &EmailAddress) -> Result<Vec<GiftCard>, StoreError> {
        let rows = sqlx::query_as::<_, GiftCardRow>(
            r"
            SELECT
                id, code, amount, balance, currency, status,
                purchaser_id, purchaser_email, purchaser_name,
                recipient_email, recipient_name, recipient_phone,
                message, purchased_at, expires_at, redeemed_at,
                usage_history, version
            FROM gift_cards
            WHERE purchaser_email = $1 OR recipient_email = $1
            ORDER BY purchased_at DESC
            ",
        )
        .bind(email.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows_to_cards(rows)
    }

    async fn list_purchased_by(&self, purchaser: &UserId) -> Result<Vec<GiftCard>, StoreError> {
        let rows = sqlx::query_as::<_, GiftCardRow>(
            r"
            SELECT
                id, code, amount, balance, currency, status,
                purchaser_id, purchaser_email, purchaser_name,
                recipient_email, recipient_name, recipient_phone,
                message, purchased_at, expires_at, redeemed_at,
                usage_history, version
            FROM gift_cards
            WHERE purchaser_id = $1
            ORDER BY purchased_at DESC
            ",
        )
        .bind(purchaser.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows_to_cards(rows)
    }

    async fn list_received_by(&self, email: &EmailAddress) -> Result<Vec<GiftCard>, StoreError> {
        let rows = sqlx::query_as::<_, GiftCardRow>(
            r"
            SELECT
                id, code, amount, balance, currency, status,
                purchaser_id, purchaser_email, purchaser_name,
                recipient_email, recipient_name, recipient_phone,
                message, purchased_at, expires_at, redeemed_at,
                usage_history, version
            FROM gift_cards
            WHERE recipient_email = $1
            ORDER BY purchased_at DESC
            ",
        )
        .bind(email.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows_to_cards(rows)
    }

    async fn list_page(&self, filter: &ListFilter) -> Result<Page<GiftCard>, StoreError> {
        let (page, limit) = filter.normalized();

        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM gift_cards");
        push_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut page_query = QueryBuilder::<Postgres>::new(
            "SELECT \
             id, code, amount, balance, currency, status, \
             purchaser_id, purchaser_email, purchaser_name, \
             recipient_email, recipient_name, recipient_phone, \
             message, purchased_at, expires_at, redeemed_at, \
             usage_history, version \
             FROM gift_cards",
        );
        push_filters(&mut page_query, filter);
        page_query.push(" ORDER BY purchased_at DESC LIMIT ");
        page_query.push_bind(i64::from(limit));
        page_query.push(" OFFSET ");
        page_query.push_bind(filter.offset());

        let rows: Vec<GiftCardRow> = page_query.build_query_as().fetch_all(&self.pool).await?;

        Ok(Page {
            items: rows_to_cards(rows)?,
            total: u64::try_from(total).unwrap_or(0),
            page,
            limit,
        })
    }

    async fn stats(&self, now: DateTime<Utc>) -> Result<GiftCardStats, StoreError> {
        // SUM(bigint) is NUMERIC in PostgreSQL, hence the casts.
        let row = sqlx::query_as::<_, StatsRow>(
            r"
            SELECT
                COUNT(*) AS total_count,
                COUNT(*) FILTER (WHERE status = 'active') AS active_count,
                COUNT(*) FILTER (WHERE status = 'partially_used') AS partially_used_count,
                COUNT(*) FILTER (WHERE status = 'redeemed') AS redeemed_count,
                COUNT(*) FILTER (WHERE status = 'expired') AS expired_count,
                COALESCE(SUM(amount), 0)::BIGINT AS total_value,
                COALESCE(
                    SUM(balance) FILTER (
                        WHERE status IN ('active', 'partially_used') AND expires_at > $1
                    ),
                    0
                )::BIGINT AS active_balance
            FROM gift_cards
            ",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(GiftCardStats {
            total_count: row.total_count,
            active_count: row.active_count,
            partially_used_count: row.partially_used_count,
            redeemed_count: row.redeemed_count,
            expired_count: row.expired_count,
            total_value: Money::new(row.total_value)
                .map_err(|e| StoreError::DataCorruption(format!("negative total value: {e}")))?,
            active_balance: Money::new(row.active_balance)
                .map_err(|e| StoreError::DataCorruption(format!("negative balance sum: {e}")))?,
        })
    }
}

//! Audit trail for gift card mutations.
//!
//! Every create, redemption, and expiration flip emits an [`AuditRecord`]
//! through an [`AuditSink`]. Recording is fire-and-forget relative to the
//! primary operation: a sink failure is logged and never rolls back a
//! committed redemption.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use stagedoor_core::{EmailAddress, GiftCardId, UserId};
use thiserror::Error;
use tokio::sync::Mutex;

/// Entity type stamped on every record.
pub const ENTITY_KIND: &str = "gift-card";

/// Errors a sink may report. Callers log these and continue.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Who performed an action.
#[derive(Debug, Clone, Serialize)]
pub struct AuditActor {
    pub id: Option<UserId>,
    pub email: Option<EmailAddress>,
}

impl AuditActor {
    /// An authenticated principal.
    #[must_use]
    pub const fn user(id: UserId, email: EmailAddress) -> Self {
        Self {
            id: Some(id),
            email: Some(email),
        }
    }

    /// An unattended process: CLI tooling, or the lazy expiration refresh
    /// that runs on read paths.
    #[must_use]
    pub const fn system() -> Self {
        Self {
            id: None,
            email: None,
        }
    }
}

impl fmt::Display for AuditActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(email) = &self.email {
            write!(f, "{email}")
        } else if let Some(id) = &self.id {
            write!(f, "{id}")
        } else {
            write!(f, "system")
        }
    }
}

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Redeemed,
    Expired,
}

/// One audit record.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub actor: AuditActor,
    pub action: AuditAction,
    pub entity_kind: &'static str,
    pub entity_id: GiftCardId,
    /// Human-readable summary. Card codes appear masked.
    pub summary: String,
    pub at: DateTime<Utc>,
}

impl AuditRecord {
    #[must_use]
    pub fn new(
        actor: AuditActor,
        action: AuditAction,
        entity_id: GiftCardId,
        summary: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            actor,
            action,
            entity_kind: ENTITY_KIND,
            entity_id,
            summary: summary.into(),
            at,
        }
    }
}

/// Consumer of audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record one entry.
    ///
    /// # Errors
    ///
    /// Sink-specific failure; callers log it and continue.
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError>;
}

/// Sink that emits structured log events under the `audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        tracing::info!(
            target: "audit",
            actor = %record.actor,
            action = ?record.action,
            entity_kind = record.entity_kind,
            entity_id = %record.entity_id,
            at = %record.at,
            "{}",
            record.summary
        );
        Ok(())
    }
}

/// Sink that keeps records in memory. For tests and local tooling.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far, oldest first.
    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        self.records.lock().await.push(record);
        Ok(())
    }
}

//! Durable archive store
//!
//! Entries are upserted by `id`. On conflict only the mutable metadata
//! (`meta`, `publish_state`, `recorded_at`) is refreshed; the event itself is
//! never rewritten.

use super::ArchiveResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::event::{ArchiveContext, EventLogEntry};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use std::time::Duration;

/// Archive-store collaborator
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Create the table and index if missing
    async fn ensure_schema(&self) -> ArchiveResult<()>;

    /// Upsert every entry in one transaction; all-or-nothing
    async fn upsert_batch(
        &self,
        context: &ArchiveContext,
        entries: &[EventLogEntry],
        recorded_at: DateTime<Utc>,
    ) -> ArchiveResult<usize>;

    /// Release connections
    async fn close(&self);
}

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS event_journal (
    id TEXT PRIMARY KEY,
    branch_id TEXT NOT NULL,
    module_id TEXT NOT NULL,
    table_name TEXT,
    action TEXT NOT NULL,
    record JSONB,
    meta JSONB,
    publish_state JSONB,
    created_at TIMESTAMPTZ NOT NULL,
    recorded_at TIMESTAMPTZ NOT NULL,
    sequence BIGINT
)
"#;

const CREATE_INDEX: &str = "CREATE INDEX IF NOT EXISTS event_journal_branch_module_idx \
     ON event_journal (branch_id, module_id, sequence)";

const UPSERT: &str = r#"
INSERT INTO event_journal
    (id, branch_id, module_id, table_name, action, record, meta, publish_state, created_at, recorded_at, sequence)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
ON CONFLICT (id) DO UPDATE SET
    meta = EXCLUDED.meta,
    publish_state = EXCLUDED.publish_state,
    recorded_at = EXCLUDED.recorded_at
"#;

/// Postgres-backed archive store
#[derive(Clone)]
pub struct PgArchiveStore {
    pool: PgPool,
}

impl PgArchiveStore {
    /// Build a lazily-connecting pool; nothing is dialed until the first cycle
    pub fn connect_lazy(url: &str) -> ArchiveResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy(url)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArchiveStore for PgArchiveStore {
    async fn ensure_schema(&self) -> ArchiveResult<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_INDEX).execute(&self.pool).await?;
        tracing::info!("Event archive schema ready");
        Ok(())
    }

    async fn upsert_batch(
        &self,
        context: &ArchiveContext,
        entries: &[EventLogEntry],
        recorded_at: DateTime<Utc>,
    ) -> ArchiveResult<usize> {
        // Dropping the transaction without commit rolls it back
        let mut tx = self.pool.begin().await?;

        for entry in entries {
            sqlx::query(UPSERT)
                .bind(&entry.id)
                .bind(entry.branch_or(context))
                .bind(entry.module_or(context))
                .bind(entry.table.as_deref())
                .bind(&entry.action)
                .bind(entry.record.as_ref().map(Json))
                .bind(Json(&entry.meta))
                .bind(Json(&entry.publish_state))
                .bind(entry.created_at.unwrap_or(recorded_at))
                .bind(recorded_at)
                .bind(entry.sequence)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(entries.len())
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Event archive pool closed");
    }
}

//! Test doubles shared by unit and integration tests
//!
//! Enabled for this crate's own tests and, through the `test-utils` feature,
//! for the integration tests under `tests/`.

use crate::archiving::{ArchiveError, ArchiveResult, ArchiveStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use shared::event::{ArchiveContext, EventLogEntry};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Archived row as the Postgres table would hold it
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedRow {
    pub branch_id: String,
    pub module_id: String,
    pub action: String,
    pub record: Option<Value>,
    pub meta: Value,
    pub publish_state: Value,
    pub created_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
}

/// In-memory archive store
///
/// Follows the `event_journal` upsert: the first write of an id fixes the
/// event, later writes only refresh `meta`, `publish_state` and `recorded_at`.
/// Batches for a failing branch are rejected whole; a stalled store never
/// answers an upsert.
#[derive(Default)]
pub struct MemoryArchiveStore {
    rows: Mutex<BTreeMap<String, ArchivedRow>>,
    failing_branches: Mutex<HashSet<String>>,
    stalled: AtomicBool,
    schema_calls: AtomicUsize,
    upsert_calls: AtomicUsize,
    closed: AtomicBool,
}

impl MemoryArchiveStore {
    pub fn failing_for(branch_id: &str) -> Self {
        let store = Self::default();
        store.fail_branch(branch_id);
        store
    }

    pub fn fail_branch(&self, branch_id: &str) {
        self.failing_branches.lock().insert(branch_id.to_string());
    }

    pub fn heal(&self) {
        self.failing_branches.lock().clear();
    }

    /// Every later upsert hangs until its future is dropped
    pub fn stall(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }

    pub fn row(&self, id: &str) -> Option<ArchivedRow> {
        self.rows.lock().get(id).cloned()
    }

    pub fn rows(&self) -> BTreeMap<String, ArchivedRow> {
        self.rows.lock().clone()
    }

    pub fn schema_calls(&self) -> usize {
        self.schema_calls.load(Ordering::SeqCst)
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArchiveStore for MemoryArchiveStore {
    async fn ensure_schema(&self) -> ArchiveResult<()> {
        self.schema_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upsert_batch(
        &self,
        context: &ArchiveContext,
        entries: &[EventLogEntry],
        recorded_at: DateTime<Utc>,
    ) -> ArchiveResult<usize> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.failing_branches.lock().contains(&context.branch_id) {
            return Err(ArchiveError::Store("transaction rolled back".into()));
        }

        let mut rows = self.rows.lock();
        for entry in entries {
            rows.entry(entry.id.clone())
                .and_modify(|row| {
                    row.meta = entry.meta.clone();
                    row.publish_state = entry.publish_state.clone();
                    row.recorded_at = recorded_at;
                })
                .or_insert_with(|| ArchivedRow {
                    branch_id: entry.branch_or(context).to_string(),
                    module_id: entry.module_or(context).to_string(),
                    action: entry.action.clone(),
                    record: entry.record.clone(),
                    meta: entry.meta.clone(),
                    publish_state: entry.publish_state.clone(),
                    created_at: entry.created_at.unwrap_or(recorded_at),
                    recorded_at,
                });
        }
        Ok(entries.len())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

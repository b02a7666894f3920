//! Failed-post ledger
//!
//! Every engine dispatch that fails is appended here for later retry. Entries
//! are never mutated by the bridge; a separate retry worker consumes them.

use super::LocalStore;
use serde_json::Value;
use shared::record::Record;
use shared::util::now_rfc3339;
use std::sync::Arc;

/// Logical table holding ledger entries
pub const FAILED_POSTS_TABLE: &str = "failed_posts";

/// Status of a fresh entry
pub const PENDING: &str = "PENDING";

#[derive(Clone)]
pub struct FailedPostLedger {
    store: Arc<dyn LocalStore>,
}

impl FailedPostLedger {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// Append one entry. Never fails; storage errors are only logged.
    pub async fn log_failure(&self, table: &str, payload: &Value, error: &str) {
        let entry = Self::entry(table, payload, error);
        let entry_id = entry.id().unwrap_or_default();

        match self.store.insert(FAILED_POSTS_TABLE, &entry).await {
            Ok(()) => {
                tracing::warn!(
                    table = %table,
                    entry_id = %entry_id,
                    error = %error,
                    "Engine post failed, saved to failed-post ledger"
                );
            }
            Err(e) => {
                tracing::error!(
                    table = %table,
                    error = %error,
                    store_error = %e,
                    "Failed to write failed-post ledger entry"
                );
            }
        }
    }

    fn entry(table: &str, payload: &Value, error: &str) -> Record {
        // Payload is kept serialized so the ledger schema stays table-agnostic
        let serialized = serde_json::to_string(payload).unwrap_or_else(|_| payload.to_string());

        Record::new()
            .with("id", uuid::Uuid::new_v4().to_string())
            .with("table", table)
            .with("payload", serialized)
            .with("error", error)
            .with("retry_count", 0)
            .with("created_at", now_rfc3339())
            .with("status", PENDING)
    }

    /// All entries, oldest first
    pub async fn entries(&self) -> super::StoreResult<Vec<Record>> {
        self.store.list_records(FAILED_POSTS_TABLE).await
    }
}

//! Post-promotion cleanup of local drafts
//!
//! After the engine accepted a transactional record, the local draft is
//! deleted unless it was edited while the post was in flight.
//!
//! The check is read-compare-delete against the local store and is not
//! atomic: a third writer updating the draft between the read and the delete
//! loses that edit. This window is accepted.

use super::policy::draft_table;
use crate::archiving::EventLog;
use crate::store::{LocalStore, StoreResult};
use shared::engine::UserContext;
use shared::event::{ArchiveContext, DEFAULT_ACTION, DEFAULT_BRANCH, ENTITY_POSTED, EventLogEntry};
use shared::record::Record;
use shared::util::now_rfc3339;
use std::sync::Arc;

/// Result of a reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Draft and shadow rows were removed
    pub deleted: bool,
    /// Id of the `ENTITY_POSTED` notification, if one was emitted
    pub notification_id: Option<String>,
}

pub struct ArchivalReconciler {
    store: Arc<dyn LocalStore>,
    journal: Option<Arc<dyn EventLog>>,
    notification_table: String,
}

impl ArchivalReconciler {
    pub fn new(store: Arc<dyn LocalStore>, notification_table: impl Into<String>) -> Self {
        Self {
            store,
            journal: None,
            notification_table: notification_table.into(),
        }
    }

    /// Also append notifications to the module's event log
    pub fn with_journal(mut self, journal: Arc<dyn EventLog>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn notification_table(&self) -> &str {
        &self.notification_table
    }

    /// Best-effort cleanup; failures are logged and never reach the caller
    pub async fn reconcile(
        &self,
        module_id: &str,
        table: &str,
        payload: &Record,
        user: &UserContext,
    ) -> ReconcileOutcome {
        let Some(id) = payload.id() else {
            tracing::warn!(table = %table, "Posted payload has no id, skipping draft cleanup");
            return ReconcileOutcome::default();
        };

        match self.try_reconcile(module_id, table, &id, payload, user).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    table = %table,
                    record_id = %id,
                    error = %e,
                    "Failed to clean up local draft after post"
                );
                ReconcileOutcome::default()
            }
        }
    }

    async fn try_reconcile(
        &self,
        module_id: &str,
        table: &str,
        id: &str,
        payload: &Record,
        user: &UserContext,
    ) -> StoreResult<ReconcileOutcome> {
        let draft_table = draft_table(table);

        // A failed read aborts the cleanup; the draft is only deleted when it is known to be stale
        if let Some(draft) = self.store.get_record(&draft_table, id).await? {
            let sent = payload.modified_marker();
            let current = draft.modified_marker();
            if current > sent {
                tracing::warn!(
                    table = %table,
                    record_id = %id,
                    sent_marker = sent,
                    draft_marker = current,
                    "Draft modified while posting, keeping local version"
                );
                return Ok(ReconcileOutcome::default());
            }
        }

        self.store.delete_record(&draft_table, id).await?;
        self.store.delete_record(table, id).await?;
        tracing::info!(table = %table, record_id = %id, "Deleted local draft after post");

        let notification_id = if table == self.notification_table {
            None
        } else {
            self.notify(module_id, table, id, user).await
        };

        Ok(ReconcileOutcome {
            deleted: true,
            notification_id,
        })
    }

    /// Insert the `ENTITY_POSTED` row; the draft is already gone, so failures stop here
    async fn notify(&self, module_id: &str, table: &str, id: &str, user: &UserContext) -> Option<String> {
        let branch = user
            .branch_id
            .as_deref()
            .or(user.default_branch_id.as_deref());
        let notification = Record::new()
            .with("id", format!("notif-{}", uuid::Uuid::new_v4()))
            .with("company_id", user.company_id.clone())
            .with("branch_id", branch)
            .with("user_id", user.user_id.clone())
            .with("type", ENTITY_POSTED)
            .with("entity_table", table)
            .with("entity_id", id)
            .with("message", format!("New record posted to {table}"))
            .with("is_read", false)
            .with("created_at", now_rfc3339());
        let notification_id = notification.id()?;

        if let Err(e) = self.store.insert(&self.notification_table, &notification).await {
            tracing::warn!(table = %table, record_id = %id, error = %e, "Failed to insert post notification");
            return None;
        }

        if let Some(journal) = &self.journal {
            let context = ArchiveContext::new(branch.unwrap_or(DEFAULT_BRANCH), module_id);
            let entry = EventLogEntry::new(&context, self.notification_table.as_str(), DEFAULT_ACTION)
                .with_record(notification);
            if let Err(e) = journal.append(&context, &entry).await {
                tracing::warn!(context = %context, error = %e, "Failed to journal post notification");
            }
        }

        tracing::debug!(table = %table, record_id = %id, notification_id = %notification_id, "Post notification emitted");
        Some(notification_id)
    }
}

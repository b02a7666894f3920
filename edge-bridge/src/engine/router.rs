//! Write router
//!
//! Decides per write whether a record stays in the local store or is
//! dispatched to the engine, and runs draft cleanup after a successful
//! transactional post.

use super::client::EngineClient;
use super::policy::{ModuleRegistry, RouteDecision, decide};
use super::reconcile::{ArchivalReconciler, ReconcileOutcome};
use crate::store::LocalStore;
use shared::engine::{EngineResponse, UserContext, action};
use shared::error::{AppError, AppResult};
use shared::record::{ID_FIELD, Record};
use std::sync::Arc;

/// Where a save ended up
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Local {
        table: String,
        record: Record,
    },
    Engine {
        response: EngineResponse,
        /// Set for transactional posts the engine accepted
        reconciled: Option<ReconcileOutcome>,
    },
}

pub struct WriteRouter {
    modules: Arc<ModuleRegistry>,
    store: Arc<dyn LocalStore>,
    client: EngineClient,
    reconciler: ArchivalReconciler,
}

impl WriteRouter {
    pub fn new(
        modules: Arc<ModuleRegistry>,
        store: Arc<dyn LocalStore>,
        client: EngineClient,
        reconciler: ArchivalReconciler,
    ) -> Self {
        Self {
            modules,
            store,
            client,
            reconciler,
        }
    }

    pub fn client(&self) -> &EngineClient {
        &self.client
    }

    /// Route one save
    pub async fn route_save(
        &self,
        record: Record,
        table: &str,
        module_id: &str,
        user: &UserContext,
    ) -> AppResult<SaveOutcome> {
        let Some(record_id) = record.id() else {
            return Err(AppError::required_field(ID_FIELD));
        };

        let policy = self.modules.policy(module_id);
        let decision = decide(&policy, table, &record);

        match decision {
            RouteDecision::Local { table: target } => {
                tracing::info!(
                    module_id = %module_id,
                    table = %table,
                    target = %target,
                    record_id = %record_id,
                    status = %record.status(),
                    "Routing save to local store"
                );
                self.store.save_record(&target, &record).await?;
                Ok(SaveOutcome::Local {
                    table: target,
                    record,
                })
            }
            RouteDecision::Engine { transactional } => {
                tracing::info!(
                    module_id = %module_id,
                    table = %table,
                    record_id = %record_id,
                    kind = if transactional { "posted transaction" } else { "master data" },
                    "Routing save to engine"
                );
                let payload = record.clone().into_value();
                let response = self
                    .client
                    .execute(&policy.id, action::POST, table, &payload, user)
                    .await?;

                let reconciled = if response.ok && transactional {
                    Some(self.reconciler.reconcile(&policy.id, table, &record, user).await)
                } else {
                    None
                };

                Ok(SaveOutcome::Engine {
                    response,
                    reconciled,
                })
            }
        }
    }
}

//! Module routing policies
//!
//! Loaded from `modules.json`:
//!
//! ```json
//! {"modules": [{"id": "finance", "engine": "remote", "transactional_tables": ["journal"]}]}
//! ```

use serde::{Deserialize, Serialize};
use shared::error::{AppError, AppResult};
use shared::record::Record;
use std::collections::HashMap;
use std::path::Path;

/// Suffix of the local table holding drafts of an engine-managed table
pub const DRAFT_SUFFIX: &str = "_draft";

pub fn draft_table(table: &str) -> String {
    format!("{table}{DRAFT_SUFFIX}")
}

/// Where a module's writes are processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Local,
    Remote,
}

/// Per-module routing policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModulePolicy {
    pub id: String,
    #[serde(default)]
    pub engine: EngineKind,
    /// Tables with a draft/posted lifecycle; anything else is master data
    #[serde(default)]
    pub transactional_tables: Vec<String>,
}

impl ModulePolicy {
    /// Policy of a module unknown to the registry
    pub fn local(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            engine: EngineKind::Local,
            transactional_tables: Vec::new(),
        }
    }

    pub fn is_engine_managed(&self) -> bool {
        self.engine == EngineKind::Remote
    }

    pub fn is_transactional(&self, table: &str) -> bool {
        self.transactional_tables.iter().any(|t| t == table)
    }
}

/// Destination of a single write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Write to the local store under `table`
    Local { table: String },
    /// Dispatch to the engine
    Engine { transactional: bool },
}

/// Routing decision table
///
/// | engine-managed | transactional | status          | destination         |
/// |----------------|---------------|-----------------|---------------------|
/// | no             | any           | any             | local, same table   |
/// | yes            | no            | any             | engine              |
/// | yes            | yes           | draft-like      | local, `<table>_draft` |
/// | yes            | yes           | promoted        | engine              |
pub fn decide(policy: &ModulePolicy, table: &str, record: &Record) -> RouteDecision {
    if !policy.is_engine_managed() {
        return RouteDecision::Local {
            table: table.to_string(),
        };
    }

    let transactional = policy.is_transactional(table);
    if !transactional || record.status().is_promoted() {
        RouteDecision::Engine { transactional }
    } else {
        RouteDecision::Local {
            table: draft_table(table),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ModulesFile {
    #[serde(default)]
    modules: Vec<ModulePolicy>,
}

/// Policies by module id
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, ModulePolicy>,
}

impl ModuleRegistry {
    pub fn new(policies: impl IntoIterator<Item = ModulePolicy>) -> Self {
        Self {
            modules: policies.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    pub fn from_json(json: &str) -> AppResult<Self> {
        let file: ModulesFile = serde_json::from_str(json)
            .map_err(|e| AppError::config(format!("Invalid modules config: {e}")))?;
        Ok(Self::new(file.modules))
    }

    /// Load from disk; a missing file yields an empty registry
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Modules config not found, all modules are local");
            return Ok(Self::default());
        }

        let json = std::fs::read_to_string(path).map_err(|e| {
            AppError::config(format!("Failed to read modules config {}: {e}", path.display()))
        })?;
        let registry = Self::from_json(&json)?;
        tracing::info!(path = %path.display(), modules = registry.len(), "Modules config loaded");
        Ok(registry)
    }

    /// Policy for `module_id`; unknown modules are local-only
    pub fn policy(&self, module_id: &str) -> ModulePolicy {
        self.modules
            .get(module_id)
            .cloned()
            .unwrap_or_else(|| ModulePolicy::local(module_id))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

//! Event journal types
//!
//! Entries are written as one JSON object per line by upstream producers and
//! drained by the archiver. Field names are camelCase on disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Action recorded when the producer did not set one
pub const DEFAULT_ACTION: &str = "module:insert";

/// Branch used when a session carries none
pub const DEFAULT_BRANCH: &str = "default";

/// Domain notification type emitted after a successful promotion
pub const ENTITY_POSTED: &str = "ENTITY_POSTED";

/// Unit of rotation and upload: one journal per (branch, module)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveContext {
    pub branch_id: String,
    pub module_id: String,
}

impl ArchiveContext {
    pub fn new(branch_id: impl Into<String>, module_id: impl Into<String>) -> Self {
        Self {
            branch_id: branch_id.into(),
            module_id: module_id.into(),
        }
    }
}

impl fmt::Display for ArchiveContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.branch_id, self.module_id)
    }
}

/// One journal line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLogEntry {
    /// Globally unique; de-duplication key in the archive
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default = "default_action")]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Value>,
    #[serde(default = "empty_object")]
    pub meta: Value,
    #[serde(default = "empty_object")]
    pub publish_state: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i64>,
}

fn default_action() -> String {
    DEFAULT_ACTION.to_string()
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl EventLogEntry {
    /// New entry stamped with a fresh id and the current time
    pub fn new(context: &ArchiveContext, table: impl Into<String>, action: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            branch_id: Some(context.branch_id.clone()),
            module_id: Some(context.module_id.clone()),
            table: Some(table.into()),
            action: action.into(),
            record: None,
            meta: empty_object(),
            publish_state: empty_object(),
            created_at: Some(now),
            recorded_at: Some(now),
            sequence: None,
        }
    }

    pub fn with_record(mut self, record: impl Into<Value>) -> Self {
        self.record = Some(record.into());
        self
    }

    pub fn with_sequence(mut self, sequence: i64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Branch of the entry, falling back to the segment's context
    pub fn branch_or<'a>(&'a self, context: &'a ArchiveContext) -> &'a str {
        self.branch_id.as_deref().unwrap_or(&context.branch_id)
    }

    /// Module of the entry, falling back to the segment's context
    pub fn module_or<'a>(&'a self, context: &'a ArchiveContext) -> &'a str {
        self.module_id.as_deref().unwrap_or(&context.module_id)
    }
}

//! Record model
//!
//! A record is an ordered map of field name → JSON value. The bridge only
//! interprets a handful of fields (`id`, `status`, the modified markers);
//! everything else is carried through untouched.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Stable identifier field
pub const ID_FIELD: &str = "id";
/// Lifecycle status field on transactional tables
pub const STATUS_FIELD: &str = "status";
/// Last-modified marker fields, in priority order
pub const MODIFIED_FIELDS: [&str; 2] = ["last_update", "updated_at"];

/// A single row, as exchanged with the local store and the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value; only objects are records
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Builder-style field setter
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Record identifier; strings and integers are accepted, empty strings are not
    pub fn id(&self) -> Option<String> {
        match self.0.get(ID_FIELD)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Lifecycle status; missing or non-string means draft
    pub fn status(&self) -> RecordStatus {
        match self.0.get(STATUS_FIELD) {
            Some(Value::String(s)) => RecordStatus::parse(s),
            _ => RecordStatus::Draft,
        }
    }

    /// Last-modified marker in epoch millis (`last_update`, then `updated_at`, else 0)
    pub fn modified_marker(&self) -> i64 {
        MODIFIED_FIELDS
            .iter()
            .filter_map(|field| self.0.get(*field).and_then(parse_marker))
            .find(|marker| *marker != 0)
            .unwrap_or(0)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        record.into_value()
    }
}

fn parse_marker(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.timestamp_millis());
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(dt.and_utc().timestamp_millis());
            }
            s.parse::<i64>().ok()
        }
        _ => None,
    }
}

/// Lifecycle status of a transactional record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordStatus {
    Draft,
    Posted,
    Confirmed,
    Approved,
    /// Any other value; treated as draft-like
    Other(String),
}

impl RecordStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "" | "DRAFT" => Self::Draft,
            "POSTED" => Self::Posted,
            "CONFIRMED" => Self::Confirmed,
            "APPROVED" => Self::Approved,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether the record has left draft state and belongs to the engine
    pub fn is_promoted(&self) -> bool {
        matches!(self, Self::Posted | Self::Confirmed | Self::Approved)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Draft => "DRAFT",
            Self::Posted => "POSTED",
            Self::Confirmed => "CONFIRMED",
            Self::Approved => "APPROVED",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

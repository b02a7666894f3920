//! Error types and response bodies

use super::codes::ErrorCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Detail key carrying the technical cause of a user-facing error
pub const TECHNICAL_DETAIL: &str = "technical";

/// Application error with structured error code and details
///
/// This is the error type surfaced to callers of the bridge, providing:
/// - Standardized error codes via [`ErrorCode`]
/// - Human-readable messages
/// - Optional structured details (the `technical` cause, record ids, ...)
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AppError {
    /// The error code identifying the type of error
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    pub details: Option<HashMap<String, Value>>,
}

impl AppError {
    /// Create a new error with the default message for the error code
    pub fn new(code: ErrorCode) -> Self {
        Self {
            message: code.message().to_string(),
            code,
            details: None,
        }
    }

    /// Create a new error with a custom message
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Add a detail entry to this error
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Attach the technical cause (shown to operators, not end users)
    pub fn with_technical(self, technical: impl Into<String>) -> Self {
        self.with_detail(TECHNICAL_DETAIL, technical.into())
    }

    /// Technical cause, if one was attached
    pub fn technical(&self) -> Option<&str> {
        self.details
            .as_ref()
            .and_then(|d| d.get(TECHNICAL_DETAIL))
            .and_then(Value::as_str)
    }

    /// Structured body for `{ ok: false, error: { ... } }` responses
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code.name().to_string(),
            message: self.message.clone(),
            technical: self.technical().map(str::to_string),
        }
    }

    // ==================== Convenience constructors ====================

    /// Create a required field error
    pub fn required_field(field: impl Into<String>) -> Self {
        let f = field.into();
        Self::with_message(ErrorCode::RequiredField, format!("Missing required field: {f}"))
            .with_detail("field", f)
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InternalError, msg)
    }

    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::DatabaseError, msg)
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::ConfigError, msg)
    }
}

/// Serialized form of an [`AppError`] for callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technical: Option<String>,
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

//! Unified error system for the edge bridge
//!
//! - [`ErrorCode`]: Standardized error codes
//! - [`AppError`]: Rich error type with codes, messages, and details
//! - [`ErrorBody`]: Serialized error shape returned to callers
//!
//! # Example
//!
//! ```
//! use shared::error::{AppError, ErrorCode};
//!
//! let err = AppError::with_message(ErrorCode::EngineUnavailable, "Please try again later")
//!     .with_technical("Circuit breaker is open");
//!
//! assert_eq!(err.body().code, "ENGINE_UNAVAILABLE");
//! ```

mod codes;
mod types;

pub use codes::{ErrorCode, InvalidErrorCode};
pub use types::{AppError, AppResult, ErrorBody, TECHNICAL_DETAIL};

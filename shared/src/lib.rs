//! Shared types for the edge bridge
//!
//! Types exchanged between the bridge, the local store, the engine and the
//! event archiver: records, RPC shapes, journal entries and the error system.

pub mod engine;
pub mod error;
pub mod event;
pub mod record;
pub mod util;

// Re-exports
pub use engine::{EngineResponse, RpcContext, RpcRequest, UserContext};
pub use error::{AppError, AppResult, ErrorBody, ErrorCode};
pub use event::{ArchiveContext, EventLogEntry};
pub use record::{Record, RecordStatus};
pub use serde::{Deserialize, Serialize};

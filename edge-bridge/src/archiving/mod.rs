//! Event Archiving
//!
//! Local event journals are rotated per (branch, module) context and the
//! closed segments are uploaded into the durable archive store.
//!
//! # 流程
//!
//! ```text
//! NO_SEGMENT ──append──▶ OPEN ──rotate──▶ CLOSED ──upload──▶ UPLOADED (discarded)
//! ```
//!
//! - [`FileEventLog`] - on-disk journal segments
//! - [`PgArchiveStore`] - Postgres archive store
//! - [`upload_segment`] - transactional, idempotent upload of one segment
//! - [`ArchiveScheduler`] - periodic rotate + upload cycle

pub mod event_log;
pub mod scheduler;
pub mod store;
pub mod uploader;

pub use event_log::{EventLog, FileEventLog};
pub use scheduler::{ArchiveConfig, ArchiveScheduler, CycleReport};
pub use store::{ArchiveStore, PgArchiveStore};
pub use uploader::{UploadOutcome, upload_segment};

use shared::error::{AppError, ErrorCode};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Archive error types
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid archive context component: {0:?}")]
    InvalidContext(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Archive store error: {0}")]
    Store(String),
}

impl ArchiveError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> ArchiveError + '_ {
        move |source| ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<sqlx::Error> for ArchiveError {
    fn from(err: sqlx::Error) -> Self {
        ArchiveError::Store(err.to_string())
    }
}

impl From<ArchiveError> for AppError {
    fn from(err: ArchiveError) -> Self {
        AppError::with_message(ErrorCode::ArchiveFailed, err.to_string())
    }
}

/// Result type for archive operations
pub type ArchiveResult<T> = Result<T, ArchiveError>;

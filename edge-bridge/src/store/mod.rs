//! Local Store
//!
//! Draft copies, local-only modules and the failed-post ledger all live in the
//! local store. The bridge only needs four primitives from it plus a listing
//! used for inspection.

pub mod failed_posts;
pub mod sqlite;

pub use failed_posts::{FAILED_POSTS_TABLE, FailedPostLedger, PENDING};
pub use sqlite::SqliteLocalStore;

use async_trait::async_trait;
use shared::error::{AppError, ErrorCode};
use shared::record::Record;
use thiserror::Error;

/// Local store error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Duplicate: {table}/{id}")]
    Duplicate { table: String, id: String },

    #[error("Record in {0} has no id")]
    MissingId(String),

    #[error("Corrupt record {table}/{id}: {reason}")]
    Corrupt {
        table: String,
        id: String,
        reason: String,
    },

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MissingId(_) => AppError::required_field(shared::record::ID_FIELD),
            StoreError::Duplicate { .. } => {
                AppError::with_message(ErrorCode::AlreadyExists, err.to_string())
            }
            other => AppError::database(other.to_string()),
        }
    }
}

/// Result type for local store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Local store collaborator
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get_record(&self, table: &str, id: &str) -> StoreResult<Option<Record>>;

    /// Insert or replace by id
    async fn save_record(&self, table: &str, record: &Record) -> StoreResult<()>;

    /// Returns whether a row was removed
    async fn delete_record(&self, table: &str, id: &str) -> StoreResult<bool>;

    /// Insert only; fails with [`StoreError::Duplicate`] if the id exists
    async fn insert(&self, table: &str, record: &Record) -> StoreResult<()>;

    async fn list_records(&self, table: &str) -> StoreResult<Vec<Record>>;
}

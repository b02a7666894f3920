//! SQLite local store
//!
//! All logical tables share one physical table keyed by `(table_name, id)`;
//! the record itself is stored as a JSON document.

use super::{LocalStore, StoreError, StoreResult};
use async_trait::async_trait;
use shared::record::Record;
use shared::util::now_millis;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS local_records (
    table_name TEXT NOT NULL,
    id TEXT NOT NULL,
    data TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (table_name, id)
)";

/// Local store backed by a SQLite pool
#[derive(Clone)]
pub struct SqliteLocalStore {
    pool: SqlitePool,
}

impl SqliteLocalStore {
    /// Open (or create) the database file with WAL and normal sync
    pub async fn open(db_path: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))
            .map_err(|e| StoreError::Database(format!("Invalid database path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        tracing::info!(path = %db_path, "Local store opened (SQLite WAL)");
        Self::with_pool(pool).await
    }

    /// Wrap an existing pool, creating the schema if needed
    pub async fn with_pool(pool: SqlitePool) -> StoreResult<Self> {
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn record_id(table: &str, record: &Record) -> StoreResult<String> {
    record
        .id()
        .ok_or_else(|| StoreError::MissingId(table.to_string()))
}

fn encode(table: &str, record: &Record) -> StoreResult<String> {
    serde_json::to_string(record).map_err(|e| StoreError::Corrupt {
        table: table.to_string(),
        id: record.id().unwrap_or_default(),
        reason: e.to_string(),
    })
}

fn decode(table: &str, id: &str, data: &str) -> StoreResult<Record> {
    let corrupt = |reason: String| StoreError::Corrupt {
        table: table.to_string(),
        id: id.to_string(),
        reason,
    };
    let value: serde_json::Value = serde_json::from_str(data).map_err(|e| corrupt(e.to_string()))?;
    Record::from_value(value).ok_or_else(|| corrupt("not a JSON object".into()))
}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn get_record(&self, table: &str, id: &str) -> StoreResult<Option<Record>> {
        let row = sqlx::query("SELECT data FROM local_records WHERE table_name = ? AND id = ?")
            .bind(table)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let data: String = row.try_get("data")?;
                decode(table, id, &data).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn save_record(&self, table: &str, record: &Record) -> StoreResult<()> {
        let id = record_id(table, record)?;
        let data = encode(table, record)?;

        sqlx::query(
            "INSERT INTO local_records (table_name, id, data, updated_at) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(table_name, id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
        )
        .bind(table)
        .bind(&id)
        .bind(&data)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_record(&self, table: &str, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM local_records WHERE table_name = ? AND id = ?")
            .bind(table)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert(&self, table: &str, record: &Record) -> StoreResult<()> {
        let id = record_id(table, record)?;
        let data = encode(table, record)?;

        let result = sqlx::query(
            "INSERT INTO local_records (table_name, id, data, updated_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(table)
        .bind(&id)
        .bind(&data)
        .bind(now_millis())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(StoreError::Duplicate {
                table: table.to_string(),
                id,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_records(&self, table: &str) -> StoreResult<Vec<Record>> {
        let rows = sqlx::query("SELECT id, data FROM local_records WHERE table_name = ? ORDER BY rowid")
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                let data: String = row.try_get("data")?;
                decode(table, &id, &data)
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// In-memory store; a single connection so every query sees the same database
    pub(crate) async fn memory_store() -> SqliteLocalStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteLocalStore::with_pool(pool).await.unwrap()
    }

    #[tokio::test]
    async fn test_save_get_delete() {
        let store = memory_store().await;
        let record = Record::new().with("id", "inv-1").with("amount", 10);

        store.save_record("invoices_draft", &record).await.unwrap();
        let loaded = store.get_record("invoices_draft", "inv-1").await.unwrap();
        assert_eq!(loaded, Some(record));

        // Same id in another logical table is a different row
        assert!(store.get_record("invoices", "inv-1").await.unwrap().is_none());

        assert!(store.delete_record("invoices_draft", "inv-1").await.unwrap());
        assert!(!store.delete_record("invoices_draft", "inv-1").await.unwrap());
        assert!(store.get_record("invoices_draft", "inv-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_upserts() {
        let store = memory_store().await;
        store
            .save_record("items", &Record::new().with("id", "a").with("qty", 1))
            .await
            .unwrap();
        store
            .save_record("items", &Record::new().with("id", "a").with("qty", 2))
            .await
            .unwrap();

        let all = store.list_records("items").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].get("qty"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate() {
        let store = memory_store().await;
        let record = Record::new().with("id", "n-1");
        store.insert("notifications", &record).await.unwrap();

        let err = store.insert("notifications", &record).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { ref id, .. } if id == "n-1"));
    }

    #[tokio::test]
    async fn test_missing_id_rejected() {
        let store = memory_store().await;
        let err = store
            .save_record("items", &Record::new().with("name", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingId(_)));
    }

    #[tokio::test]
    async fn test_list_keeps_insertion_order() {
        let store = memory_store().await;
        for id in ["c", "a", "b"] {
            store.insert("log", &Record::new().with("id", id)).await.unwrap();
        }
        let ids: Vec<String> = store
            .list_records("log")
            .await
            .unwrap()
            .iter()
            .filter_map(Record::id)
            .collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }
}

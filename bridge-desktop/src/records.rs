//! Cloud record store using SQLite

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    records::{CloudRecord, CloudRecordStore},
};
use serde_json::{Map, Value};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    Row,
};
use std::path::PathBuf;
use tracing::{debug, warn};

const CREATE_RECORDS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        container_id TEXT NOT NULL,
        record_type TEXT NOT NULL,
        fields TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
"#;

/// SQLite-backed stand-in for a container's private cloud database
///
/// Every container id gets its own logical database; records are append-only
/// like `CKDatabase.save` of a freshly created `CKRecord`.
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Open (or create) a record store at the given database path
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| BridgeError::RecordStore(format!("Failed to connect to DB: {}", e)))?;

        Self::init(&pool).await?;
        debug!(path = ?db_path, "Initialized record store");

        Ok(Self { pool })
    }

    /// Create an in-memory record store (for testing)
    pub async fn in_memory() -> Result<Self> {
        // A single connection keeps every query on the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| BridgeError::RecordStore(format!("Failed to connect to DB: {}", e)))?;

        Self::init(&pool).await?;
        Ok(Self { pool })
    }

    async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(CREATE_RECORDS_TABLE)
            .execute(pool)
            .await
            .map_err(|e| BridgeError::RecordStore(format!("Failed to create table: {}", e)))?;
        Ok(())
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

#[async_trait]
impl CloudRecordStore for SqliteRecordStore {
    async fn query_records(
        &self,
        container_id: &str,
        record_type: &str,
    ) -> Result<Vec<CloudRecord>> {
        let rows = sqlx::query(
            "SELECT fields FROM records WHERE container_id = ? AND record_type = ? ORDER BY id",
        )
        .bind(container_id)
        .bind(record_type)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BridgeError::RecordStore(format!("Failed to query records: {}", e)))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: String = row.get(0);
            match serde_json::from_str::<Map<String, Value>>(&raw) {
                Ok(fields) => records.push(CloudRecord {
                    record_type: record_type.to_string(),
                    fields,
                }),
                Err(e) => warn!(error = %e, "Skipping record with unreadable fields"),
            }
        }

        debug!(container_id, record_type, count = records.len(), "Queried records");
        Ok(records)
    }

    async fn save_record(&self, container_id: &str, record: CloudRecord) -> Result<CloudRecord> {
        let fields = serde_json::to_string(&record.fields)
            .map_err(|e| BridgeError::RecordStore(format!("Failed to encode record: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO records (container_id, record_type, fields, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(container_id)
        .bind(&record.record_type)
        .bind(fields)
        .bind(Self::now())
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::RecordStore(format!("Failed to save record: {}", e)))?;

        debug!(container_id, record_type = %record.record_type, "Saved record");
        Ok(record)
    }
}

//! SQLite record store.

use super::RecordStore;
use crate::error::StoreError;
use async_trait::async_trait;
use relief_sync_types::{OriginId, Record, RecordId, Timestamp};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// SQLite-based record storage.
///
/// Uses WAL mode so display reads run alongside ingestion.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a store at `path`.
    pub async fn new(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(StoreError::Database)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(StoreError::Database)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(StoreError::Database)?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id BLOB PRIMARY KEY,
                origin TEXT NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                battery_level TEXT NOT NULL,
                battery_state TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_records_origin_timestamp ON records(origin, timestamp)",
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn get(&self, id: &RecordId) -> Result<Option<Record>, StoreError> {
        let row = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT id, origin, latitude, longitude, battery_level, battery_state, timestamp
            FROM records
            WHERE id = ?1
            "#,
        )
        .bind(id.as_bytes())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        row.map(Record::try_from).transpose()
    }

    async fn insert_if_absent(&self, record: &Record) -> Result<bool, StoreError> {
        let timestamp = i64::try_from(record.timestamp.as_millis()).map_err(|_| {
            StoreError::Corrupt {
                reason: format!("timestamp out of range: {}", record.timestamp),
            }
        })?;

        // The primary key is the identity check; an existing row wins.
        let mut tx = self.pool.begin().await.map_err(StoreError::Database)?;

        let result = sqlx::query(
            r#"
            INSERT INTO records (id, origin, latitude, longitude, battery_level, battery_state, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(record.id.as_bytes())
        .bind(record.origin.as_str())
        .bind(record.latitude)
        .bind(record.longitude)
        .bind(&record.battery_level)
        .bind(&record.battery_state)
        .bind(timestamp)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::Database)?;

        tx.commit().await.map_err(StoreError::Database)?;
        Ok(result.rows_affected() == 1)
    }

    async fn scan_all(&self) -> Result<Vec<Record>, StoreError> {
        let rows = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT id, origin, latitude, longitude, battery_level, battery_state, timestamp
            FROM records
            ORDER BY origin, timestamp
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        rows.into_iter().map(Record::try_from).collect()
    }

    async fn scan_origin(&self, origin: &OriginId) -> Result<Vec<Record>, StoreError> {
        let rows = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT id, origin, latitude, longitude, battery_level, battery_state, timestamp
            FROM records
            WHERE origin = ?1
            ORDER BY timestamp
            "#,
        )
        .bind(origin.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        rows.into_iter().map(Record::try_from).collect()
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        Ok(count as u64)
    }
}

/// Internal row type for SQLite queries.
#[derive(sqlx::FromRow)]
struct RecordRow {
    id: Vec<u8>,
    origin: String,
    latitude: f64,
    longitude: f64,
    battery_level: String,
    battery_state: String,
    timestamp: i64,
}

impl TryFrom<RecordRow> for Record {
    type Error = StoreError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let id = RecordId::from_bytes(&row.id).ok_or_else(|| StoreError::Corrupt {
            reason: format!("invalid record id of {} bytes", row.id.len()),
        })?;
        let timestamp = u64::try_from(row.timestamp).map_err(|_| StoreError::Corrupt {
            reason: format!("negative timestamp {} for {id}", row.timestamp),
        })?;

        Ok(Record {
            id,
            origin: OriginId::new(row.origin),
            latitude: row.latitude,
            longitude: row.longitude,
            battery_level: row.battery_level,
            battery_state: row.battery_state,
            timestamp: Timestamp::from_millis(timestamp),
        })
    }
}

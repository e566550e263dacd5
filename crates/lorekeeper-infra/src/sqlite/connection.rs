//! SQLite connection store implementation.
//!
//! Implements `ConnectionStore` from `lorekeeper-core`. Timestamps are stored
//! as epoch seconds; expired rows are invisible to lookups even before the
//! sweeper purges them.

use chrono::{DateTime, Utc};
use sqlx::Row;

use lorekeeper_core::connection::ConnectionStore;
use lorekeeper_types::connection::ConnectionRecord;
use lorekeeper_types::error::RepositoryError;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ConnectionStore`.
pub struct SqliteConnectionStore {
    pool: DatabasePool,
}

impl SqliteConnectionStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct ConnectionRow {
    connection_id: String,
    user_id: String,
    established_at: i64,
    expires_at: i64,
}

impl ConnectionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            connection_id: row.try_get("connection_id")?,
            user_id: row.try_get("user_id")?,
            established_at: row.try_get("established_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }

    fn into_record(self) -> Result<ConnectionRecord, RepositoryError> {
        Ok(ConnectionRecord {
            connection_id: self.connection_id,
            user_id: self.user_id,
            established_at: from_epoch(self.established_at)?,
            expires_at: from_epoch(self.expires_at)?,
        })
    }
}

fn from_epoch(secs: i64) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| RepositoryError::Query(format!("invalid epoch timestamp: {secs}")))
}

impl ConnectionStore for SqliteConnectionStore {
    async fn put(&self, record: &ConnectionRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO connections (connection_id, user_id, established_at, expires_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(connection_id) DO UPDATE SET
                   user_id = excluded.user_id,
                   established_at = excluded.established_at,
                   expires_at = excluded.expires_at"#,
        )
        .bind(&record.connection_id)
        .bind(&record.user_id)
        .bind(record.established_at.timestamp())
        .bind(record.expires_at.timestamp())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, connection_id: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM connections WHERE connection_id = ?")
            .bind(connection_id)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, connection_id: &str) -> Result<Option<ConnectionRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM connections WHERE connection_id = ?")
            .bind(connection_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let row =
                    ConnectionRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(row.into_record()?))
            }
            None => Ok(None),
        }
    }

    async fn lookup_by_user(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT connection_id FROM connections WHERE user_id = ? AND expires_at > ? ORDER BY established_at",
        )
        .bind(user_id)
        .bind(now.timestamp())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("connection_id")
                    .map_err(|e| RepositoryError::Query(e.to_string()))
            })
            .collect()
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM connections WHERE expires_at <= ?")
            .bind(now.timestamp())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

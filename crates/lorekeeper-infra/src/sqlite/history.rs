//! SQLite chat history implementation.
//!
//! Implements `ChatHistoryStore` from `lorekeeper-core`. Each session is one
//! row whose `history` column holds the JSON array of turns; appends are a
//! read-modify-write inside a single writer transaction.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use sqlx::Row;

use lorekeeper_core::chat::history::ChatHistoryStore;
use lorekeeper_types::chat::{SessionSummary, Turn, session_preview};
use lorekeeper_types::error::RepositoryError;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ChatHistoryStore`.
pub struct SqliteChatHistory {
    pool: DatabasePool,
}

impl SqliteChatHistory {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn decode_history(raw: &str) -> Result<Vec<Turn>, RepositoryError> {
    serde_json::from_str(raw)
        .map_err(|e| RepositoryError::Query(format!("invalid history JSON: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

// ---------------------------------------------------------------------------
// ChatHistoryStore implementation
// ---------------------------------------------------------------------------

impl ChatHistoryStore for SqliteChatHistory {
    async fn load(&self, session_id: &str) -> Result<Vec<Turn>, RepositoryError> {
        let row = sqlx::query("SELECT history FROM chat_history WHERE session_id = ? AND expire_at > ?")
            .bind(session_id)
            .bind(Utc::now().timestamp())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let raw: String = row
                    .try_get("history")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                decode_history(&raw)
            }
            None => Ok(Vec::new()),
        }
    }

    async fn append(
        &self,
        session_id: &str,
        user_id: &str,
        turns: &[Turn],
        ttl_secs: i64,
    ) -> Result<(), RepositoryError> {
        let now = Utc::now();
        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let existing = sqlx::query("SELECT user_id, history, expire_at FROM chat_history WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut history = match existing {
            Some(row) => {
                let owner: String = row
                    .try_get("user_id")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                if owner != user_id {
                    return Err(RepositoryError::Conflict(format!(
                        "session '{session_id}' is owned by another user"
                    )));
                }
                let expire_at: i64 = row
                    .try_get("expire_at")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                if expire_at > now.timestamp() {
                    let raw: String = row
                        .try_get("history")
                        .map_err(|e| RepositoryError::Query(e.to_string()))?;
                    decode_history(&raw)?
                } else {
                    Vec::new()
                }
            }
            None => Vec::new(),
        };

        history.extend(turns.iter().filter(|t| !t.content.trim().is_empty()).cloned());
        let encoded =
            serde_json::to_string(&history).map_err(|e| RepositoryError::Query(e.to_string()))?;
        let expire_at = (now + Duration::seconds(ttl_secs)).timestamp();

        sqlx::query(
            r#"INSERT INTO chat_history (session_id, user_id, history, expire_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(session_id) DO UPDATE SET
                   history = excluded.history,
                   expire_at = excluded.expire_at,
                   updated_at = excluded.updated_at"#,
        )
        .bind(session_id)
        .bind(user_id)
        .bind(encoded)
        .bind(expire_at)
        .bind(now.to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        tracing::debug!(session_id, turns = history.len(), expire_at, "chat history appended");
        Ok(())
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT session_id, history, updated_at FROM chat_history
               WHERE user_id = ? AND expire_at > ?
               ORDER BY updated_at DESC"#,
        )
        .bind(user_id)
        .bind(Utc::now().timestamp())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            let session_id: String = row
                .try_get("session_id")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            let raw: String = row
                .try_get("history")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            let updated_at: String = row
                .try_get("updated_at")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;

            let turns = decode_history(&raw)?;
            sessions.push(SessionSummary {
                session_id,
                message_count: turns.len(),
                updated_at: parse_datetime(&updated_at)?,
                preview: session_preview(&turns),
            });
        }

        Ok(sessions)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM chat_history WHERE expire_at <= ?")
            .bind(now.timestamp())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

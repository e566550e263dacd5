//! ChatHistoryStore trait definition.
//!
//! One record per session holds its ordered turns. Every append refreshes
//! the record's expiry, so a session lives for the TTL after its last turn.

use chrono::{DateTime, Utc};
use lorekeeper_types::chat::{SessionSummary, Turn};
use lorekeeper_types::error::RepositoryError;

/// Persistence port for session chat logs.
///
/// Implementations live in lorekeeper-infra (e.g., `SqliteChatHistory`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait ChatHistoryStore: Send + Sync {
    /// All turns of a session, oldest first. Empty for unknown or expired sessions.
    fn load(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Turn>, RepositoryError>> + Send;

    /// Append turns atomically and push the expiry to `now + ttl_secs`.
    fn append(
        &self,
        session_id: &str,
        user_id: &str,
        turns: &[Turn],
        ttl_secs: i64,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Live sessions of a user, most recently updated first.
    fn list_sessions(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<SessionSummary>, RepositoryError>> + Send;

    /// Drop session records whose expiry is at or before `now`.
    fn purge_expired(
        &self,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}

impl<T: ChatHistoryStore> ChatHistoryStore for std::sync::Arc<T> {
    async fn load(&self, session_id: &str) -> Result<Vec<Turn>, RepositoryError> {
        self.as_ref().load(session_id).await
    }

    async fn append(
        &self,
        session_id: &str,
        user_id: &str,
        turns: &[Turn],
        ttl_secs: i64,
    ) -> Result<(), RepositoryError> {
        self.as_ref().append(session_id, user_id, turns, ttl_secs).await
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>, RepositoryError> {
        self.as_ref().list_sessions(user_id).await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        self.as_ref().purge_expired(now).await
    }
}

//! ConnectionStore trait definition.
//!
//! Records are keyed by the transport-assigned connection id and
//! secondarily indexed by user id. Implementations live in lorekeeper-infra.

use chrono::{DateTime, Utc};
use lorekeeper_types::connection::ConnectionRecord;
use lorekeeper_types::error::RepositoryError;

/// Persistence port for active connections.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait ConnectionStore: Send + Sync {
    /// Insert or overwrite the record for `record.connection_id`.
    fn put(
        &self,
        record: &ConnectionRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete the record for `connection_id`. Returns whether one existed.
    fn delete(
        &self,
        connection_id: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    fn get(
        &self,
        connection_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<ConnectionRecord>, RepositoryError>> + Send;

    /// Connection ids of `user_id` that are neither deleted nor expired at `now`.
    fn lookup_by_user(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Vec<String>, RepositoryError>> + Send;

    /// Remove every record whose expiry is at or before `now`. Returns the count removed.
    fn purge_expired(
        &self,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}

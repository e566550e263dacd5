//! Connect/disconnect bookkeeping.
//!
//! Runs after the transport has already accepted or closed a socket, so a
//! failure here never changes that decision. Writes are retried once; a
//! second failure surfaces as [`LifecycleError::StoreWrite`].

use chrono::Utc;
use tracing::{debug, info, warn};

use lorekeeper_types::connection::{ConnectionRecord, DEFAULT_CONNECTION_TTL_SECS};
use lorekeeper_types::error::RepositoryError;

use super::store::ConnectionStore;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("connection store write failed after retry: {0}")]
    StoreWrite(#[source] RepositoryError),

    #[error("connection store read failed: {0}")]
    StoreRead(#[source] RepositoryError),
}

/// Tracks live connections in a [`ConnectionStore`].
pub struct ConnectionLifecycle<C: ConnectionStore> {
    store: C,
    ttl_secs: i64,
}

impl<C: ConnectionStore> ConnectionLifecycle<C> {
    pub fn new(store: C) -> Self {
        Self {
            store,
            ttl_secs: DEFAULT_CONNECTION_TTL_SECS,
        }
    }

    pub fn with_ttl_secs(mut self, ttl_secs: i64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    pub fn store(&self) -> &C {
        &self.store
    }

    /// Record a newly established connection. A record with the same id is
    /// overwritten.
    pub async fn on_connect(
        &self,
        connection_id: &str,
        user_id: &str,
    ) -> Result<ConnectionRecord, LifecycleError> {
        let record = ConnectionRecord::new(connection_id, user_id, Utc::now(), self.ttl_secs);

        if let Err(err) = self.store.put(&record).await {
            warn!(connection_id, error = %err, "connection record write failed, retrying once");
            self.store
                .put(&record)
                .await
                .map_err(LifecycleError::StoreWrite)?;
        }

        info!(
            connection_id,
            user_id,
            expires_at = %record.expires_at,
            "connection recorded"
        );
        Ok(record)
    }

    /// Forget a connection. An unknown id is not an error.
    pub async fn on_disconnect(&self, connection_id: &str) -> Result<(), LifecycleError> {
        let existed = match self.store.delete(connection_id).await {
            Ok(existed) => existed,
            Err(err) => {
                warn!(connection_id, error = %err, "connection record delete failed, retrying once");
                self.store
                    .delete(connection_id)
                    .await
                    .map_err(LifecycleError::StoreWrite)?
            }
        };

        if existed {
            info!(connection_id, "connection record removed");
        } else {
            debug!(connection_id, "disconnect for unknown connection");
        }
        Ok(())
    }

    /// Live connection ids of a user.
    pub async fn lookup_by_user(&self, user_id: &str) -> Result<Vec<String>, LifecycleError> {
        self.store
            .lookup_by_user(user_id, Utc::now())
            .await
            .map_err(LifecycleError::StoreRead)
    }

    /// Passive TTL sweep.
    pub async fn purge_expired(&self) -> Result<u64, LifecycleError> {
        let removed = self
            .store
            .purge_expired(Utc::now())
            .await
            .map_err(LifecycleError::StoreWrite)?;
        if removed > 0 {
            debug!(removed, "expired connection records purged");
        }
        Ok(removed)
    }
}

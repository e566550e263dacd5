//! Active connection records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default lifetime of a connection record when no disconnect is observed.
pub const DEFAULT_CONNECTION_TTL_SECS: i64 = 7200;

/// A live client connection, keyed by the transport-assigned id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub connection_id: String,
    pub user_id: String,
    pub established_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ConnectionRecord {
    /// Build a record established at `now` that expires `ttl_secs` later.
    ///
    /// Timestamps are truncated to whole seconds so the stored epoch values
    /// keep `expires_at - established_at == ttl_secs` exactly.
    pub fn new(
        connection_id: impl Into<String>,
        user_id: impl Into<String>,
        now: DateTime<Utc>,
        ttl_secs: i64,
    ) -> Self {
        let established_at = DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now);
        Self {
            connection_id: connection_id.into(),
            user_id: user_id.into(),
            established_at,
            expires_at: established_at + Duration::seconds(ttl_secs),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_is_exactly_ttl_after_establishment() {
        let now = Utc::now();
        let record = ConnectionRecord::new("c1", "u1", now, DEFAULT_CONNECTION_TTL_SECS);
        assert_eq!(
            (record.expires_at - record.established_at).num_seconds(),
            7200
        );
        assert_eq!(record.established_at.timestamp(), now.timestamp());
    }

    #[test]
    fn test_is_expired() {
        let now = Utc::now();
        let record = ConnectionRecord::new("c1", "u1", now, 60);
        assert!(!record.is_expired(now));
        assert!(record.is_expired(now + Duration::seconds(61)));
    }
}

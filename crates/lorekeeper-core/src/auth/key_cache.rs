//! Process-wide cache of the credential issuer's public key set.
//!
//! The cache is populated on first use and refreshed when a token names a
//! key id it does not contain. Refreshes are single-flight: concurrent
//! verifiers that miss on the same rotation wait on one fetch instead of
//! each hitting the issuer.

use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{Jwk, JwkSet};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Errors from fetching the issuer key set.
#[derive(Debug, thiserror::Error)]
pub enum KeySetError {
    #[error("key set fetch failed: {0}")]
    Fetch(String),

    #[error("key set malformed: {0}")]
    Malformed(String),
}

/// Where key sets come from (an HTTPS JWKS endpoint in production).
pub trait KeySetSource: Send + Sync {
    fn fetch(&self) -> impl std::future::Future<Output = Result<JwkSet, KeySetError>> + Send;
}

impl<T: KeySetSource> KeySetSource for std::sync::Arc<T> {
    async fn fetch(&self) -> Result<JwkSet, KeySetError> {
        self.as_ref().fetch().await
    }
}

struct Snapshot {
    keys: JwkSet,
    fetched_at: Instant,
}

/// Explicit, injectable key-set cache shared by every verifier.
pub struct KeySetCache<S: KeySetSource> {
    source: S,
    current: RwLock<Option<Snapshot>>,
    refresh_lock: Mutex<()>,
    cooldown: Duration,
}

impl<S: KeySetSource> KeySetCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            cooldown: Duration::ZERO,
        }
    }

    /// Minimum age of the cached set before an unknown key id may trigger
    /// another fetch. The first population ignores it.
    pub fn with_refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Look up the key with id `kid`.
    ///
    /// Returns `Ok(None)` when the key is still unknown after at most one
    /// refresh.
    pub async fn key_for(&self, kid: &str) -> Result<Option<Jwk>, KeySetError> {
        let cached = self
            .current
            .read()
            .await
            .as_ref()
            .and_then(|snapshot| snapshot.keys.find(kid).cloned());
        if cached.is_some() {
            return Ok(cached);
        }

        self.refresh_for(kid).await
    }

    async fn refresh_for(&self, kid: &str) -> Result<Option<Jwk>, KeySetError> {
        let _guard = self.refresh_lock.lock().await;

        // Another task may have refreshed while we waited for the lock.
        if let Some(snapshot) = self.current.read().await.as_ref() {
            if let Some(jwk) = snapshot.keys.find(kid) {
                return Ok(Some(jwk.clone()));
            }
            if snapshot.fetched_at.elapsed() < self.cooldown {
                debug!(kid, "key id unknown, key set refreshed too recently to fetch again");
                return Ok(None);
            }
        }

        let keys = self.fetch_with_retry().await?;
        debug!(kid, key_count = keys.keys.len(), "issuer key set refreshed");
        let found = keys.find(kid).cloned();
        *self.current.write().await = Some(Snapshot {
            keys,
            fetched_at: Instant::now(),
        });
        Ok(found)
    }

    async fn fetch_with_retry(&self) -> Result<JwkSet, KeySetError> {
        match self.source.fetch().await {
            Ok(keys) => Ok(keys),
            Err(err) => {
                warn!(error = %err, "key set fetch failed, retrying once");
                self.source.fetch().await
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Shared secret behind the `oct` test keys, and its base64url form.
    pub const TEST_SECRET: &[u8] = b"lorekeeper-signing-key-for-tests-";
    pub const TEST_SECRET_B64: &str = "bG9yZWtlZXBlci1zaWduaW5nLWtleS1mb3ItdGVzdHMt";

    pub fn oct_key_set(kids: &[&str]) -> JwkSet {
        let keys: Vec<_> = kids
            .iter()
            .map(|kid| serde_json::json!({"kty": "oct", "kid": kid, "k": TEST_SECRET_B64}))
            .collect();
        serde_json::from_value(serde_json::json!({ "keys": keys })).unwrap()
    }

    /// Serves queued key sets in order; repeats the last one when drained.
    pub struct ScriptedKeySource {
        responses: Mutex<VecDeque<Result<JwkSet, String>>>,
        last: Mutex<Option<JwkSet>>,
        pub calls: AtomicUsize,
    }

    impl ScriptedKeySource {
        pub fn new(responses: Vec<Result<JwkSet, String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                last: Mutex::new(None),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl KeySetSource for ScriptedKeySource {
        async fn fetch(&self) -> Result<JwkSet, KeySetError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.responses.lock().unwrap().pop_front();
            match next {
                Some(Ok(keys)) => {
                    *self.last.lock().unwrap() = Some(keys.clone());
                    Ok(keys)
                }
                Some(Err(message)) => Err(KeySetError::Fetch(message)),
                None => self
                    .last
                    .lock()
                    .unwrap()
                    .clone()
                    .ok_or_else(|| KeySetError::Fetch("no key set scripted".to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn populates_on_first_use_and_then_serves_from_memory() {
        let source = Arc::new(ScriptedKeySource::new(vec![Ok(oct_key_set(&["k1"]))]));
        let cache = KeySetCache::new(source.clone());

        assert!(cache.key_for("k1").await.unwrap().is_some());
        assert!(cache.key_for("k1").await.unwrap().is_some());
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn unknown_kid_refreshes_once_and_picks_up_rotated_key() {
        let source = Arc::new(ScriptedKeySource::new(vec![
            Ok(oct_key_set(&["k1"])),
            Ok(oct_key_set(&["k1", "k2"])),
        ]));
        let cache = KeySetCache::new(source.clone());

        cache.key_for("k1").await.unwrap();
        assert!(cache.key_for("k2").await.unwrap().is_some());
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test]
    async fn still_unknown_after_refresh_returns_none() {
        let source = Arc::new(ScriptedKeySource::new(vec![Ok(oct_key_set(&["k1"]))]));
        let cache = KeySetCache::new(source.clone());

        assert!(cache.key_for("nope").await.unwrap().is_none());
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn cooldown_suppresses_repeat_refresh() {
        let source = Arc::new(ScriptedKeySource::new(vec![Ok(oct_key_set(&["k1"]))]));
        let cache =
            KeySetCache::new(source.clone()).with_refresh_cooldown(Duration::from_secs(60));

        cache.key_for("k1").await.unwrap();
        assert!(cache.key_for("ghost").await.unwrap().is_none());
        assert!(cache.key_for("ghost").await.unwrap().is_none());
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn fetch_failure_is_retried_once() {
        let source = Arc::new(ScriptedKeySource::new(vec![
            Err("connection reset".to_string()),
            Ok(oct_key_set(&["k1"])),
        ]));
        let cache = KeySetCache::new(source.clone());

        assert!(cache.key_for("k1").await.unwrap().is_some());
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test]
    async fn two_consecutive_failures_surface_error() {
        let source = Arc::new(ScriptedKeySource::new(vec![
            Err("down".to_string()),
            Err("still down".to_string()),
        ]));
        let cache = KeySetCache::new(source.clone());

        assert!(cache.key_for("k1").await.is_err());
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_fetch() {
        let source = Arc::new(ScriptedKeySource::new(vec![Ok(oct_key_set(&["k1"]))]));
        let cache = Arc::new(KeySetCache::new(source.clone()).with_refresh_cooldown(Duration::from_secs(60)));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.key_for("k1").await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_some());
        }
        assert_eq!(source.call_count(), 1);
    }
}

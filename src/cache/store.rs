//! Session store implementations.
//!
//! The trait is async so a networked backend (e.g. Redis) can implement it;
//! the bundled implementation keeps entries in process memory with lazy
//! expiry on access.

use async_trait::async_trait;
use dashmap::DashMap;
use metrics::counter;
use thiserror::Error;
use time::{Duration, OffsetDateTime};

const METRIC_STORE_HIT_TOTAL: &str = "scorcio_store_hit_total";
const METRIC_STORE_MISS_TOTAL: &str = "scorcio_store_miss_total";
const METRIC_STORE_EXPIRED_TOTAL: &str = "scorcio_store_expired_total";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(message: impl std::fmt::Display) -> Self {
        Self::Backend(message.to_string())
    }
}

/// Key/value store for serialized preview sessions.
///
/// Values are opaque strings keyed by session token. Entries older than the
/// TTL they were saved with behave as missing. Last write wins; there is no
/// versioning and no cross-key coordination.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    /// Fetch the value under `key`. `Ok(None)` signals a missing or expired
    /// entry; callers decide whether that is an error.
    async fn fetch(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn contains(&self, key: &str) -> Result<bool, StoreError>;

    /// Remove the entry under `key`. Removing a missing key is a no-op.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

struct StoredEntry {
    value: String,
    expires_at: OffsetDateTime,
}

impl StoredEntry {
    fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

/// In-process [`SessionStore`] backed by a concurrent map.
///
/// Expiry is lazy: an expired entry is dropped the first time it is looked
/// up after its deadline. Safe for concurrent key-disjoint access.
#[derive(Default)]
pub struct InMemorySessionStore {
    entries: DashMap<String, StoredEntry>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop an entry if its deadline has passed. Returns whether a live
    /// entry remains under `key`.
    fn evict_if_expired(&self, key: &str) -> bool {
        let now = OffsetDateTime::now_utc();
        let removed = self
            .entries
            .remove_if(key, |_, entry| entry.is_expired(now))
            .is_some();
        if removed {
            counter!(METRIC_STORE_EXPIRED_TOTAL).increment(1);
        }
        !removed && self.entries.contains_key(key)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = OffsetDateTime::now_utc() + ttl;
        self.entries
            .insert(key.to_string(), StoredEntry { value, expires_at });
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<String>, StoreError> {
        if !self.evict_if_expired(key) {
            counter!(METRIC_STORE_MISS_TOTAL).increment(1);
            return Ok(None);
        }
        let value = self.entries.get(key).map(|entry| entry.value.clone());
        match value {
            Some(value) => {
                counter!(METRIC_STORE_HIT_TOTAL).increment(1);
                Ok(Some(value))
            }
            // Raced with a concurrent delete between the expiry check and
            // the read; report it as the miss it is.
            None => {
                counter!(METRIC_STORE_MISS_TOTAL).increment(1);
                Ok(None)
            }
        }
    }

    async fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.evict_if_expired(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_fetch_roundtrip() {
        let store = InMemorySessionStore::new();

        assert!(store.fetch("t1").await.expect("fetch").is_none());

        store
            .save("t1", "payload".to_string(), Duration::seconds(60))
            .await
            .expect("save");

        assert!(store.contains("t1").await.expect("contains"));
        assert_eq!(
            store.fetch("t1").await.expect("fetch").as_deref(),
            Some("payload")
        );
    }

    #[tokio::test]
    async fn save_overwrites_previous_value() {
        let store = InMemorySessionStore::new();

        store
            .save("t1", "first".to_string(), Duration::seconds(60))
            .await
            .expect("save first");
        store
            .save("t1", "second".to_string(), Duration::seconds(60))
            .await
            .expect("save second");

        assert_eq!(
            store.fetch("t1").await.expect("fetch").as_deref(),
            Some("second")
        );
    }

    #[tokio::test]
    async fn delete_is_silent_for_missing_keys() {
        let store = InMemorySessionStore::new();

        store.delete("missing").await.expect("delete missing");

        store
            .save("t1", "payload".to_string(), Duration::seconds(60))
            .await
            .expect("save");
        store.delete("t1").await.expect("delete");
        store.delete("t1").await.expect("delete again");

        assert!(!store.contains("t1").await.expect("contains"));
    }

    #[tokio::test]
    async fn expired_entries_behave_as_missing() {
        let store = InMemorySessionStore::new();

        store
            .save("t1", "payload".to_string(), Duration::seconds(-1))
            .await
            .expect("save");

        assert!(!store.contains("t1").await.expect("contains"));
        assert!(store.fetch("t1").await.expect("fetch").is_none());
    }

    #[tokio::test]
    async fn fresh_save_revives_an_expired_key() {
        let store = InMemorySessionStore::new();

        store
            .save("t1", "old".to_string(), Duration::seconds(-1))
            .await
            .expect("save expired");
        store
            .save("t1", "new".to_string(), Duration::seconds(60))
            .await
            .expect("save fresh");

        assert_eq!(
            store.fetch("t1").await.expect("fetch").as_deref(),
            Some("new")
        );
    }
}

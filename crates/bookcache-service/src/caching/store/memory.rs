use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{RemoteStore, StoreError};
use crate::caching::{CacheKey, CacheRecord};

type InMemoryCache = moka::sync::Cache<String, StoredItem>;
type LockMarkers = HashMap<String, StoredItem>;

#[derive(Debug, Clone)]
struct StoredItem {
    value: Arc<str>,
    deadline: Instant,
}

impl StoredItem {
    fn new(value: &str, deadline: Instant) -> Self {
        Self {
            value: value.into(),
            deadline,
        }
    }
}

/// A struct implementing [`moka::Expiry`] that evicts items at their own deadline.
struct ItemExpiration;

/// Returns the duration between the `current_time` and `target_time` in the future.
/// In case the `target_time` is already elapsed (it is in the past relative to `current_time`), this
/// will return `Some(ZERO)`.
fn saturating_duration_since(current_time: Instant, target_time: Instant) -> Option<Duration> {
    Some(
        target_time
            .checked_duration_since(current_time)
            .unwrap_or_default(),
    )
}

impl moka::Expiry<String, StoredItem> for ItemExpiration {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredItem,
        current_time: Instant,
    ) -> Option<Duration> {
        saturating_duration_since(current_time, value.deadline)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredItem,
        current_time: Instant,
        _current_duration: Option<Duration>,
    ) -> Option<Duration> {
        saturating_duration_since(current_time, value.deadline)
    }
}

/// A [`RemoteStore`] that lives inside this process.
///
/// Locks only exclude callers within the same process, so this is meant for single instance
/// deployments and tests. The compound operations hold a short critical section, which gives
/// them the same atomicity as the scripts of the Redis backend.
///
/// Values and deltas live in a bounded cache that may evict them at any time. Lock markers are
/// kept apart from it, in a map that is only ever touched inside the critical section, so a
/// held lock stays held until it is released or its deadline passes.
#[derive(Clone)]
pub struct MemoryStore {
    cache: InMemoryCache,
    critical: Arc<Mutex<LockMarkers>>,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entry_count", &self.cache.entry_count())
            .field("locks", &self.atomically(|locks, _| locks.len()))
            .finish()
    }
}

impl MemoryStore {
    pub fn new(capacity: u64) -> Self {
        let cache = InMemoryCache::builder()
            .max_capacity(capacity)
            .name("bookcache-store")
            .expire_after(ItemExpiration)
            .build();
        Self {
            cache,
            critical: Arc::default(),
        }
    }

    /// Runs `f` while no other compound operation is in progress.
    fn atomically<R>(&self, f: impl FnOnce(&mut LockMarkers, Instant) -> R) -> R {
        let mut locks = self
            .critical
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut locks, Instant::now())
    }

    /// Returns the item at `key` unless it expired.
    ///
    /// moka only evicts expired items lazily, so the deadline is checked here as well.
    fn live(&self, key: &str, now: Instant) -> Option<StoredItem> {
        self.cache.get(key).filter(|item| item.deadline > now)
    }

    fn insert(&self, key: String, value: &str, deadline: Instant) {
        self.cache.insert(key, StoredItem::new(value, deadline));
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn atomic_read(
        &self,
        key: &CacheKey,
        delta_key: &str,
    ) -> Result<CacheRecord, StoreError> {
        let record = self.atomically(|_, now| {
            let Some(item) = self.live(key.as_str(), now) else {
                return CacheRecord::miss();
            };
            let cost = self
                .live(delta_key, now)
                .and_then(|delta| delta.value.parse().ok())
                .map(Duration::from_millis);
            let remaining = item.deadline.saturating_duration_since(now);
            CacheRecord::hit(item.value.to_string(), cost, Some(remaining))
        });
        Ok(record)
    }

    async fn atomic_write(
        &self,
        key: &CacheKey,
        delta_key: &str,
        payload: &str,
        cost: Duration,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.atomically(|_, now| {
            let deadline = now + ttl;
            self.insert(key.to_string(), payload, deadline);
            self.insert(delta_key.to_owned(), &cost.as_millis().to_string(), deadline);
        });
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let inserted = self.atomically(|locks, now| {
            // abandoned markers are dropped here, as nothing else evicts them
            locks.retain(|_, marker| marker.deadline > now);
            if locks.contains_key(key) {
                return false;
            }
            locks.insert(key.to_owned(), StoredItem::new(token, now + ttl));
            true
        });
        Ok(inserted)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let deleted = self.atomically(|locks, now| match locks.get(key) {
            Some(marker) if marker.deadline > now && &*marker.value == expected => {
                locks.remove(key);
                true
            }
            _ => false,
        });
        Ok(deleted)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_after_write() {
        let store = MemoryStore::new(100);
        let key = CacheKey::from("java:1");

        let record = store.atomic_read(&key, "java:1:delta").await.unwrap();
        assert_eq!(record, CacheRecord::miss());

        store
            .atomic_write(
                &key,
                "java:1:delta",
                r#"{"books":[]}"#,
                Duration::from_millis(230),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        let record = store.atomic_read(&key, "java:1:delta").await.unwrap();
        assert!(record.hit);
        assert_eq!(record.value.as_deref(), Some(r#"{"books":[]}"#));
        assert_eq!(record.computation_cost, Some(Duration::from_millis(230)));
        let remaining = record.remaining_freshness.unwrap();
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(59));
    }

    #[tokio::test]
    async fn test_missing_delta() {
        let store = MemoryStore::new(100);
        let key = CacheKey::from("python:2");
        store
            .atomic_write(&key, "python:2:delta", "{}", Duration::ZERO, Duration::from_secs(60))
            .await
            .unwrap();
        store.cache.invalidate("python:2:delta");

        let record = store.atomic_read(&key, "python:2:delta").await.unwrap();
        assert!(record.hit);
        assert_eq!(record.computation_cost, None);
        assert!(!record.is_complete());
    }

    #[tokio::test]
    async fn test_expiry() {
        let store = MemoryStore::new(100);
        let key = CacheKey::from("redis:1");
        store
            .atomic_write(
                &key,
                "redis:1:delta",
                "{}",
                Duration::from_millis(5),
                Duration::from_millis(50),
            )
            .await
            .unwrap();
        assert!(store.atomic_read(&key, "redis:1:delta").await.unwrap().hit);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!store.atomic_read(&key, "redis:1:delta").await.unwrap().hit);
    }

    #[tokio::test]
    async fn test_set_if_absent() {
        let store = MemoryStore::new(100);
        let ttl = Duration::from_millis(50);

        assert!(store.set_if_absent("k:lock", "a", ttl).await.unwrap());
        assert!(!store.set_if_absent("k:lock", "b", ttl).await.unwrap());

        // an abandoned marker clears itself
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(store.set_if_absent("k:lock", "b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_compare_and_delete() {
        let store = MemoryStore::new(100);
        let ttl = Duration::from_secs(5);
        store.set_if_absent("k:lock", "a", ttl).await.unwrap();

        assert!(!store.compare_and_delete("k:lock", "b").await.unwrap());
        assert!(!store.set_if_absent("k:lock", "c", ttl).await.unwrap());

        assert!(store.compare_and_delete("k:lock", "a").await.unwrap());
        assert!(!store.compare_and_delete("k:lock", "a").await.unwrap());
        assert!(store.set_if_absent("k:lock", "c", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_survives_full_store() {
        let store = MemoryStore::new(4);
        let ttl = Duration::from_secs(60);
        for n in 0..4 {
            let key = CacheKey::new(format!("java:{n}"));
            let delta_key = key.delta_key(":delta");
            store
                .atomic_write(&key, &delta_key, "{}", Duration::ZERO, ttl)
                .await
                .unwrap();
            for _ in 0..20 {
                store.atomic_read(&key, &delta_key).await.unwrap();
            }
        }
        store.cache.run_pending_tasks();

        assert!(store.set_if_absent("java:1:lock", "a", ttl).await.unwrap());
        store.cache.run_pending_tasks();
        assert!(!store.set_if_absent("java:1:lock", "b", ttl).await.unwrap());

        assert!(store.compare_and_delete("java:1:lock", "a").await.unwrap());
        assert!(store.set_if_absent("java:1:lock", "b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_abandoned_locks_are_dropped() {
        let store = MemoryStore::new(100);
        let short = Duration::from_millis(20);
        for n in 0..10 {
            let key = format!("k{n}:lock");
            assert!(store.set_if_absent(&key, "a", short).await.unwrap());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(store.set_if_absent("other:lock", "a", short).await.unwrap());
        assert_eq!(store.atomically(|locks, _| locks.len()), 1);
        // an expired marker can no longer be released by its old owner
        assert!(!store.compare_and_delete("k0:lock", "a").await.unwrap());
    }
}

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{
    CacheEntry, CacheError, CacheKey, CacheRecord, LockToken, PerCacheConfig, PerDecision,
    RemoteStore, SingleFlightLock,
};

/// A read-through cache with probabilistic early recomputation and single-flight refreshes.
///
/// Every [`get`](Self::get) reads the value and its metadata from the store and lets
/// [`PerDecision`] decide whether it should be recomputed. If so, the caller races for the
/// key's [`SingleFlightLock`]:
///
/// - The winner (the *leader*) runs the recomputation, writes the result together with the time
///   it took, and releases the lock.
/// - Everybody else (the *followers*) never recomputes. They re-read the store a bounded number
///   of times with a jittered backoff and take the first value they find, which may be the
///   previous, still unexpired value.
///
/// A leader whose recomputation fails joins the followers. Callers that find no value at all fail
/// with [`CacheError::CacheExhausted`].
///
/// Reading the record and taking the lock are two separate round trips. A caller may thus still
/// decide to recompute right after another leader finished, which is accepted: at most one
/// recomputation per key runs at a time while the lock is held.
#[derive(Debug, Clone)]
pub struct PerCacheManager {
    store: Arc<dyn RemoteStore>,
    lock: SingleFlightLock,
    decision: PerDecision,
    config: Arc<PerCacheConfig>,
}

impl PerCacheManager {
    pub fn new(store: Arc<dyn RemoteStore>, config: PerCacheConfig) -> Self {
        Self {
            lock: SingleFlightLock::new(store.clone()),
            decision: PerDecision::new(config.beta),
            store,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &PerCacheConfig {
        &self.config
    }

    /// Returns the cached value for `key`, running `recompute` if this caller should refresh it.
    pub async fn get<T, F, Fut>(&self, key: &CacheKey, recompute: F) -> CacheEntry<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        metric!(counter("caches.access") += 1);
        let delta_key = key.delta_key(&self.config.delta_key_suffix);
        let record = self.store.atomic_read(key, &delta_key).await?;

        if !self.decision.should_recompute(&record) {
            metric!(counter("caches.hit") += 1);
            return decode(key, &record);
        }

        if record.hit {
            metric!(counter("caches.early_refresh") += 1);
        } else {
            metric!(counter("caches.miss") += 1);
        }

        if let Some(token) = self.lock.acquire(key, self.config.lock_ttl).await? {
            match self.lead(key, &delta_key, &token, recompute).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    tracing::warn!(
                        error = &err as &dyn std::error::Error,
                        key = %key,
                        "Recomputation failed, waiting for another writer",
                    );
                }
            }
        }

        self.follow(key, &delta_key).await
    }

    /// Recomputes the value while holding the lock, and stores it.
    async fn lead<T, F, Fut>(
        &self,
        key: &CacheKey,
        delta_key: &str,
        token: &LockToken,
        recompute: F,
    ) -> CacheEntry<T>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let start = Instant::now();
        let result = recompute().await;
        let cost = start.elapsed();
        metric!(counter("caches.computation") += 1);
        metric!(timer("caches.computation.duration") = cost);

        let entry = match result {
            Ok(value) => {
                self.write(key, delta_key, &value, cost).await;
                Ok(value)
            }
            Err(err) => Err(CacheError::RecomputeFailed(format!("{err:#}"))),
        };

        self.lock.release(key, token).await;
        entry
    }

    /// Stores a freshly computed value.
    ///
    /// Failures only cost a later recomputation, so they are logged and not returned.
    async fn write<T: Serialize>(&self, key: &CacheKey, delta_key: &str, value: &T, cost: Duration) {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(
                    error = &err as &dyn std::error::Error,
                    key = %key,
                    "Failed to serialize computed value",
                );
                return;
            }
        };

        if let Err(err) = self
            .store
            .atomic_write(key, delta_key, &payload, cost, self.config.default_ttl)
            .await
        {
            metric!(counter("caches.write.failed") += 1, "store" => self.store.name());
            tracing::error!(
                error = &err as &dyn std::error::Error,
                key = %key,
                "Failed to store computed value",
            );
        }
    }

    /// Waits for a value to show up in the store.
    async fn follow<T: DeserializeOwned>(&self, key: &CacheKey, delta_key: &str) -> CacheEntry<T> {
        let attempts = self.config.follower_retry_attempts;
        for attempt in 1..=attempts {
            tokio::time::sleep(self.backoff()).await;
            metric!(counter("caches.follower.retry") += 1);

            let record = self.store.atomic_read(key, delta_key).await?;
            if record.hit {
                tracing::trace!(key = %key, attempt, "Follower found a value");
                return decode(key, &record);
            }
        }

        metric!(counter("caches.exhausted") += 1);
        Err(CacheError::CacheExhausted { attempts })
    }

    fn backoff(&self) -> Duration {
        let max_jitter = self.config.follower_max_jitter.as_millis() as u64;
        let jitter = rand::rng().random_range(0..=max_jitter);
        self.config.follower_base_backoff + Duration::from_millis(jitter)
    }
}

fn decode<T: DeserializeOwned>(key: &CacheKey, record: &CacheRecord) -> CacheEntry<T> {
    let Some(payload) = record.value.as_deref() else {
        return Err(CacheError::DeserializeFailed("value missing".into()));
    };
    serde_json::from_str(payload).map_err(|err| {
        metric!(counter("caches.malformed") += 1);
        tracing::error!(
            error = &err as &dyn std::error::Error,
            key = %key,
            "Failed to decode cached value",
        );
        err.into()
    })
}

//! The shared store that holds cached values, their metadata and the recomputation locks.
//!
//! Every operation on [`RemoteStore`] is atomic on the store side: a concurrent writer can never
//! observe a value without its computation cost, and a lock is only ever removed by the holder of
//! its token.
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::{CacheError, CacheKey, CacheRecord, StoreConfig};

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Failure of a single store round trip.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("timeout connecting to cache store")]
    ConnectTimeout,
    #[error("timeout waiting for cache store")]
    Timeout,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<StoreError> for CacheError {
    fn from(err: StoreError) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

/// A key/value store with atomic, server-side compound operations.
#[async_trait]
pub trait RemoteStore: fmt::Debug + Send + Sync {
    /// Reads a value, its computation cost and its remaining time-to-live in one step.
    async fn atomic_read(
        &self,
        key: &CacheKey,
        delta_key: &str,
    ) -> Result<CacheRecord, StoreError>;

    /// Writes a value together with its computation cost, both expiring after `ttl`.
    async fn atomic_write(
        &self,
        key: &CacheKey,
        delta_key: &str,
        payload: &str,
        cost: Duration,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Sets `key` to `token` unless it already exists.
    ///
    /// Returns whether the value was set.
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration)
    -> Result<bool, StoreError>;

    /// Deletes `key` if, and only if, it currently holds `expected`.
    ///
    /// Returns whether a key was deleted.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError>;

    /// The backend name, used in logs and metric tags.
    fn name(&self) -> &'static str;
}

/// Creates the store selected in the configuration.
pub async fn create_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn RemoteStore>> {
    let store: Arc<dyn RemoteStore> = match config {
        StoreConfig::Redis(config) => Arc::new(RedisStore::connect(config.clone()).await?),
        StoreConfig::Memory(config) => Arc::new(MemoryStore::new(config.capacity)),
    };
    tracing::info!(store = store.name(), "Cache store ready");
    Ok(store)
}

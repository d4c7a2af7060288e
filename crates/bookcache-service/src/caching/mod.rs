//! # Caching infrastructure
//!
//! Search results are expensive: the upstream API is slow and rate limited. This module puts a
//! shared store in front of it and makes sure that the store is refreshed smoothly and without
//! stampedes, even when many instances of the service ask for the same key at once.
//!
//! ## Layers
//!
//! A cached search goes through the following components, outermost first:
//!
//! - The [`CircuitBreaker`] wraps the whole cached path. After a run of failures it opens and
//!   routes callers straight to its fallback, typically the uncached upstream call.
//! - The [`PerCacheManager`] reads the value and its metadata, decides whether to refresh it,
//!   and coordinates the refresh with other callers.
//! - [`PerDecision`] implements probabilistic early recomputation: entries are refreshed with a
//!   probability that rises as their expiry approaches, scaled by how long they took to compute.
//! - The [`SingleFlightLock`] makes sure only one caller per key recomputes at a time. Everybody
//!   else waits a bounded amount of time for the new value to land.
//! - The [`RemoteStore`] holds values, their computation cost ("delta") and the locks. It is
//!   either a Redis server shared by all instances ([`RedisStore`]), or a store local to the
//!   process ([`MemoryStore`]).
//!
//! Values are encoded as JSON. Each value key `K` is accompanied by `K:delta` (configurable via
//! [`PerCacheConfig::delta_key_suffix`]) with the computation time in milliseconds, and while a
//! recomputation runs, by `K:lock` holding the leader's token.
//!
//! ## Failures
//!
//! All failures of the cached path are [`CacheError`]s. None of them reach the caller of a
//! protected operation: the breaker counts them and answers with the fallback. Lock contention
//! is not a failure at all.
//!
//! ### Metrics
//!
//! - `caches.access`: All reads through the manager.
//! - `caches.hit`: Reads served from the store without recomputation.
//! - `caches.miss` / `caches.early_refresh`: Reads that decided to recompute a missing or an
//!   existing value.
//! - `caches.lock.acquired` / `caches.lock.contended`: Outcomes of the race for the lock.
//! - `caches.computation` and `caches.computation.duration`: Recomputations run by leaders.
//! - `caches.follower.retry` and `caches.exhausted`: Re-reads of waiting callers, and callers
//!   that gave up waiting.
//! - `circuit_breaker.state` and `circuit_breaker.fallback`: Breaker transitions and fallbacks.

mod breaker;
mod cache_error;
mod cache_key;
mod config;
mod lock;
mod manager;
mod per;
mod record;
mod store;

pub use breaker::{CircuitBreaker, CircuitState};
pub use cache_error::{CacheEntry, CacheError};
pub use cache_key::CacheKey;
pub use config::{
    CircuitBreakerConfig, MemoryStoreConfig, PerCacheConfig, RedisStoreConfig, StoreConfig,
};
pub use lock::{LockToken, SingleFlightLock};
pub use manager::PerCacheManager;
pub use per::PerDecision;
pub use record::CacheRecord;
pub use store::{MemoryStore, RedisStore, RemoteStore, StoreError, create_store};

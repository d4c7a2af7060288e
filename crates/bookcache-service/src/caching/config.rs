use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning of the probabilistic early recomputation and the single-flight protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerCacheConfig {
    /// How eagerly entries are recomputed ahead of their expiry.
    ///
    /// `1.0` is the neutral setting. Larger values refresh earlier, `0.0` only
    /// recomputes on a miss or once the entry is fully expired.
    pub beta: f64,

    /// Time-to-live of every written entry together with its computation cost.
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,

    /// Suffix of the key that stores the computation cost next to a value.
    pub delta_key_suffix: String,

    /// How long a recomputation lock is held at most.
    ///
    /// A leader that crashes or hangs blocks other callers for at most this long.
    #[serde(with = "humantime_serde")]
    pub lock_ttl: Duration,

    /// How often a caller that did not get the lock re-reads the store.
    pub follower_retry_attempts: u32,

    /// Fixed part of the sleep between two follower reads.
    #[serde(with = "humantime_serde")]
    pub follower_base_backoff: Duration,

    /// Upper bound of the random part of the sleep between two follower reads.
    #[serde(with = "humantime_serde")]
    pub follower_max_jitter: Duration,
}

impl PerCacheConfig {
    /// Rejects values that would make the recomputation threshold meaningless.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.beta.is_finite() || self.beta < 0.0 {
            anyhow::bail!("cache.beta must be a finite, non-negative number");
        }
        if self.default_ttl.is_zero() {
            anyhow::bail!("cache.default_ttl must not be zero");
        }
        if self.lock_ttl.is_zero() {
            anyhow::bail!("cache.lock_ttl must not be zero");
        }
        Ok(())
    }

    /// Longest time a follower may spend waiting for a leader.
    pub fn max_follower_wait(&self) -> Duration {
        (self.follower_base_backoff + self.follower_max_jitter) * self.follower_retry_attempts
    }
}

impl Default for PerCacheConfig {
    fn default() -> Self {
        Self {
            beta: 1.0,
            default_ttl: Duration::from_secs(60 * 60),
            delta_key_suffix: ":delta".into(),
            lock_ttl: Duration::from_secs(5),
            follower_retry_attempts: 2,
            follower_base_backoff: Duration::from_millis(100),
            follower_max_jitter: Duration::from_millis(30),
        }
    }
}

/// Failure isolation around the cached path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// The breaker opens once more than this many calls failed in a row.
    pub max_failures: u32,

    /// How long the breaker stays open before a single probe call is let through.
    ///
    /// With `null`, an open breaker stays open.
    #[serde(with = "humantime_serde")]
    pub open_duration: Option<Duration>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 3,
            open_duration: Some(Duration::from_secs(30)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisStoreConfig {
    /// Connection string, e.g. `redis://127.0.0.1:6379/0`.
    pub url: String,

    /// Timeout for establishing the connection.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Timeout for a single command or script round trip.
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStoreConfig {
    /// Maximum number of keys, including delta and lock keys.
    pub capacity: u64,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

/// The backend that holds cached values, their computation cost and the locks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// A Redis server shared by all instances.
    Redis(RedisStoreConfig),
    /// A store local to this process, for single instance deployments and tests.
    Memory(MemoryStoreConfig),
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Memory(MemoryStoreConfig::default())
    }
}

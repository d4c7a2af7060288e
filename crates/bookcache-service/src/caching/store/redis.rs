use std::fmt;
use std::future::Future;
use std::time::Duration;

use ::redis::aio::ConnectionManager;
use ::redis::{Client, RedisResult, Script};
use anyhow::Context;
use async_trait::async_trait;

use super::{RemoteStore, StoreError};
use crate::caching::{CacheKey, CacheRecord, RedisStoreConfig};

/// `KEYS[1]`: value, `KEYS[2]`: delta.
///
/// Replies `{{value, delta}, pttl}`. A `pttl` of `-2` means the value does not exist, `-1` that
/// it has no expiry.
const READ_SCRIPT: &str = r"
local value = redis.call('GET', KEYS[1])
local delta = redis.call('GET', KEYS[2])
local ttl = redis.call('PTTL', KEYS[1])
return {{value, delta}, ttl}
";

/// `KEYS[1]`: value, `KEYS[2]`: delta, `ARGV`: value, delta in ms, ttl in ms.
const WRITE_SCRIPT: &str = r"
redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[3])
redis.call('SET', KEYS[2], ARGV[2], 'PX', ARGV[3])
return 1
";

/// `KEYS[1]`: lock, `ARGV[1]`: expected token.
const UNLOCK_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
";

/// A [`RemoteStore`] on a Redis server, shared by all instances of the service.
///
/// The compound operations run as Lua scripts, which Redis executes atomically.
pub struct RedisStore {
    config: RedisStoreConfig,
    connection: ConnectionManager,
    read_script: Script,
    write_script: Script,
    unlock_script: Script,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("config", &self.config)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisStore {
    /// Connects to the server and keeps reconnecting in the background when the connection drops.
    pub async fn connect(config: RedisStoreConfig) -> anyhow::Result<Self> {
        let client = Client::open(config.url.as_str()).context("invalid redis url")?;
        let connection = tokio::time::timeout(config.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::ConnectTimeout)?
            .context("failed to connect to redis")?;

        Ok(Self {
            config,
            connection,
            read_script: Script::new(READ_SCRIPT),
            write_script: Script::new(WRITE_SCRIPT),
            unlock_script: Script::new(UNLOCK_SCRIPT),
        })
    }

    /// Bounds a single round trip by the command timeout.
    async fn bounded<T>(
        &self,
        command: impl Future<Output = RedisResult<T>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.config.command_timeout, command).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(err)) => Err(StoreError::Other(err.into())),
            Err(_) => Err(StoreError::Timeout),
        }
    }
}

/// Reads a stored computation cost. Anything but whole milliseconds counts as missing.
fn parse_cost(delta: Option<&str>) -> Option<Duration> {
    delta?.parse().ok().map(Duration::from_millis)
}

fn as_px(duration: Duration) -> u64 {
    (duration.as_millis() as u64).max(1)
}

#[async_trait]
impl RemoteStore for RedisStore {
    async fn atomic_read(
        &self,
        key: &CacheKey,
        delta_key: &str,
    ) -> Result<CacheRecord, StoreError> {
        let mut connection = self.connection.clone();
        let ((value, delta), pttl): ((Option<String>, Option<String>), i64) = self
            .bounded(
                self.read_script
                    .key(key.as_str())
                    .key(delta_key)
                    .invoke_async(&mut connection),
            )
            .await?;

        let Some(value) = value else {
            return Ok(CacheRecord::miss());
        };
        let remaining = u64::try_from(pttl).ok().map(Duration::from_millis);
        Ok(CacheRecord::hit(value, parse_cost(delta.as_deref()), remaining))
    }

    async fn atomic_write(
        &self,
        key: &CacheKey,
        delta_key: &str,
        payload: &str,
        cost: Duration,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let () = self
            .bounded(
                self.write_script
                    .key(key.as_str())
                    .key(delta_key)
                    .arg(payload)
                    .arg(cost.as_millis() as u64)
                    .arg(as_px(ttl))
                    .invoke_async(&mut connection),
            )
            .await?;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();
        let reply: Option<String> = self
            .bounded(
                ::redis::cmd("SET")
                    .arg(key)
                    .arg(token)
                    .arg("NX")
                    .arg("PX")
                    .arg(as_px(ttl))
                    .query_async(&mut connection),
            )
            .await?;
        Ok(reply.is_some())
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();
        let deleted: i64 = self
            .bounded(
                self.unlock_script
                    .key(key)
                    .arg(expected)
                    .invoke_async(&mut connection),
            )
            .await?;
        Ok(deleted == 1)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    async fn store() -> RedisStore {
        RedisStore::connect(RedisStoreConfig {
            url: bookcache_test::redis_url().unwrap(),
            connect_timeout: Duration::from_secs(1),
            command_timeout: Duration::from_secs(1),
        })
        .await
        .unwrap()
    }

    /// A key no other test run uses.
    fn unique_key(name: &str) -> CacheKey {
        CacheKey::new(format!("bookcache-test:{name}:{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_read_write() {
        bookcache_test::redis_or_skip!();
        let store = store().await;
        let key = unique_key("read-write");
        let delta_key = key.delta_key(":delta");

        let record = store.atomic_read(&key, &delta_key).await.unwrap();
        assert_eq!(record, CacheRecord::miss());

        store
            .atomic_write(
                &key,
                &delta_key,
                r#"{"books":[]}"#,
                Duration::from_millis(321),
                Duration::from_secs(30),
            )
            .await
            .unwrap();

        let record = store.atomic_read(&key, &delta_key).await.unwrap();
        assert!(record.is_complete());
        assert_eq!(record.value.as_deref(), Some(r#"{"books":[]}"#));
        assert_eq!(record.computation_cost, Some(Duration::from_millis(321)));
        let remaining = record.remaining_freshness.unwrap();
        assert!(remaining <= Duration::from_secs(30));
        assert!(remaining > Duration::from_secs(29));
    }

    #[tokio::test]
    async fn test_lock_ownership() {
        bookcache_test::redis_or_skip!();
        let store = store().await;
        let lock_key = unique_key("lock").lock_key();
        let ttl = Duration::from_secs(5);

        assert!(store.set_if_absent(&lock_key, "A", ttl).await.unwrap());
        assert!(!store.set_if_absent(&lock_key, "B", ttl).await.unwrap());

        assert!(!store.compare_and_delete(&lock_key, "B").await.unwrap());
        assert!(!store.set_if_absent(&lock_key, "B", ttl).await.unwrap());

        assert!(store.compare_and_delete(&lock_key, "A").await.unwrap());
        assert!(store.set_if_absent(&lock_key, "B", ttl).await.unwrap());
        assert!(store.compare_and_delete(&lock_key, "B").await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_expiry() {
        bookcache_test::redis_or_skip!();
        let store = store().await;
        let lock_key = unique_key("lock-expiry").lock_key();

        assert!(
            store
                .set_if_absent(&lock_key, "A", Duration::from_millis(50))
                .await
                .unwrap()
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(
            store
                .set_if_absent(&lock_key, "B", Duration::from_millis(50))
                .await
                .unwrap()
        );
    }

    #[test]
    fn test_parse_cost() {
        assert_eq!(parse_cost(Some("230")), Some(Duration::from_millis(230)));
        assert_eq!(parse_cost(Some("0")), Some(Duration::ZERO));
        assert_eq!(parse_cost(Some("fast")), None);
        assert_eq!(parse_cost(Some("-5")), None);
        assert_eq!(parse_cost(None), None);
    }

    #[tokio::test]
    async fn test_garbage_delta_is_incomplete() {
        bookcache_test::redis_or_skip!();
        let store = store().await;
        let key = unique_key("garbage-delta");
        let delta_key = key.delta_key(":delta");

        store
            .atomic_write(
                &key,
                &delta_key,
                "{}",
                Duration::from_millis(10),
                Duration::from_secs(30),
            )
            .await
            .unwrap();
        let mut connection = store.connection.clone();
        let _: () = redis::cmd("SET")
            .arg(&delta_key)
            .arg("not a number")
            .query_async(&mut connection)
            .await
            .unwrap();

        let record = store.atomic_read(&key, &delta_key).await.unwrap();
        assert!(record.hit);
        assert_eq!(record.computation_cost, None);
        assert!(!record.is_complete());
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let result = RedisStore::connect(RedisStoreConfig {
            url: "not a redis url".into(),
            connect_timeout: Duration::from_millis(100),
            command_timeout: Duration::from_millis(100),
        })
        .await;
        assert!(result.is_err());
    }
}
